//! THORChain Node Binary
//!
//! `thorchaind start` serves the state machine to CometBFT over ABCI.
//! `thorchaind export` prints the last committed state as a genesis
//! document.

use anyhow::Context as _;
use tendermint_abci::ServerBuilder;
use thorchain_app::{AbciApp, Config, ThorchainApp};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "usage: thorchaind <start|export>";

fn load_config() -> anyhow::Result<Config> {
    let config = if let Ok(config_path) = std::env::var("THORCHAIN_CONFIG") {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        Config::from_env()?
    };
    Ok(config)
}

async fn start(config: Config) -> anyhow::Result<()> {
    info!(home = ?config.node_home, "Opening application store");
    let app = ThorchainApp::new(config.store.clone()).context("failed to open application")?;
    let app = AbciApp::new(app);

    let addr = config.abci_listen_addr.trim_start_matches("tcp://").to_string();
    info!("Starting ABCI server on {}", addr);

    // The ABCI server is blocking; keep it off the async workers
    let server_handle = tokio::task::spawn_blocking(move || {
        let server = ServerBuilder::default()
            .bind(addr.as_str(), app)
            .map_err(|e| anyhow::anyhow!("failed to bind ABCI server: {}", e))?;
        server
            .listen()
            .map_err(|e| anyhow::anyhow!("ABCI server error: {}", e))
    });

    info!("THORChain node running");

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("ABCI server stopped"),
                Ok(Err(err)) => {
                    error!("{}", err);
                    return Err(err);
                }
                Err(err) => return Err(err.into()),
            }
        }
        signal = signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received shutdown signal"),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        }
    }

    info!("THORChain node stopped");
    Ok(())
}

fn export(config: Config) -> anyhow::Result<()> {
    let app = ThorchainApp::new(config.store).context("failed to open application")?;
    let exported = app.export_state()?;
    info!(
        height = exported.height,
        validators = exported.validators.len(),
        "Exporting state"
    );

    let document = serde_json::json!({
        "height": exported.height,
        "validators": exported.validators,
        "app_state": serde_json::from_slice::<serde_json::Value>(&exported.app_state)?,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `export` output stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    match std::env::args().nth(1).as_deref() {
        Some("start") | None => start(config).await,
        Some("export") => export(config),
        Some(other) => anyhow::bail!("unknown command {:?}; {}", other, USAGE),
    }
}
