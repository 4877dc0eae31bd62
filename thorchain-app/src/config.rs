//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thorchain_core::StoreConfig;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Home directory for node state
    pub node_home: PathBuf,

    /// Home directory for client configuration
    pub cli_home: PathBuf,

    /// Address the ABCI server listens on
    pub abci_listen_addr: String,

    /// Commit store configuration
    pub store: StoreConfig,
}

fn user_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for Config {
    fn default() -> Self {
        Self::with_homes(user_home().join(".thorchaind"), user_home().join(".thorchaincli"))
    }
}

impl Config {
    /// Configuration rooted at explicit home directories
    pub fn with_homes(node_home: impl Into<PathBuf>, cli_home: impl Into<PathBuf>) -> Self {
        let node_home = node_home.into();
        Self {
            store: StoreConfig::under_home(&node_home),
            node_home,
            cli_home: cli_home.into(),
            abci_listen_addr: "127.0.0.1:26658".to_string(),
        }
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(node_home) = std::env::var("THORCHAIN_NODE_HOME") {
            config.node_home = PathBuf::from(node_home);
            config.store.data_dir = StoreConfig::under_home(&config.node_home).data_dir;
        }

        if let Ok(cli_home) = std::env::var("THORCHAIN_CLI_HOME") {
            config.cli_home = PathBuf::from(cli_home);
        }

        if let Ok(addr) = std::env::var("THORCHAIN_ABCI_ADDR") {
            config.abci_listen_addr = addr;
        }

        if let Ok(sync) = std::env::var("THORCHAIN_SYNC_WRITES") {
            config.store.sync_writes = sync.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid THORCHAIN_SYNC_WRITES {:?}: {}", sync, e))
            })?;
        }

        Ok(config)
    }

    /// Genesis document location under the node home
    pub fn genesis_file(&self) -> PathBuf {
        self.node_home.join("config").join("genesis.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_lives_under_node_home() {
        let config = Config::with_homes("/srv/node", "/srv/cli");
        assert_eq!(
            config.store.data_dir,
            PathBuf::from("/srv/node/data/application.db")
        );
        assert_eq!(config.genesis_file(), PathBuf::from("/srv/node/config/genesis.json"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thorchaind.toml");
        let config = Config::with_homes("/srv/node", "/srv/cli");
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.node_home, config.node_home);
        assert_eq!(loaded.abci_listen_addr, "127.0.0.1:26658");
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "node_home = [").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(crate::Error::Config(_))
        ));
    }
}
