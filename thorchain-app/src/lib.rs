//! THORChain application
//!
//! Wires the module keepers to the commit store and exposes the state
//! machine to CometBFT over ABCI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 CometBFT Network                     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ ABCI
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              ThorchainApp                            │
//! │  decode → ante → router → module handlers           │
//! │  BeginBlock / EndBlock hooks                        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Commit store                            │
//! │  One partition per module, one root per block       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # ABCI Methods
//!
//! - **InitChain**: Apply the genesis document
//! - **CheckTx**: Decode and ante against committed state
//! - **BeginBlock**: Slashing evidence and liveness
//! - **DeliverTx**: Execute transaction in block
//! - **EndBlock**: Validator set changes, governance tallies
//! - **Commit**: Persist the block and report the state root
//! - **Query**: Read-only queries with optional proofs

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod abci;
pub mod ante;
pub mod app;
pub mod codec;
pub mod config;
pub mod error;
pub mod genesis;
pub mod router;
pub mod state;

// Re-exports
pub use abci::AbciApp;
pub use ante::AnteHandler;
pub use app::{EndBlockResponse, Keepers, QueryResult, ThorchainApp, TxResult, APP_NAME, STORE_PARTITIONS};
pub use codec::{Codec, RawMsg, StdFee, StdSignDoc, StdSignature, StdTx};
pub use config::Config;
pub use error::{Error, Result};
pub use genesis::{ExportedState, GenesisAccount, GenesisState};
pub use router::Router;
pub use state::{LifecycleCall, Phase};
