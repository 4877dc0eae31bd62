//! Error types for the application
//!
//! Everything here is fatal: the node stops rather than risk diverging from
//! the rest of the network. Per-transaction failures are
//! [`thorchain_modules::TxError`] values and never surface as [`Error`].

use crate::state::Phase;
use thiserror::Error;

/// Result type for application operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal application errors
#[derive(Error, Debug)]
pub enum Error {
    /// Genesis document could not be decoded
    #[error("Malformed genesis document: {0}")]
    GenesisMalformed(String),

    /// A module rejected its genesis section
    #[error("Genesis initialisation failed in {module}: {reason}")]
    GenesisInit {
        /// Module that failed
        module: &'static str,
        /// Failure description
        reason: String,
    },

    /// Two handlers registered for one route
    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    /// Two decoders registered for one message kind
    #[error("Duplicate message kind: {0}")]
    DuplicateMsgKind(String),

    /// Lifecycle call out of order
    #[error("{call} is not valid in phase {phase:?}")]
    InvalidLifecycle {
        /// Offending call
        call: &'static str,
        /// Phase the app was in
        phase: Phase,
    },

    /// A begin/end-block hook failed
    #[error("Block hook {hook} failed: {reason}")]
    Hook {
        /// Hook name
        hook: &'static str,
        /// Failure description
        reason: String,
    },

    /// Value does not fit the consensus engine's signed 64-bit field
    #[error("{field} {value} is out of range for the consensus engine")]
    OutOfRange {
        /// Field being converted
        field: &'static str,
        /// Offending value
        value: u64,
    },

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] thorchain_core::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::GenesisMalformed(err.to_string())
    }
}
