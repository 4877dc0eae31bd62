//! Error types for the store and core types

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Mounted partitions differ from the ones in the last commit
    #[error("Partition mismatch: mounted {mounted:?}, last commit has {persisted:?}")]
    PartitionMismatch {
        /// Partitions mounted at startup
        mounted: Vec<String>,
        /// Partitions recorded by the last commit
        persisted: Vec<String>,
    },

    /// Same partition name mounted twice
    #[error("Duplicate partition: {0}")]
    DuplicatePartition(String),

    /// Partition name reserved by the store
    #[error("Reserved partition name: {0}")]
    ReservedPartition(String),

    /// Access to a partition that was never mounted
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    /// Mount attempted after the store was loaded
    #[error("Store already loaded")]
    AlreadyLoaded,

    /// Access before `load_latest_committed`
    #[error("Store not loaded")]
    NotLoaded,

    /// Write through a read-only view
    #[error("Write to read-only view")]
    ReadOnly,

    /// Malformed coin set
    #[error("Invalid coins: {0}")]
    InvalidCoins(String),

    /// Subtraction would go negative
    #[error("Insufficient coins: {0}")]
    InsufficientCoins(String),

    /// Malformed address or key
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Merkle proof invalid
    #[error("Merkle proof invalid: {0}")]
    MerkleError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
