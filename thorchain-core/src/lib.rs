//! THORChain core
//!
//! Partitioned, merkleized state store and the primitive types the
//! application modules are written against.
//!
//! # Architecture
//!
//! - **Partitions**: One RocksDB column family per module, fixed at startup
//! - **Block buffer**: Writes stay in memory until the block commits
//! - **Atomic commit**: Partition writes and commit metadata share one batch
//! - **Merkle roots**: Per-partition roots folded into one state root
//!
//! # Invariants
//!
//! - Deterministic roots: same writes → same state root
//! - Crash safety: a reopened store shows exactly the last commit
//! - No floating point in state

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod kv;
pub mod merkle;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{RocksDBConfig, StoreConfig};
pub use context::Context;
pub use error::{Error, Result};
pub use kv::{CacheStore, KvPairs, KvStore, MemStore, StoreKey};
pub use merkle::{MerkleProof, StoreProof};
pub use metrics::Metrics;
pub use storage::{CommitId, CommitInfo, CommitStore, CommittedView};
pub use types::{Address, BlockHeader, Coin, Coins, PublicKey, Signature, Tag, Tags, ValidatorUpdate};
