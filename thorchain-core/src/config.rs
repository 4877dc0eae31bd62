//! Configuration for the commit store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// fsync the commit batch before returning the new root
    pub sync_writes: bool,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/application.db"),
            sync_writes: true,
            rocksdb: RocksDBConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Store rooted under a node home directory
    pub fn under_home(node_home: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: node_home.into().join("data").join("application.db"),
            ..Self::default()
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.sync_writes);
        assert_eq!(config.rocksdb.max_background_jobs, 4);
    }

    #[test]
    fn test_under_home() {
        let config = StoreConfig::under_home("/tmp/node");
        assert_eq!(
            config.data_dir,
            PathBuf::from("/tmp/node/data/application.db")
        );
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = StoreConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: StoreConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.data_dir, config.data_dir);
    }
}
