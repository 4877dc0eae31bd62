//! Execution context handed to keepers and message handlers

use crate::{
    kv::{KvPairs, KvStore, StoreKey},
    types::BlockHeader,
    Result,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Store access plus the header of the block being processed
///
/// Values go through bincode, so every keeper stores canonical bytes.
pub struct Context<'a> {
    store: &'a mut dyn KvStore,
    header: BlockHeader,
}

impl<'a> Context<'a> {
    /// Create new context
    pub fn new(store: &'a mut dyn KvStore, header: BlockHeader) -> Self {
        Self { store, header }
    }

    /// Block header
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Block height
    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Block time, as agreed by consensus
    pub fn block_time(&self) -> DateTime<Utc> {
        self.header.time
    }

    /// Chain ID
    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    /// Underlying store, e.g. to branch a cache off it
    pub fn store(&mut self) -> &mut dyn KvStore {
        &mut *self.store
    }

    /// Raw read
    pub fn get_raw(&self, key: &StoreKey, k: &[u8]) -> Result<Option<Vec<u8>>> {
        self.store.get(key, k)
    }

    /// Read and decode one value
    pub fn get<T: DeserializeOwned>(&self, key: &StoreKey, k: &[u8]) -> Result<Option<T>> {
        match self.store.get(key, k)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether an entry exists
    pub fn has(&self, key: &StoreKey, k: &[u8]) -> Result<bool> {
        Ok(self.store.get(key, k)?.is_some())
    }

    /// Encode and write one value
    pub fn set<T: Serialize>(&mut self, key: &StoreKey, k: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.store.set(key, k, bytes)
    }

    /// Remove one entry
    pub fn delete(&mut self, key: &StoreKey, k: &[u8]) -> Result<()> {
        self.store.delete(key, k)
    }

    /// Raw prefix scan, in key order
    pub fn prefix_iter(&self, key: &StoreKey, prefix: &[u8]) -> Result<KvPairs> {
        self.store.prefix_iter(key, prefix)
    }

    /// Decoded values under a prefix, in key order
    pub fn prefix_values<T: DeserializeOwned>(&self, key: &StoreKey, prefix: &[u8]) -> Result<Vec<T>> {
        self.store
            .prefix_iter(key, prefix)?
            .into_iter()
            .map(|(_, bytes)| Ok(bincode::deserialize(&bytes)?))
            .collect()
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("chain_id", &self.header.chain_id)
            .field("height", &self.header.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{CacheStore, MemStore};
    use chrono::TimeZone;

    fn header() -> BlockHeader {
        BlockHeader::genesis("test-chain", Utc.timestamp_opt(1_600_000_000, 0).unwrap())
    }

    #[test]
    fn test_typed_roundtrip() {
        let key = StoreKey::new("acc");
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());

        ctx.set(&key, b"n", &42u64).unwrap();
        assert_eq!(ctx.get::<u64>(&key, b"n").unwrap(), Some(42));
        assert!(ctx.has(&key, b"n").unwrap());

        ctx.delete(&key, b"n").unwrap();
        assert_eq!(ctx.get::<u64>(&key, b"n").unwrap(), None);
    }

    #[test]
    fn test_prefix_values_in_key_order() {
        let key = StoreKey::new("stake");
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        ctx.set(&key, b"v/b", &2u32).unwrap();
        ctx.set(&key, b"v/a", &1u32).unwrap();
        ctx.set(&key, b"x/a", &9u32).unwrap();

        assert_eq!(ctx.prefix_values::<u32>(&key, b"v/").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_branch_through_store() {
        let key = StoreKey::new("acc");
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, header());
        {
            let mut cache = CacheStore::new(ctx.store());
            cache.set(&key, b"k", vec![1]).unwrap();
        }
        assert!(!ctx.has(&key, b"k").unwrap());
        assert_eq!(ctx.chain_id(), "test-chain");
        assert_eq!(ctx.height(), 0);
    }
}
