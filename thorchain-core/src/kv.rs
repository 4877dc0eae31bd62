//! Key-value access shared by the commit store, its cache layers and
//! read-only views

use crate::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Handle naming one partition of the store
///
/// Two keys are equal when their names are equal; names must be unique
/// across the mounted set.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(Arc<str>);

impl StoreKey {
    /// Create new key
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Partition name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({})", self.0)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered key/value pairs returned by prefix scans
pub type KvPairs = Vec<(Vec<u8>, Vec<u8>)>;

/// Partition-scoped key-value operations
pub trait KvStore {
    /// Read one entry
    fn get(&self, partition: &StoreKey, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write one entry
    fn set(&mut self, partition: &StoreKey, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Remove one entry
    fn delete(&mut self, partition: &StoreKey, key: &[u8]) -> Result<()>;

    /// All entries whose key starts with `prefix`, in key order
    fn prefix_iter(&self, partition: &StoreKey, prefix: &[u8]) -> Result<KvPairs>;
}

/// Pending writes per partition; `None` marks a delete
pub(crate) type WriteSet = BTreeMap<StoreKey, BTreeMap<Vec<u8>, Option<Vec<u8>>>>;

/// Overlay buffered writes on an ordered scan of the layer below
pub(crate) fn overlay(
    below: KvPairs,
    writes: Option<&BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    prefix: &[u8],
) -> KvPairs {
    let Some(writes) = writes else {
        return below;
    };

    let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = below.into_iter().collect();
    for (key, value) in writes
        .range(prefix.to_vec()..)
        .take_while(|(key, _)| key.starts_with(prefix))
    {
        match value {
            Some(value) => {
                merged.insert(key.clone(), value.clone());
            }
            None => {
                merged.remove(key);
            }
        }
    }
    merged.into_iter().collect()
}

/// Write-back cache over another store
///
/// Writes stay in memory until [`CacheStore::write`] flushes them to the
/// parent; dropping the cache discards them. Transactions run on one of these
/// so a failure leaves no trace.
pub struct CacheStore<'a> {
    parent: &'a mut dyn KvStore,
    writes: WriteSet,
}

impl<'a> CacheStore<'a> {
    /// Branch off `parent`
    pub fn new(parent: &'a mut dyn KvStore) -> Self {
        Self {
            parent,
            writes: WriteSet::new(),
        }
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.writes.values().map(|w| w.len()).sum()
    }

    /// Flush buffered writes to the parent, in key order
    pub fn write(self) -> Result<()> {
        let CacheStore { parent, writes } = self;
        for (partition, entries) in writes {
            for (key, value) in entries {
                match value {
                    Some(value) => parent.set(&partition, &key, value)?,
                    None => parent.delete(&partition, &key)?,
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CacheStore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("pending_writes", &self.pending_writes())
            .finish()
    }
}

impl KvStore for CacheStore<'_> {
    fn get(&self, partition: &StoreKey, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.writes.get(partition).and_then(|w| w.get(key)) {
            return Ok(value.clone());
        }
        self.parent.get(partition, key)
    }

    fn set(&mut self, partition: &StoreKey, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.writes
            .entry(partition.clone())
            .or_default()
            .insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, partition: &StoreKey, key: &[u8]) -> Result<()> {
        self.writes
            .entry(partition.clone())
            .or_default()
            .insert(key.to_vec(), None);
        Ok(())
    }

    fn prefix_iter(&self, partition: &StoreKey, prefix: &[u8]) -> Result<KvPairs> {
        let below = self.parent.prefix_iter(partition, prefix)?;
        Ok(overlay(below, self.writes.get(partition), prefix))
    }
}

/// Plain in-memory store, used by module unit tests
#[derive(Debug, Default)]
pub struct MemStore {
    data: BTreeMap<StoreKey, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemStore {
    fn get(&self, partition: &StoreKey, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(partition).and_then(|p| p.get(key)).cloned())
    }

    fn set(&mut self, partition: &StoreKey, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.data
            .entry(partition.clone())
            .or_default()
            .insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, partition: &StoreKey, key: &[u8]) -> Result<()> {
        if let Some(p) = self.data.get_mut(partition) {
            p.remove(key);
        }
        Ok(())
    }

    fn prefix_iter(&self, partition: &StoreKey, prefix: &[u8]) -> Result<KvPairs> {
        Ok(self
            .data
            .get(partition)
            .map(|p| {
                p.range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_discard_on_drop() {
        let key = StoreKey::new("acc");
        let mut base = MemStore::new();
        base.set(&key, b"a", b"1".to_vec()).unwrap();

        {
            let mut cache = CacheStore::new(&mut base);
            cache.set(&key, b"a", b"2".to_vec()).unwrap();
            cache.set(&key, b"b", b"3".to_vec()).unwrap();
            assert_eq!(cache.get(&key, b"a").unwrap(), Some(b"2".to_vec()));
        }

        assert_eq!(base.get(&key, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(base.get(&key, b"b").unwrap(), None);
    }

    #[test]
    fn test_cache_write_flushes() {
        let key = StoreKey::new("acc");
        let mut base = MemStore::new();
        base.set(&key, b"gone", b"x".to_vec()).unwrap();

        let mut cache = CacheStore::new(&mut base);
        cache.set(&key, b"new", b"y".to_vec()).unwrap();
        cache.delete(&key, b"gone").unwrap();
        assert_eq!(cache.pending_writes(), 2);
        cache.write().unwrap();

        assert_eq!(base.get(&key, b"new").unwrap(), Some(b"y".to_vec()));
        assert_eq!(base.get(&key, b"gone").unwrap(), None);
    }

    #[test]
    fn test_nested_cache_prefix_iter() {
        let key = StoreKey::new("stake");
        let mut base = MemStore::new();
        base.set(&key, b"v/1", b"a".to_vec()).unwrap();
        base.set(&key, b"v/3", b"c".to_vec()).unwrap();
        base.set(&key, b"w/1", b"z".to_vec()).unwrap();

        let mut outer = CacheStore::new(&mut base);
        outer.set(&key, b"v/2", b"b".to_vec()).unwrap();
        let mut inner = CacheStore::new(&mut outer);
        inner.delete(&key, b"v/1").unwrap();

        let keys: Vec<Vec<u8>> = inner
            .prefix_iter(&key, b"v/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"v/2".to_vec(), b"v/3".to_vec()]);
    }
}
