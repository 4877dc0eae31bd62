//! Partitioned, merkleized commit store on RocksDB
//!
//! # Column Families
//!
//! - `default` - commit metadata (`commit_info`, `root/<version>`)
//! - one column family per mounted partition (`acc`, `stake`, ...)
//!
//! # Commit protocol
//!
//! Writes made during a block are buffered in memory, ordered by partition
//! and key. `commit()` recomputes the root of every touched partition, the
//! global root over all partition roots, and writes the buffered mutations
//! together with the new `CommitInfo` in a single `WriteBatch`. RocksDB applies
//! a batch atomically, so after a crash the database holds either the previous
//! commit or the new one, never a mix.
//!
//! Leaf hashes of every committed entry are kept in memory, loaded once when
//! the store opens. A commit only hashes the entries it writes, and proofs
//! never rescan a column family.

use crate::{
    error::{Error, Result},
    kv::{overlay, KvPairs, KvStore, StoreKey, WriteSet},
    merkle::{kv_leaf, partition_leaf, MerkleTree, StoreProof},
    StoreConfig,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, SnapshotWithThreadMode,
    WriteBatch, WriteOptions, DB,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Metadata key of the latest commit
const META_COMMIT_INFO: &[u8] = b"commit_info";

/// Metadata key prefix of historical roots
const META_ROOT_PREFIX: &[u8] = b"root/";

/// Column family name RocksDB always creates
const CF_DEFAULT: &str = "default";

/// Leaf hash of every committed entry of one partition, in key order
type LeafSet = BTreeMap<Vec<u8>, [u8; 32]>;

/// Cache changes of one commit: (partition, key, previous leaf)
type LeafUndo = Vec<(String, Vec<u8>, Option<[u8; 32]>)>;

fn leaf_tree(leaves: &LeafSet) -> MerkleTree {
    MerkleTree::from_leaves(leaves.values().copied().collect())
}

/// Version and root produced by a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitId {
    /// Number of commits so far (block height)
    pub version: u64,
    /// Global state root
    pub root: [u8; 32],
}

/// Persisted description of the latest commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Commit version
    pub version: u64,
    /// Global state root
    pub root: [u8; 32],
    /// Root of every partition, by name
    pub partition_roots: BTreeMap<String, [u8; 32]>,
}

impl CommitInfo {
    fn empty(partitions: &[StoreKey]) -> Self {
        let partition_roots: BTreeMap<String, [u8; 32]> = partitions
            .iter()
            .map(|key| (key.name().to_string(), MerkleTree::default().root()))
            .collect();
        let root = global_root(&partition_roots);
        Self {
            version: 0,
            root,
            partition_roots,
        }
    }

    /// Commit id of this info
    pub fn commit_id(&self) -> CommitId {
        CommitId {
            version: self.version,
            root: self.root,
        }
    }
}

fn global_tree(partition_roots: &BTreeMap<String, [u8; 32]>) -> MerkleTree {
    MerkleTree::from_leaves(
        partition_roots
            .iter()
            .map(|(name, root)| partition_leaf(name, root))
            .collect(),
    )
}

/// Global root over all partition roots, in name order
fn global_root(partition_roots: &BTreeMap<String, [u8; 32]>) -> [u8; 32] {
    global_tree(partition_roots).root()
}

fn root_history_key(version: u64) -> Vec<u8> {
    let mut key = META_ROOT_PREFIX.to_vec();
    key.extend_from_slice(&version.to_be_bytes());
    key
}

/// Commit store: mounted partitions, block buffer, commit machinery
pub struct CommitStore {
    config: StoreConfig,
    db: Option<Arc<DB>>,
    mounted: Vec<StoreKey>,
    pending: WriteSet,
    leaves: BTreeMap<String, LeafSet>,
    last_commit: CommitInfo,
}

impl fmt::Debug for CommitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitStore")
            .field("data_dir", &self.config.data_dir)
            .field("mounted", &self.mounted)
            .field("loaded", &self.db.is_some())
            .field("version", &self.last_commit.version)
            .finish()
    }
}

impl CommitStore {
    /// Prepare a store; nothing is opened until `load_latest_committed`
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            db: None,
            mounted: Vec::new(),
            pending: WriteSet::new(),
            leaves: BTreeMap::new(),
            last_commit: CommitInfo::empty(&[]),
        }
    }

    /// Register the partitions to mount, in their stable order
    pub fn mount(&mut self, keys: &[StoreKey]) -> Result<()> {
        if self.db.is_some() {
            return Err(Error::AlreadyLoaded);
        }

        let mut seen: BTreeSet<&str> = self.mounted.iter().map(|k| k.name()).collect();
        for key in keys {
            if key.name() == CF_DEFAULT || key.name().is_empty() {
                return Err(Error::ReservedPartition(key.name().to_string()));
            }
            if !seen.insert(key.name()) {
                return Err(Error::DuplicatePartition(key.name().to_string()));
            }
        }

        self.mounted.extend(keys.iter().cloned());
        Ok(())
    }

    /// Mounted partitions, in mount order
    pub fn mounted(&self) -> &[StoreKey] {
        &self.mounted
    }

    /// Open the database and restore the latest commit
    ///
    /// A fresh directory yields version 0 with empty partitions. If the last
    /// commit recorded a different partition set than the one mounted, the
    /// store refuses to load.
    pub fn load_latest_committed(&mut self) -> Result<CommitId> {
        if self.db.is_some() {
            return Err(Error::AlreadyLoaded);
        }

        let path = self.config.data_dir.clone();
        std::fs::create_dir_all(&path)?;

        let db_opts = self.db_options();
        let mut cf_names: BTreeSet<String> = DB::list_cf(&db_opts, &path)
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name != CF_DEFAULT)
            .collect();
        cf_names.extend(self.mounted.iter().map(|k| k.name().to_string()));

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = cf_names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Self::cf_options()))
            .collect();
        let db = DB::open_cf_descriptors(&db_opts, &path, cf_descriptors)?;

        let last_commit = match db.get(META_COMMIT_INFO)? {
            Some(bytes) => {
                let info: CommitInfo = bincode::deserialize(&bytes)?;
                self.check_partitions(&info)?;
                info
            }
            None => CommitInfo::empty(&self.mounted),
        };
        let leaves = self.load_leaves(&db, &last_commit)?;

        tracing::info!(
            path = ?path,
            partitions = self.mounted.len(),
            version = last_commit.version,
            root = %hex::encode(last_commit.root),
            "Loaded commit store"
        );

        self.db = Some(Arc::new(db));
        self.leaves = leaves;
        self.last_commit = last_commit;
        self.pending.clear();
        Ok(self.last_commit.commit_id())
    }

    /// Hash every committed entry once and check it against the stored roots
    fn load_leaves(&self, db: &DB, info: &CommitInfo) -> Result<BTreeMap<String, LeafSet>> {
        let mut all = BTreeMap::new();
        for partition in &self.mounted {
            let cf = Self::cf_handle(db, partition)?;
            let leaves: LeafSet = Self::scan_cf(db, &cf, &[])?
                .into_iter()
                .map(|(key, value)| {
                    let leaf = kv_leaf(&key, &value);
                    (key, leaf)
                })
                .collect();
            let expected = info.partition_roots.get(partition.name());
            if expected != Some(&leaf_tree(&leaves).root()) {
                return Err(Error::MerkleError(format!(
                    "partition {} does not match its committed root",
                    partition.name()
                )));
            }
            all.insert(partition.name().to_string(), leaves);
        }
        Ok(all)
    }

    fn check_partitions(&self, info: &CommitInfo) -> Result<()> {
        let mounted: BTreeSet<String> = self.mounted.iter().map(|k| k.name().to_string()).collect();
        let persisted: BTreeSet<String> = info.partition_roots.keys().cloned().collect();
        if mounted != persisted {
            return Err(Error::PartitionMismatch {
                mounted: mounted.into_iter().collect(),
                persisted: persisted.into_iter().collect(),
            });
        }
        Ok(())
    }

    fn db_options(&self) -> Options {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(self.config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(self.config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(self.config.rocksdb.max_background_jobs);
        if self.config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }
        db_opts
    }

    fn cf_options() -> Options {
        let mut opts = Options::default();
        // State is frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn db(&self) -> Result<&Arc<DB>> {
        self.db.as_ref().ok_or(Error::NotLoaded)
    }

    fn check_mounted(&self, partition: &StoreKey) -> Result<()> {
        if self.mounted.contains(partition) {
            Ok(())
        } else {
            Err(Error::UnknownPartition(partition.name().to_string()))
        }
    }

    fn cf_handle<'a>(db: &'a DB, partition: &StoreKey) -> Result<Arc<BoundColumnFamily<'a>>> {
        db.cf_handle(partition.name())
            .ok_or_else(|| Error::UnknownPartition(partition.name().to_string()))
    }

    /// Latest commit
    pub fn last_commit_id(&self) -> CommitId {
        self.last_commit.commit_id()
    }

    /// Latest commit, with partition roots
    pub fn last_commit_info(&self) -> &CommitInfo {
        &self.last_commit
    }

    /// Root recorded for an earlier version
    pub fn root_at(&self, version: u64) -> Result<Option<[u8; 32]>> {
        let db = self.db()?;
        Ok(db.get(root_history_key(version))?.and_then(|raw| raw.try_into().ok()))
    }

    /// Whether the block buffer holds uncommitted writes
    pub fn has_pending_writes(&self) -> bool {
        self.pending.values().any(|w| !w.is_empty())
    }

    /// Drop every uncommitted write
    pub fn discard_pending(&mut self) {
        if self.has_pending_writes() {
            tracing::warn!("Discarding uncommitted block writes");
        }
        self.pending.clear();
    }

    /// Atomically persist the block buffer and return the new root
    pub fn commit(&mut self) -> Result<CommitId> {
        let db = self.db()?.clone();
        let version = self.last_commit.version + 1;

        let mut batch = WriteBatch::default();
        let mut partition_roots = self.last_commit.partition_roots.clone();
        let mut undo = LeafUndo::new();

        {
            let mut dirty = Vec::new();
            for (partition, entries) in &self.pending {
                if !entries.is_empty() {
                    dirty.push((partition, entries, Self::cf_handle(&db, partition)?));
                }
            }

            for (partition, entries, cf) in dirty {
                let name = partition.name();
                let leaves = self.leaves.entry(name.to_string()).or_default();
                for (key, value) in entries {
                    let previous = match value {
                        Some(value) => {
                            batch.put_cf(&cf, key, value);
                            leaves.insert(key.clone(), kv_leaf(key, value))
                        }
                        None => {
                            batch.delete_cf(&cf, key);
                            leaves.remove(key)
                        }
                    };
                    undo.push((name.to_string(), key.clone(), previous));
                }
                partition_roots.insert(name.to_string(), leaf_tree(leaves).root());
            }
        }

        let root = global_root(&partition_roots);
        let info = CommitInfo {
            version,
            root,
            partition_roots,
        };
        if let Err(err) = self.write_commit(&db, batch, &info) {
            self.restore_leaves(undo);
            return Err(err);
        }

        tracing::debug!(version, writes = undo.len(), root = %hex::encode(root), "Committed store");

        self.pending.clear();
        self.last_commit = info;
        Ok(self.last_commit.commit_id())
    }

    fn write_commit(&self, db: &DB, mut batch: WriteBatch, info: &CommitInfo) -> Result<()> {
        batch.put(META_COMMIT_INFO, bincode::serialize(info)?);
        batch.put(root_history_key(info.version), info.root);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    fn restore_leaves(&mut self, undo: LeafUndo) {
        for (partition, key, previous) in undo.into_iter().rev() {
            let leaves = self.leaves.entry(partition).or_default();
            match previous {
                Some(leaf) => {
                    leaves.insert(key, leaf);
                }
                None => {
                    leaves.remove(&key);
                }
            }
        }
    }

    fn scan_cf(db: &DB, cf: &Arc<BoundColumnFamily<'_>>, prefix: &[u8]) -> Result<KvPairs> {
        let mut out = Vec::new();
        let iter = db.iterator_cf(cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Read-only view of the last commit, isolated from the block buffer
    pub fn committed_view(&self) -> Result<CommittedView<'_>> {
        let db = self.db()?;
        Ok(CommittedView {
            db,
            snapshot: db.snapshot(),
            mounted: &self.mounted,
            commit: self.last_commit.commit_id(),
        })
    }

    /// Inclusion proof for a committed entry
    pub fn prove(&self, partition: &StoreKey, key: &[u8]) -> Result<Option<StoreProof>> {
        self.check_mounted(partition)?;
        let db = self.db()?;
        let leaves = self
            .leaves
            .get(partition.name())
            .ok_or_else(|| Error::UnknownPartition(partition.name().to_string()))?;

        let Some(index) = leaves.keys().position(|k| k.as_slice() == key) else {
            return Ok(None);
        };
        let cf = Self::cf_handle(db, partition)?;
        let value = db
            .get_cf(&cf, key)?
            .ok_or_else(|| Error::MerkleError("committed leaf has no value".to_string()))?;
        let entry_proof = leaf_tree(leaves)
            .generate_proof(index)
            .ok_or_else(|| Error::MerkleError("entry index out of range".to_string()))?;

        let partition_index = self
            .last_commit
            .partition_roots
            .keys()
            .position(|name| name == partition.name())
            .ok_or_else(|| Error::UnknownPartition(partition.name().to_string()))?;
        let partition_proof = global_tree(&self.last_commit.partition_roots)
            .generate_proof(partition_index)
            .ok_or_else(|| Error::MerkleError("partition index out of range".to_string()))?;

        Ok(Some(StoreProof {
            partition: partition.name().to_string(),
            key: key.to_vec(),
            value,
            entry_proof,
            partition_proof,
        }))
    }

    /// Close database (graceful shutdown)
    pub fn close(mut self) -> Result<()> {
        self.discard_pending();
        self.leaves.clear();
        drop(self.db.take());
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl KvStore for CommitStore {
    fn get(&self, partition: &StoreKey, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_mounted(partition)?;
        if let Some(value) = self.pending.get(partition).and_then(|w| w.get(key)) {
            return Ok(value.clone());
        }
        let db = self.db()?;
        let cf = Self::cf_handle(db, partition)?;
        Ok(db.get_cf(&cf, key)?)
    }

    fn set(&mut self, partition: &StoreKey, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.check_mounted(partition)?;
        self.db()?;
        self.pending
            .entry(partition.clone())
            .or_default()
            .insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, partition: &StoreKey, key: &[u8]) -> Result<()> {
        self.check_mounted(partition)?;
        self.db()?;
        self.pending
            .entry(partition.clone())
            .or_default()
            .insert(key.to_vec(), None);
        Ok(())
    }

    fn prefix_iter(&self, partition: &StoreKey, prefix: &[u8]) -> Result<KvPairs> {
        self.check_mounted(partition)?;
        let db = self.db()?;
        let cf = Self::cf_handle(db, partition)?;
        let below = Self::scan_cf(db, &cf, prefix)?;
        Ok(overlay(below, self.pending.get(partition), prefix))
    }
}

/// Read-only, versioned view of the last commit
///
/// Backed by a RocksDB snapshot: later block writes and commits are not
/// visible through it.
pub struct CommittedView<'a> {
    db: &'a Arc<DB>,
    snapshot: SnapshotWithThreadMode<'a, DB>,
    mounted: &'a [StoreKey],
    commit: CommitId,
}

impl fmt::Debug for CommittedView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommittedView")
            .field("version", &self.commit.version)
            .finish()
    }
}

impl CommittedView<'_> {
    /// Commit this view reads from
    pub fn commit_id(&self) -> CommitId {
        self.commit
    }

    fn check_mounted(&self, partition: &StoreKey) -> Result<()> {
        if self.mounted.contains(partition) {
            Ok(())
        } else {
            Err(Error::UnknownPartition(partition.name().to_string()))
        }
    }
}

impl KvStore for CommittedView<'_> {
    fn get(&self, partition: &StoreKey, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_mounted(partition)?;
        let cf = CommitStore::cf_handle(self.db, partition)?;
        Ok(self.snapshot.get_cf(&cf, key)?)
    }

    fn set(&mut self, _partition: &StoreKey, _key: &[u8], _value: Vec<u8>) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn delete(&mut self, _partition: &StoreKey, _key: &[u8]) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn prefix_iter(&self, partition: &StoreKey, prefix: &[u8]) -> Result<KvPairs> {
        self.check_mounted(partition)?;
        let cf = CommitStore::cf_handle(self.db, partition)?;
        let mut out = Vec::new();
        let iter = self
            .snapshot
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}
