//! Merkle commitments over partition contents
//!
//! # Design
//!
//! - Binary Merkle tree with SHA-256 hashing
//! - Leaves are `(key, value)` pairs in key order, domain-separated from
//!   interior nodes so a leaf can never be passed off as a subtree
//! - One tree per partition, one tree over `(partition name, partition root)`
//!   pairs for the global state root
//! - Odd levels duplicate their last node

use crate::crypto::hash_bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const LEAF_PREFIX: u8 = 0x00;
const INNER_PREFIX: u8 = 0x01;

/// Root of a tree with no leaves
pub const EMPTY_ROOT: [u8; 32] = [0u8; 32];

/// Hash a pair of hashes (used for internal nodes)
fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([INNER_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Leaf hash of one key/value entry: `H(0x00 ‖ len(k) ‖ k ‖ H(v))`
pub fn kv_leaf(key: &[u8], value: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update((key.len() as u64).to_be_bytes());
    hasher.update(key);
    hasher.update(hash_bytes(value));
    hasher.finalize().into()
}

/// Leaf hash of one partition in the global tree
pub fn partition_leaf(name: &str, root: &[u8; 32]) -> [u8; 32] {
    kv_leaf(name.as_bytes(), root)
}

/// Direction of sibling in Merkle tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Sibling is on the left
    Left,
    /// Sibling is on the right
    Right,
}

/// Merkle proof (path from leaf to root)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf hash being proven
    pub leaf_hash: [u8; 32],
    /// Sibling hashes along the path to root
    pub siblings: Vec<(Direction, [u8; 32])>,
    /// Root hash
    pub root_hash: [u8; 32],
}

impl MerkleProof {
    /// Recompute the root from the leaf and siblings
    pub fn computed_root(&self) -> [u8; 32] {
        self.siblings
            .iter()
            .fold(self.leaf_hash, |current, (direction, sibling)| match direction {
                Direction::Left => hash_pair(sibling, &current),
                Direction::Right => hash_pair(&current, sibling),
            })
    }

    /// Verify proof against its own root hash
    pub fn verify(&self) -> bool {
        self.computed_root() == self.root_hash
    }
}

/// Proof that `key = value` is committed under a global state root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProof {
    /// Partition name
    pub partition: String,
    /// Entry key
    pub key: Vec<u8>,
    /// Entry value
    pub value: Vec<u8>,
    /// Entry → partition root
    pub entry_proof: MerkleProof,
    /// Partition root → global root
    pub partition_proof: MerkleProof,
}

impl StoreProof {
    /// Verify the whole chain against a trusted state root
    pub fn verify(&self, state_root: &[u8; 32]) -> bool {
        self.entry_proof.leaf_hash == kv_leaf(&self.key, &self.value)
            && self.entry_proof.verify()
            && self.partition_proof.leaf_hash
                == partition_leaf(&self.partition, &self.entry_proof.root_hash)
            && self.partition_proof.verify()
            && &self.partition_proof.root_hash == state_root
    }
}

/// Merkle tree over a fixed, ordered leaf list
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    leaves: Vec<[u8; 32]>,
}

impl MerkleTree {
    /// Create tree from existing leaves
    pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Self {
        Self { leaves }
    }

    /// Get number of leaves
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Compute Merkle root
    pub fn root(&self) -> [u8; 32] {
        if self.leaves.is_empty() {
            return EMPTY_ROOT;
        }

        let mut current_level = self.leaves.clone();
        while current_level.len() > 1 {
            current_level = Self::next_level(&current_level);
        }
        current_level[0]
    }

    fn next_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
        level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [single] => hash_pair(single, single),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect()
    }

    /// Generate Merkle proof for a leaf at given index
    pub fn generate_proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        if leaf_index >= self.leaves.len() {
            return None;
        }

        let leaf_hash = self.leaves[leaf_index];
        let mut siblings = Vec::new();
        let mut current_level = self.leaves.clone();
        let mut current_index = leaf_index;

        // Walk up the tree, collecting siblings
        while current_level.len() > 1 {
            if current_index % 2 == 0 {
                let sibling_index = (current_index + 1).min(current_level.len() - 1);
                siblings.push((Direction::Right, current_level[sibling_index]));
            } else {
                siblings.push((Direction::Left, current_level[current_index - 1]));
            }

            current_level = Self::next_level(&current_level);
            current_index /= 2;
        }

        Some(MerkleProof {
            leaf_hash,
            siblings,
            root_hash: current_level[0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::default();
        assert!(tree.is_empty());
        assert_eq!(tree.root(), EMPTY_ROOT);
        assert!(tree.generate_proof(0).is_none());
    }

    #[test]
    fn test_single_leaf() {
        let leaf = kv_leaf(b"k", b"v");
        let tree = MerkleTree::from_leaves(vec![leaf]);
        assert_eq!(tree.root(), leaf);

        let proof = tree.generate_proof(0).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(proof.verify());
    }

    #[test]
    fn test_odd_number_leaves() {
        let leaves = vec![kv_leaf(b"a", b"1"), kv_leaf(b"b", b"2"), kv_leaf(b"c", b"3")];
        let tree = MerkleTree::from_leaves(leaves.clone());

        let h01 = hash_pair(&leaves[0], &leaves[1]);
        let h22 = hash_pair(&leaves[2], &leaves[2]);
        assert_eq!(tree.root(), hash_pair(&h01, &h22));
    }

    #[test]
    fn test_every_proof_verifies() {
        let leaves: Vec<[u8; 32]> = (0u8..7)
            .map(|i| kv_leaf(&[i], &[i, i]))
            .collect();
        let tree = MerkleTree::from_leaves(leaves);
        let root = tree.root();

        for i in 0..tree.len() {
            let proof = tree.generate_proof(i).unwrap();
            assert_eq!(proof.root_hash, root);
            assert!(proof.verify(), "proof {} failed", i);
        }
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = MerkleTree::from_leaves(vec![kv_leaf(b"a", b"1"), kv_leaf(b"b", b"2")]);
        let mut proof = tree.generate_proof(0).unwrap();
        proof.leaf_hash = kv_leaf(b"a", b"2");
        assert!(!proof.verify());
    }

    #[test]
    fn test_leaf_is_not_an_inner_node() {
        let left = kv_leaf(b"a", b"1");
        let right = kv_leaf(b"b", b"2");
        assert_ne!(hash_pair(&left, &right), kv_leaf(&[left, right].concat(), b""));
    }
}
