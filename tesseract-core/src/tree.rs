mod consistency;
mod inclusion;
mod node;

pub use consistency::ConsistencyProof;
pub use inclusion::AuditProof;
pub use node::{Node, NodeKey};

use crate::entry::LeafData;
use crate::store::{Hashable, IndexedStore, Store};
use crate::tiling::{DataTile, DataTileId, Tile, TileId};
use sha2::{Digest, Sha256};
use std::{marker::PhantomData, sync::RwLock};
use thiserror::Error;

/// A SHA-256 digest, as used throughout RFC 6962's Merkle tree.
pub type HashOutput = [u8; 32];

/// An immutable snapshot of the tree: its size and root hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeHead {
    pub tree_size: u64,
    pub head: HashOutput,
}

/// An append-only Merkle tree over `V` entries (RFC 6962 §2.1).
///
/// `N` stores node hashes keyed by leaf range (used to answer audit and
/// consistency proofs); `L` stores the entries themselves, keyed by their
/// sequence index. Both are generic so the same tree logic runs over an
/// in-memory store in tests and an async remote-backed store in
/// production.
pub struct Tree<N, L, V> {
    pub(crate) nodes: N,
    leafs: L,
    // The stack of "perfect" subtree peaks seen so far, ordered left to
    // right (oldest/largest first). Standard incremental Merkle tree
    // construction: a newly inserted leaf merges with its neighbor
    // whenever they form a complete subtree.
    frontier: RwLock<Vec<(NodeKey, HashOutput)>>,
    _value: PhantomData<V>,
}

impl<N, L, V> Tree<N, L, V>
where
    N: Store<NodeKey, HashOutput>,
    L: IndexedStore<V>,
    V: Hashable,
{
    pub fn new(nodes: N, leafs: L) -> Self {
        Self {
            nodes,
            leafs,
            frontier: RwLock::new(vec![]),
            _value: PhantomData,
        }
    }

    /// Append `value` as the next leaf and return its sequence index.
    pub fn insert_entry(&self, value: V) -> u64 {
        let hash = value.hash();
        let index = self.leafs.insert_indexed(value);

        let leaf_key = NodeKey::leaf(index);
        self.nodes.insert(leaf_key.clone(), hash);

        let mut frontier = self.frontier.write().unwrap();
        frontier.push((leaf_key, hash));

        loop {
            let len = frontier.len();
            if len < 2 {
                break;
            }
            let (left_key, left_hash) = frontier[len - 2].clone();
            let (right_key, right_hash) = frontier[len - 1].clone();
            if left_key.size() != right_key.size() {
                break;
            }
            let Some(merged_key) = left_key.merge(&right_key) else {
                break;
            };
            let merged_hash = Node {
                left: left_hash,
                right: right_hash,
            }
            .hash();
            self.nodes.insert(merged_key.clone(), merged_hash);

            frontier.truncate(len - 2);
            frontier.push((merged_key, merged_hash));
        }

        index
    }

    /// Fold the current frontier peaks into the tree root (RFC 6962 MTH).
    pub fn recompute_tree_head(&self) -> TreeHead {
        let frontier = self.frontier.read().unwrap();
        let tree_size = self.leafs.len() as u64;

        let Some((_, last_hash)) = frontier.last() else {
            return TreeHead {
                tree_size: 0,
                // RFC 6962 2.1: MTH({}) = SHA-256().
                head: Sha256::digest([]).into(),
            };
        };

        let mut acc = *last_hash;
        for (_, hash) in frontier.iter().rev().skip(1) {
            acc = Node {
                left: *hash,
                right: acc,
            }
            .hash();
        }

        TreeHead { tree_size, head: acc }
    }

    /// Builds the hash tile `id` from node hashes already computed for each
    /// of its entries, or `None` if any entry's subtree hash has not been
    /// computed yet -- notably the rightmost entry of a partial tile above
    /// level 0, whose subtree may still be incomplete.
    pub fn build_hash_tile(&self, id: &TileId) -> Option<Tile> {
        let entry_size = 256u64.checked_pow(id.level() as u32)?;
        let tile_width_leaves = entry_size.checked_mul(256)?;
        let tile_start = id.index().checked_mul(tile_width_leaves)?;

        let mut hashes = Vec::with_capacity(id.width() as usize);
        for i in 0..id.width() {
            let start = tile_start + i * entry_size;
            let key = NodeKey::range(start, start + entry_size);
            hashes.push(self.nodes.get(&key)?);
        }

        Some(Tile::from_hashes(id.clone(), &hashes))
    }
}

impl<N, L> Tree<N, L, LeafData>
where
    N: Store<NodeKey, HashOutput>,
    L: IndexedStore<LeafData>,
{
    /// Builds the entry bundle `id` from the sequenced leaves it covers, or
    /// `None` if any of them has not been sequenced yet.
    pub fn build_data_tile(&self, id: &DataTileId) -> Option<DataTile> {
        let start = id.index() * 256;

        let mut leaves = Vec::with_capacity(id.width() as usize);
        for i in 0..id.width() {
            leaves.push(self.leafs.get(&(start + i))?);
        }

        Some(DataTile::from_entries(id.clone(), &leaves))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofGenerationError {
    #[error("index {index} is out of range for a tree of size {tree_size}")]
    InvalidIndex { tree_size: u64, index: u64 },

    #[error("first tree size {expected} can not be larger than second tree size {received}")]
    InvalidTreeSize { expected: u64, received: u64 },

    #[error("no hash stored for node {0:?}")]
    KeyNotFound(NodeKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofValidationError {
    #[error("index {index} is out of range for a tree of size {tree_size}")]
    InvalidIndex { tree_size: u64, index: u64 },

    #[error("first tree size {expected} can not be larger than second tree size {received}")]
    InvalidTreeSize { expected: u64, received: u64 },

    #[error("audit path is shorter than expected")]
    PathTooShort,

    #[error("audit path is longer than expected")]
    PathTooLong,

    #[error("computed hash does not match the tree head")]
    HashMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn tree_head_matches_rfc6962_examples() {
        // The 7-leaf example tree from RFC 6962 2.1.1 / the teacher's own
        // inclusion-proof tests.
        let tree = Tree::<_, _, String>::new(MemoryStore::default(), MemoryStore::default());
        for leaf in ["A", "B", "C", "D", "E", "F", "G"] {
            tree.insert_entry(leaf.to_string());
        }
        let head = tree.recompute_tree_head();
        assert_eq!(head.tree_size, 7);

        let proof = tree.get_audit_proof(&head, 0).unwrap();
        proof.validate(&head, &"A".to_string()).unwrap();
    }

    #[test]
    fn empty_tree_head_is_sha256_of_nothing() {
        let tree = Tree::<_, _, String>::new(MemoryStore::default(), MemoryStore::default());
        let head = tree.recompute_tree_head();
        assert_eq!(head.tree_size, 0);
        let expected: HashOutput = Sha256::digest([]).into();
        assert_eq!(head.head, expected);
    }
}
