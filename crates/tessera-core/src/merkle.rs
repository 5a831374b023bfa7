//! Transaction Merkle commitment.
//!
//! Leaves and interior nodes are hashed with distinct BLAKE3 prefixes
//! (`0x00` and `0x01`). An unpaired node at the end of a layer is carried up
//! unchanged instead of being paired with itself, so a transaction list and
//! the same list with its last entry repeated never share a root.
//! The empty list commits to [`Hash256::ZERO`].

use serde::{Deserialize, Serialize};

use crate::types::Hash256;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// `BLAKE3(0x00 || leaf)`.
pub fn leaf_hash(leaf: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(leaf.as_bytes());
    Hash256(hasher.finalize().into())
}

/// `BLAKE3(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Root over `leaves` (normally transaction IDs in block order).
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    let mut layer: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();
    while layer.len() > 1 {
        layer = reduce(&layer);
    }
    layer.first().copied().unwrap_or(Hash256::ZERO)
}

fn reduce(layer: &[Hash256]) -> Vec<Hash256> {
    layer
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => *single,
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// All layers of a Merkle tree, kept for proof extraction.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `layers[0]` holds leaf hashes, the last layer holds the root.
    layers: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[Hash256]) -> Self {
        let mut layers = vec![leaves.iter().map(leaf_hash).collect::<Vec<_>>()];
        while let Some(top) = layers.last().filter(|l| l.len() > 1) {
            let next = reduce(top);
            layers.push(next);
        }
        Self { layers }
    }

    pub fn root(&self) -> Hash256 {
        self.layers
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or(Hash256::ZERO)
    }

    pub fn leaf_count(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }

    /// Inclusion proof for the leaf at `index`, or `None` if out of range.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut siblings = Vec::new();
        let mut pos = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = pos ^ 1;
            // Carried-up nodes have no sibling at this level.
            if let Some(hash) = layer.get(sibling) {
                siblings.push(ProofStep {
                    hash: *hash,
                    sibling_on_left: sibling < pos,
                });
            }
            pos /= 2;
        }
        Some(MerkleProof { index, siblings })
    }
}

/// One sibling on the path from a leaf to the root.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ProofStep {
    pub hash: Hash256,
    pub sibling_on_left: bool,
}

/// Compact inclusion proof for one transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct MerkleProof {
    pub index: usize,
    pub siblings: Vec<ProofStep>,
}

impl MerkleProof {
    /// Whether `leaf` is committed to by `root` through this proof.
    pub fn verify(&self, leaf: &Hash256, root: &Hash256) -> bool {
        let computed = self.siblings.iter().fold(leaf_hash(leaf), |acc, step| {
            if step.sibling_on_left {
                node_hash(&step.hash, &acc)
            } else {
                node_hash(&acc, &step.hash)
            }
        });
        computed == *root
    }
}
