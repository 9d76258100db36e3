//! Lean incremental Merkle tree
//!
//! This module implements the append-only Merkle tree the token contract
//! maintains over its transfers, and the inclusion paths the wormhole circuit
//! consumes. The construction is the "lean" variant:
//!
//! - a parent is `poseidon(left, right)`
//! - a node with no right sibling is carried up to the next level unchanged
//! - the depth is `ceil(log2(size))`, so a single leaf is its own root
//!
//! Inclusion proofs therefore only contain siblings that exist, and the path
//! index packs the left/right decision of those levels only. The circuit takes
//! a fixed-width path, so [`prove_inclusion`] pads to [`MAX_DEPTH`] with a
//! zero sentinel that the fold skips.

use ark_bn254::Fr;
use ark_ff::Zero;

use crate::crypto::{poseidon_hash, CryptoError};

/// Maximum tree depth accepted by the circuit
pub const MAX_DEPTH: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    #[error("leaf not found in merkle tree")]
    NotFound,
    #[error("leaf index {index} out of range for a tree of {size} leaves")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("tree depth {depth} exceeds the circuit maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Append-only Merkle tree over field elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeanMerkleTree {
    /// `nodes[0]` holds the leaves, `nodes[depth]` holds the root
    nodes: Vec<Vec<Fr>>,
}

impl Default for LeanMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LeanMerkleTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            nodes: vec![Vec::new()],
        }
    }

    /// Build a tree from a leaf sequence in one pass
    ///
    /// Hashes level by level, which costs `size - 1` hashes instead of the
    /// `size * depth` that repeated [`insert`](Self::insert) would.
    ///
    /// # Arguments
    /// * `leaves` - Leaf hashes in tree order
    ///
    /// # Returns
    /// * The populated tree, or the first hashing error
    pub fn from_leaves(leaves: &[Fr]) -> Result<Self, MerkleError> {
        let mut nodes = vec![leaves.to_vec()];
        while nodes.last().map_or(false, |level| level.len() > 1) {
            let level = &nodes[nodes.len() - 1];
            let mut parents = Vec::with_capacity((level.len() + 1) / 2);
            for pair in level.chunks(2) {
                match pair {
                    [left, right] => parents.push(poseidon_hash(*left, *right)?),
                    [single] => parents.push(*single),
                    _ => unreachable!("chunks(2) yields one or two elements"),
                }
            }
            nodes.push(parents);
        }
        Ok(Self { nodes })
    }

    /// Append one leaf, updating the path to the root
    ///
    /// # Arguments
    /// * `leaf` - Leaf hash to append
    pub fn insert(&mut self, leaf: Fr) -> Result<(), MerkleError> {
        let mut index = self.size();

        // Grow by one level when the new leaf does not fit under the root
        if (1usize << self.depth()) < index + 1 {
            self.nodes.push(Vec::new());
        }

        let depth = self.depth();
        let mut node = leaf;
        for level in 0..depth {
            set_or_push(&mut self.nodes[level], index, node);
            if index & 1 == 1 {
                let sibling = self.nodes[level][index - 1];
                node = poseidon_hash(sibling, node)?;
            }
            index >>= 1;
        }
        self.nodes[depth] = vec![node];
        Ok(())
    }

    /// Number of leaves
    pub fn size(&self) -> usize {
        self.nodes[0].len()
    }

    /// Number of hashing levels above the leaves
    pub fn depth(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Root of the tree, `None` while empty
    pub fn root(&self) -> Option<Fr> {
        self.nodes[self.depth()].first().copied()
    }

    pub fn leaves(&self) -> &[Fr] {
        &self.nodes[0]
    }

    /// Position of the first leaf equal to `leaf`
    pub fn index_of(&self, leaf: &Fr) -> Option<usize> {
        self.nodes[0].iter().position(|candidate| candidate == leaf)
    }

    /// Build the compact inclusion proof of the leaf at `index`
    ///
    /// # Arguments
    /// * `index` - Leaf position
    ///
    /// # Returns
    /// * Proof listing only the siblings that exist, leaf to root
    pub fn generate_proof(&self, index: usize) -> Result<InclusionProof, MerkleError> {
        let size = self.size();
        if index >= size {
            return Err(MerkleError::IndexOutOfRange { index, size });
        }

        let leaf = self.nodes[0][index];
        let mut siblings = Vec::new();
        let mut path_bits = 0u64;
        let mut position = index;

        for level in 0..self.depth() {
            let is_right = position & 1 == 1;
            let sibling_index = if is_right { position - 1 } else { position + 1 };
            if let Some(sibling) = self.nodes[level].get(sibling_index) {
                if is_right {
                    path_bits |= 1 << siblings.len();
                }
                siblings.push(*sibling);
            }
            position >>= 1;
        }

        let root = self.root().ok_or(MerkleError::NotFound)?;
        Ok(InclusionProof {
            root,
            leaf,
            siblings,
            index: path_bits,
            leaf_index: index,
        })
    }
}

fn set_or_push(level: &mut Vec<Fr>, index: usize, node: Fr) {
    if index < level.len() {
        level[index] = node;
    } else {
        level.push(node);
    }
}

/// Fold a leaf up a path: bit `i` of `index` set means the node is the
/// right child at the `i`-th non-sentinel sibling.
fn fold_path<'a>(leaf: Fr, siblings: impl IntoIterator<Item = &'a Fr>, index: u64) -> Result<Fr, CryptoError> {
    let mut node = leaf;
    for (level, sibling) in siblings.into_iter().filter(|s| !s.is_zero()).enumerate() {
        node = if (index >> level) & 1 == 1 {
            poseidon_hash(*sibling, node)?
        } else {
            poseidon_hash(node, *sibling)?
        };
    }
    Ok(node)
}

/// Compact inclusion proof as produced by the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProof {
    pub root: Fr,
    pub leaf: Fr,
    /// Existing siblings, leaf level first
    pub siblings: Vec<Fr>,
    /// Packed left/right decisions, one bit per sibling
    pub index: u64,
    /// Position of the leaf in the tree
    pub leaf_index: usize,
}

impl InclusionProof {
    /// Recompute the root from the leaf and check it
    pub fn verify(&self) -> Result<bool, MerkleError> {
        Ok(fold_path(self.leaf, &self.siblings, self.index)? == self.root)
    }

    /// Pad to the circuit's fixed path width
    pub fn padded(&self) -> Result<MerklePath, MerkleError> {
        if self.siblings.len() > MAX_DEPTH {
            return Err(MerkleError::DepthExceeded {
                depth: self.siblings.len(),
                max: MAX_DEPTH,
            });
        }
        let mut siblings = [Fr::zero(); MAX_DEPTH];
        siblings[..self.siblings.len()].copy_from_slice(&self.siblings);
        Ok(MerklePath {
            root: self.root,
            siblings,
            index: self.index,
            leaf_index: self.leaf_index,
        })
    }
}

/// Fixed-width inclusion path as the circuit consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    pub root: Fr,
    /// Real siblings first, zero sentinels after
    pub siblings: [Fr; MAX_DEPTH],
    pub index: u64,
    pub leaf_index: usize,
}

impl MerklePath {
    /// Number of real (non-sentinel) siblings
    pub fn depth(&self) -> usize {
        self.siblings.iter().take_while(|s| !s.is_zero()).count()
    }

    /// Fold `leaf` up this path
    pub fn compute_root(&self, leaf: Fr) -> Result<Fr, MerkleError> {
        Ok(fold_path(leaf, &self.siblings, self.index)?)
    }

    pub fn verify(&self, leaf: Fr) -> Result<bool, MerkleError> {
        Ok(self.compute_root(leaf)? == self.root)
    }
}

/// Locate `leaf` in `tree` and return its padded inclusion path
///
/// A missing leaf is an expected condition (the funding transfer may not be
/// indexed yet) and is reported as [`MerkleError::NotFound`]. The tree is
/// never modified.
///
/// # Arguments
/// * `tree` - Tree rebuilt from the transfer history
/// * `leaf` - Leaf hash to prove
///
/// # Returns
/// * Root, padded siblings and path index
pub fn prove_inclusion(tree: &LeanMerkleTree, leaf: &Fr) -> Result<MerklePath, MerkleError> {
    if tree.depth() > MAX_DEPTH {
        return Err(MerkleError::DepthExceeded {
            depth: tree.depth(),
            max: MAX_DEPTH,
        });
    }
    let index = tree.index_of(leaf).ok_or(MerkleError::NotFound)?;
    tree.generate_proof(index)?.padded()
}
