//! Append-only incremental Merkle tree of identity commitments.
//!
//! The tree has a fixed depth `D`. Leaves are appended left to right and never
//! removed; unoccupied positions hold the zero leaf. Internal nodes are
//! `Poseidon(left, right)`, so the root is a pure function of the leaf sequence.

use crate::error::{SignalError, SignalResult};
use crate::utils::{field_to_hex, poseidon_hash};
use anyhow::Result;
use pasta_curves::group::ff::Field;
use pasta_curves::pallas;
use std::fmt;

/// Largest supported tree depth.
pub const MAX_TREE_DEPTH: usize = 32;

/// Evidence that `leaf` sits in a tree with root `root`.
///
/// `path_indices[i]` is `true` when the node on the path at level `i` is a
/// right child. A witness goes stale as soon as the tree is appended to; that
/// is expected and not an integrity problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipWitness {
    pub leaf: pallas::Base,
    pub leaf_index: usize,
    pub path_elements: Vec<pallas::Base>,
    pub path_indices: Vec<bool>,
    pub root: pallas::Base,
}

/// A fixed-depth, append-only Poseidon Merkle tree.
///
/// Only occupied nodes are stored: `layers[0]` holds the leaves and
/// `layers[l]` the occupied nodes of level `l`. Missing right siblings are
/// the precomputed zero subtree roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalMerkleTree {
    depth: usize,
    zeros: Vec<pallas::Base>,
    layers: Vec<Vec<pallas::Base>>,
}

/// Roots of empty subtrees: `zeros[0]` is the zero leaf and
/// `zeros[l + 1] = H(zeros[l], zeros[l])`.
#[must_use]
pub fn zero_hashes(depth: usize) -> Vec<pallas::Base> {
    let mut zeros = Vec::with_capacity(depth + 1);
    let mut current = pallas::Base::ZERO;
    zeros.push(current);
    for _ in 0..depth {
        current = poseidon_hash(current, current);
        zeros.push(current);
    }
    zeros
}

impl IncrementalMerkleTree {
    /// Creates an empty tree.
    ///
    /// # Errors
    /// Returns an error if `depth` is zero or larger than [`MAX_TREE_DEPTH`].
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(anyhow::anyhow!(
                "Tree depth must be between 1 and {MAX_TREE_DEPTH}, got {depth}"
            ));
        }

        Ok(Self {
            depth,
            zeros: zero_hashes(depth),
            layers: vec![Vec::new(); depth + 1],
        })
    }

    /// Builds a tree by appending `leaves` in order.
    ///
    /// # Errors
    /// Returns an error if the depth is invalid or the leaves do not fit.
    pub fn from_leaves(depth: usize, leaves: &[pallas::Base]) -> Result<Self> {
        let mut tree = Self::new(depth)?;
        for leaf in leaves {
            tree.insert(*leaf)?;
        }
        Ok(tree)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        1usize << self.depth
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    #[must_use]
    pub fn leaves(&self) -> &[pallas::Base] {
        &self.layers[0]
    }

    #[must_use]
    pub fn root(&self) -> pallas::Base {
        self.layers[self.depth]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth])
    }

    /// Appends `leaf` at the next free index and returns the new root.
    ///
    /// Recomputes only the `D` nodes on the new leaf's path.
    ///
    /// # Errors
    /// Returns [`SignalError::GroupFull`] if every leaf is occupied; the tree
    /// is left unchanged.
    pub fn insert(&mut self, leaf: pallas::Base) -> SignalResult<pallas::Base> {
        if self.is_full() {
            return Err(SignalError::GroupFull {
                capacity: self.capacity(),
            });
        }

        let mut index = self.len();
        self.layers[0].push(leaf);

        for level in 0..self.depth {
            let parent = index / 2;
            let left = self.layers[level][parent * 2];
            let right = self.node(level, parent * 2 + 1);
            let hash = poseidon_hash(left, right);

            let next = &mut self.layers[level + 1];
            if parent < next.len() {
                next[parent] = hash;
            } else {
                next.push(hash);
            }
            index = parent;
        }

        Ok(self.root())
    }

    /// Membership witness for the leaf at `leaf_index` against the current root.
    #[must_use]
    pub fn witness(&self, leaf_index: usize) -> Option<MembershipWitness> {
        if leaf_index >= self.len() {
            return None;
        }

        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut index = leaf_index;

        for level in 0..self.depth {
            path_elements.push(self.node(level, index ^ 1));
            path_indices.push(index % 2 == 1);
            index /= 2;
        }

        Some(MembershipWitness {
            leaf: self.layers[0][leaf_index],
            leaf_index,
            path_elements,
            path_indices,
            root: self.root(),
        })
    }

    fn node(&self, level: usize, index: usize) -> pallas::Base {
        self.layers[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }
}

impl MembershipWitness {
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }

    /// Root obtained by hashing `leaf` up along the path.
    #[must_use]
    pub fn compute_root(&self) -> pallas::Base {
        self.path_elements
            .iter()
            .zip(&self.path_indices)
            .fold(self.leaf, |current, (sibling, is_right)| {
                if *is_right {
                    poseidon_hash(*sibling, current)
                } else {
                    poseidon_hash(current, *sibling)
                }
            })
    }

    /// Whether the path is well formed and recomputes to `root`.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.path_elements.len() == self.path_indices.len() && self.compute_root() == self.root
    }
}

impl fmt::Display for MembershipWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MembershipWitness:\n  Leaf: {}\n  Root: {}\n  Index: {}\n  Depth: {}",
            field_to_hex(self.leaf),
            field_to_hex(self.root),
            self.leaf_index,
            self.depth()
        )
    }
}
