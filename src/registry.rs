//! Group registry: owns the membership tree and the window of accepted roots.
//!
//! Inserts take the write lock, so appends are serialized and every root is
//! the root of a well-defined leaf prefix. Witness reads take the read lock
//! only long enough to copy a path out; the returned witness may be superseded
//! immediately by a concurrent insert.

use crate::enrollment::EnrollmentSource;
use crate::error::{SignalError, SignalResult};
use crate::identity::Commitment;
use crate::merkle::{IncrementalMerkleTree, MembershipWitness};
use crate::utils::field_to_hex;
use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::RwLock;
use pasta_curves::pallas;
use std::collections::{HashMap, VecDeque};

/// Default number of most recent roots (current included) accepted for proofs.
pub const DEFAULT_ROOT_HISTORY_SIZE: usize = 30;

#[derive(Debug)]
struct RegistryState {
    tree: IncrementalMerkleTree,
    indices: HashMap<[u8; 32], usize>,
    recent_roots: VecDeque<pallas::Base>,
}

/// Append-only group of identity commitments.
#[derive(Debug)]
pub struct GroupRegistry {
    state: RwLock<RegistryState>,
    root_history_size: usize,
}

impl GroupRegistry {
    /// Creates an empty group of the given depth.
    ///
    /// # Errors
    /// Returns an error for an unsupported depth or a zero history size.
    pub fn new(depth: usize, root_history_size: usize) -> Result<Self> {
        if root_history_size == 0 {
            return Err(anyhow::anyhow!("Root history size must be at least 1"));
        }

        let tree = IncrementalMerkleTree::new(depth)?;
        let mut recent_roots = VecDeque::with_capacity(root_history_size);
        recent_roots.push_back(tree.root());

        Ok(Self {
            state: RwLock::new(RegistryState {
                tree,
                indices: HashMap::new(),
                recent_roots,
            }),
            root_history_size,
        })
    }

    /// Creates a group and replays the commitments supplied by `source`.
    ///
    /// # Errors
    /// Returns an error if the source cannot be read or a commitment cannot be
    /// enrolled (duplicate or group full).
    pub fn from_source(
        depth: usize,
        root_history_size: usize,
        source: &dyn EnrollmentSource,
    ) -> Result<Self> {
        let registry = Self::new(depth, root_history_size)?;
        let commitments = source
            .load_commitments()
            .context("Failed to load enrollment commitments")?;

        for (i, commitment) in commitments.iter().enumerate() {
            registry
                .insert(*commitment)
                .with_context(|| format!("Failed to enroll commitment {} ({commitment})", i + 1))?;
        }

        info!(
            "Group ready: {} members, depth {}, root {}",
            registry.len(),
            depth,
            field_to_hex(registry.root())
        );
        Ok(registry)
    }

    /// Appends a commitment and returns the new root.
    ///
    /// # Errors
    /// - [`SignalError::GroupFull`] if all `2^D` leaves are occupied.
    /// - [`SignalError::DuplicateCommitment`] if the commitment is already enrolled.
    ///
    /// The group is unchanged on error.
    pub fn insert(&self, commitment: Commitment) -> SignalResult<pallas::Base> {
        let mut state = self.state.write();
        let key = commitment.to_bytes();

        if let Some(index) = state.indices.get(&key) {
            return Err(SignalError::DuplicateCommitment {
                commitment: commitment.to_hex(),
                index: *index,
            });
        }

        let index = state.tree.len();
        let root = state.tree.insert(commitment.as_field())?;
        state.indices.insert(key, index);

        state.recent_roots.push_back(root);
        while state.recent_roots.len() > self.root_history_size {
            state.recent_roots.pop_front();
        }

        debug!("Enrolled {commitment} at index {index}, root {}", field_to_hex(root));
        Ok(root)
    }

    /// Snapshot witness for `commitment` against the current root.
    ///
    /// # Errors
    /// Returns [`SignalError::NotAMember`] if the commitment is not enrolled.
    pub fn witness_for(&self, commitment: &Commitment) -> SignalResult<MembershipWitness> {
        let state = self.state.read();
        state
            .indices
            .get(&commitment.to_bytes())
            .and_then(|index| state.tree.witness(*index))
            .ok_or_else(|| SignalError::NotAMember(commitment.to_hex()))
    }

    /// Whether `root` is within the accepted recency window.
    #[must_use]
    pub fn is_accepted_root(&self, root: &pallas::Base) -> bool {
        self.state.read().recent_roots.contains(root)
    }

    /// # Errors
    /// Returns [`SignalError::WitnessStale`] if `root` is outside the window.
    pub fn ensure_accepted_root(&self, root: &pallas::Base) -> SignalResult<()> {
        if self.is_accepted_root(root) {
            Ok(())
        } else {
            Err(SignalError::WitnessStale(field_to_hex(*root)))
        }
    }

    #[must_use]
    pub fn root(&self) -> pallas::Base {
        self.state.read().tree.root()
    }

    /// Accepted roots, oldest first; the last entry is the current root.
    #[must_use]
    pub fn root_history(&self) -> Vec<pallas::Base> {
        self.state.read().recent_roots.iter().copied().collect()
    }

    #[must_use]
    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.state.read().indices.contains_key(&commitment.to_bytes())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().tree.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.read().tree.depth()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.read().tree.capacity()
    }

    #[must_use]
    pub fn root_history_size(&self) -> usize {
        self.root_history_size
    }
}
