//! Error taxonomy for the anonymous signaling core.
//!
//! Every failure is reported with its specific kind so that callers can tell a
//! bad proof apart from a reused nullifier or a stale group root.

use thiserror::Error;

/// Errors produced by identity derivation, group management, proving and
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The identity seed was empty or otherwise unusable.
    #[error("invalid identity seed: {0}")]
    InvalidSeed(String),

    /// All `capacity` leaves of the group tree are occupied.
    #[error("group is full: all {capacity} leaves are occupied")]
    GroupFull { capacity: usize },

    /// The commitment is not enrolled in the group.
    #[error("commitment {0} is not a member of the group")]
    NotAMember(String),

    /// The commitment is already enrolled at `index`.
    #[error("commitment {commitment} is already enrolled at index {index}")]
    DuplicateCommitment { commitment: String, index: usize },

    /// The root is not (or no longer) within the accepted root window.
    /// Recoverable by fetching a fresh witness and proving again.
    #[error("group root {0} is not an accepted root; fetch a fresh witness and re-prove")]
    WitnessStale(String),

    /// The proving backend could not produce a proof for the given inputs.
    #[error("proof generation failed: {0}")]
    ProvingFailure(String),

    /// The proof or its public signals are structurally invalid.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The proof is well formed but does not verify.
    #[error("proof verification failed")]
    InvalidProof,

    /// The nullifier has already been used in this scope.
    #[error("nullifier {nullifier} has already been used in scope '{scope}'")]
    DuplicateNullifier { scope: String, nullifier: String },
}

impl SignalError {
    /// Whether the caller can recover by obtaining a fresh witness and proving
    /// again. Every other kind is terminal for the submission.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SignalError::WitnessStale(_))
    }
}

pub type SignalResult<T> = Result<T, SignalError>;
