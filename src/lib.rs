//! Anonymous, replay-resistant group signaling.
//!
//! A member of a group proves in zero knowledge that they hold an identity
//! enrolled in the group and sends a signal, without revealing which member
//! they are. A per-scope nullifier prevents the same member from signaling
//! twice in one scope.
//!
//! # Components
//!
//! - [`identity`]: secret identities and their public [`Commitment`]s
//! - [`registry::GroupRegistry`]: append-only group tree with a window of accepted roots
//! - [`engine::ProofEngine`]: proof generation and verification over a [`ProvingBackend`]
//! - [`circuit::Halo2Backend`]: halo2 implementation of the proving backend
//! - [`ledger::SignalLedger`]: consumed nullifiers per scope
//! - [`service::VerificationService`]: accepts or rejects submitted proofs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zkp_anon_signal::{
//!     derive_identity, GroupRegistry, Halo2Backend, ProofEngine, SignalLedger,
//!     VerificationService, CIRCUIT_K, TREE_DEPTH,
//! };
//!
//! let identity = derive_identity(b"my secret seed").unwrap();
//! let registry = Arc::new(GroupRegistry::new(TREE_DEPTH, 30).unwrap());
//! registry.insert(identity.commitment()).unwrap();
//!
//! let backend = Arc::new(Halo2Backend::<TREE_DEPTH>::new(CIRCUIT_K).unwrap());
//! let engine = Arc::new(ProofEngine::new(backend));
//! let witness = registry.witness_for(&identity.commitment()).unwrap();
//! let proof = engine.prove(&identity, &witness, "event-1", b"Hello world").unwrap();
//!
//! let service = VerificationService::new(registry, engine, Arc::new(SignalLedger::new()));
//! service.submit(&proof).unwrap();
//! assert!(service.submit(&proof).is_err());
//! ```

pub mod circuit;
pub mod config;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod merkle;
pub mod registry;
pub mod service;
pub mod types;
pub mod utils;


pub use circuit::{Halo2Backend, SignalCircuit};
pub use engine::{ProofEngine, ProvingBackend};
pub use enrollment::{CommitmentsFile, EnrollmentSource};
pub use error::{SignalError, SignalResult};
pub use identity::{commitment_of, derive_identity, Commitment, Identity};
pub use ledger::{AcceptedSignal, LedgerLock, SignalLedger};
pub use merkle::{IncrementalMerkleTree, MembershipWitness};
pub use registry::GroupRegistry;
pub use service::{SignalSubscriber, SubscriptionId, VerificationService};
pub use types::{ProofLimits, PublicInputs, PublicSignals, SignalProof};
pub use utils::{field_from_hex, field_to_hex, poseidon_hash};

/// Circuit parameter for the halo2 proving system.
///
/// The value `k=12` gives 2^12 = 4096 rows, enough for the Poseidon hashes of
/// a depth-[`TREE_DEPTH`] membership path plus the commitment and nullifier.
///
/// # Security Considerations
///
/// Changing `CIRCUIT_K` requires regenerating the proving parameters.
/// Prover and verifier must use the same value, or verification will fail.
pub const CIRCUIT_K: u32 = 12;

/// Depth of the group tree used by the command-line tools (2^20 members).
pub const TREE_DEPTH: usize = 20;
