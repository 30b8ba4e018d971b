//! Proof engine: builds signal proofs from an identity and a membership
//! witness, and checks them through a pluggable proving backend.

use crate::error::{SignalError, SignalResult};
use crate::identity::Identity;
use crate::merkle::MembershipWitness;
use crate::registry::GroupRegistry;
use crate::types::{
    compute_nullifier_hash, external_nullifier, signal_hash, CircuitInputs, ProofLimits,
    PublicInputs, SignalProof,
};
use crate::utils::field_to_hex;
use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;

/// A zero-knowledge proving system for the signaling relation.
///
/// Implementations must be usable from several threads at once.
pub trait ProvingBackend: Send + Sync {
    /// Tree depth the backend's circuit was built for.
    fn depth(&self) -> usize;

    /// Produces a proof for `inputs`, returning the proof bytes and the public
    /// inputs it commits to.
    ///
    /// # Errors
    /// Returns an error if the witness does not satisfy the relation or the
    /// prover fails.
    fn prove(&self, inputs: &CircuitInputs) -> Result<(Vec<u8>, PublicInputs)>;

    /// Checks `proof` against `public`.
    ///
    /// # Errors
    /// Returns an error only when verification could not be carried out;
    /// a proof that simply does not verify yields `Ok(false)`.
    fn verify(&self, proof: &[u8], public: &PublicInputs) -> Result<bool>;
}

/// Produces and checks [`SignalProof`]s.
pub struct ProofEngine {
    backend: Arc<dyn ProvingBackend>,
    registry: Option<Arc<GroupRegistry>>,
    limits: ProofLimits,
}

impl ProofEngine {
    pub fn new(backend: Arc<dyn ProvingBackend>) -> Self {
        Self {
            backend,
            registry: None,
            limits: ProofLimits::default(),
        }
    }

    /// Binds the engine to a registry so that `prove` refuses witnesses whose
    /// root has left the accepted window.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<GroupRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ProofLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn limits(&self) -> &ProofLimits {
        &self.limits
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.backend.depth()
    }

    /// Proves that `identity` is the member behind `witness` and sends
    /// `signal` in `scope`.
    ///
    /// # Arguments
    /// * `identity` - The sender's secret identity
    /// * `witness` - Membership witness for the identity's commitment
    /// * `scope` - Event or topic the nullifier is namespaced by
    /// * `signal` - Payload bound to the proof
    ///
    /// # Errors
    /// - [`SignalError::WitnessStale`] if the engine is bound to a registry and
    ///   the witness root is no longer accepted.
    /// - [`SignalError::ProvingFailure`] if the witness does not belong to the
    ///   identity, is internally inconsistent, has the wrong depth, or the
    ///   backend fails.
    pub fn prove(
        &self,
        identity: &Identity,
        witness: &MembershipWitness,
        scope: &str,
        signal: &[u8],
    ) -> SignalResult<SignalProof> {
        if scope.is_empty() {
            return Err(SignalError::ProvingFailure("scope cannot be empty".into()));
        }
        if signal.len() > self.limits.max_signal_size {
            return Err(SignalError::ProvingFailure(format!(
                "signal size {} exceeds limit of {} bytes",
                signal.len(),
                self.limits.max_signal_size
            )));
        }
        if let Some(registry) = &self.registry {
            registry.ensure_accepted_root(&witness.root)?;
        }
        if witness.leaf != identity.commitment().as_field() {
            return Err(SignalError::ProvingFailure(
                "witness leaf is not this identity's commitment".into(),
            ));
        }
        if witness.depth() != self.backend.depth() {
            return Err(SignalError::ProvingFailure(format!(
                "witness depth {} does not match circuit depth {}",
                witness.depth(),
                self.backend.depth()
            )));
        }
        if !witness.verify() {
            return Err(SignalError::ProvingFailure(
                "membership witness does not hash to its root".into(),
            ));
        }

        let ext = external_nullifier(scope);
        let public = PublicInputs {
            root: witness.root,
            nullifier_hash: compute_nullifier_hash(identity.nullifier_secret(), ext),
            signal_hash: signal_hash(signal),
            external_nullifier: ext,
        };
        let inputs = CircuitInputs {
            trapdoor: identity.trapdoor(),
            nullifier_secret: identity.nullifier_secret(),
            path_elements: witness.path_elements.clone(),
            path_indices: witness.path_indices.clone(),
            public,
        };

        debug!(
            "Proving signal for scope '{}' against root {}",
            scope,
            field_to_hex(public.root)
        );
        let (zkp_proof, public) = self
            .backend
            .prove(&inputs)
            .map_err(|e| SignalError::ProvingFailure(format!("{e:#}")))?;
        info!("Generated proof ({} bytes) for scope '{}'", zkp_proof.len(), scope);

        Ok(SignalProof {
            scope: scope.to_string(),
            signal: signal.to_vec(),
            public_signals: public.to_signals(),
            zkp_proof,
        })
    }

    /// Checks a proof's structure and cryptographic validity.
    ///
    /// Does not consult root freshness or nullifier history.
    ///
    /// # Errors
    /// Returns [`SignalError::MalformedProof`] if the proof fails structural
    /// validation. A proof that is well-formed but does not verify yields
    /// `Ok(false)`.
    pub fn verify(&self, proof: &SignalProof) -> SignalResult<bool> {
        let public = proof.validate(&self.limits)?;
        Ok(self.verify_public(&proof.zkp_proof, &public))
    }

    /// Cryptographic check of proof bytes against already validated public
    /// inputs. Backend errors are logged and count as a failed verification.
    #[must_use]
    pub fn verify_public(&self, zkp_proof: &[u8], public: &PublicInputs) -> bool {
        match self.backend.verify(zkp_proof, public) {
            Ok(valid) => {
                debug!("Backend verification result: {valid}");
                valid
            }
            Err(e) => {
                warn!("Backend could not verify proof: {e:#}");
                false
            }
        }
    }
}
