//! Verification service: the single entry point that accepts or rejects a
//! submitted signal proof.
//!
//! A submission passes through, in order: structural validation, the root
//! recency check, cryptographic verification, and the ledger's atomic
//! test-and-set. Only a proof that verified can reach the ledger, and only a
//! ledger insert counts as acceptance, so no partial outcome is observable.

use crate::engine::ProofEngine;
use crate::error::{SignalError, SignalResult};
use crate::ledger::{AcceptedSignal, SignalLedger};
use crate::registry::GroupRegistry;
use crate::types::SignalProof;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives accepted signals. Delivery is fire-and-forget.
pub trait SignalSubscriber: Send + Sync {
    fn on_signal(&self, accepted: &AcceptedSignal);
}

impl<F> SignalSubscriber for F
where
    F: Fn(&AcceptedSignal) + Send + Sync,
{
    fn on_signal(&self, accepted: &AcceptedSignal) {
        self(accepted);
    }
}

/// Handle returned by [`VerificationService::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct VerificationService {
    registry: Arc<GroupRegistry>,
    engine: Arc<ProofEngine>,
    ledger: Arc<SignalLedger>,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn SignalSubscriber>)>>,
    next_subscription: AtomicU64,
}

impl VerificationService {
    pub fn new(
        registry: Arc<GroupRegistry>,
        engine: Arc<ProofEngine>,
        ledger: Arc<SignalLedger>,
    ) -> Self {
        Self {
            registry,
            engine,
            ledger,
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Verifies and records a signal proof.
    ///
    /// # Errors
    /// - [`SignalError::MalformedProof`] if the proof fails structural validation.
    /// - [`SignalError::WitnessStale`] if the proof's root is not an accepted root.
    /// - [`SignalError::InvalidProof`] if the proof does not verify.
    /// - [`SignalError::DuplicateNullifier`] if the nullifier was already used
    ///   in the proof's scope.
    ///
    /// The ledger is only modified on success.
    pub fn submit(&self, proof: &SignalProof) -> SignalResult<AcceptedSignal> {
        let result = self.try_submit(proof);
        if let Err(e) = &result {
            warn!("Rejected signal for scope '{}': {e}", proof.scope);
        }
        result
    }

    fn try_submit(&self, proof: &SignalProof) -> SignalResult<AcceptedSignal> {
        let public = proof.validate(self.engine.limits())?;
        self.registry.ensure_accepted_root(&public.root)?;

        if !self.engine.verify_public(&proof.zkp_proof, &public) {
            return Err(SignalError::InvalidProof);
        }
        debug!("Proof verified for scope '{}'", proof.scope);

        let accepted =
            self.ledger
                .check_and_record(&proof.scope, public.nullifier_hash, &proof.signal)?;
        info!("Accepted signal in scope '{}'", accepted.scope);

        self.notify(&accepted);
        Ok(accepted)
    }

    fn notify(&self, accepted: &AcceptedSignal) {
        let subscribers: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            // Acceptance is already committed; a panicking subscriber is skipped.
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_signal(accepted)));
            if delivered.is_err() {
                warn!(
                    "Subscriber panicked while handling signal in scope '{}'",
                    accepted.scope
                );
            }
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn SignalSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        debug!("Added subscriber {id:?}");
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<ProofEngine> {
        &self.engine
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<SignalLedger> {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::MockBackend;
    use crate::identity::{derive_identity, Identity};
    use crate::utils::field_to_hex;
    use parking_lot::Mutex;
    use pasta_curves::pallas;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    struct Fixture {
        backend: Arc<MockBackend>,
        service: VerificationService,
        identities: Vec<Identity>,
    }

    fn fixture(history: usize) -> Fixture {
        let registry = Arc::new(GroupRegistry::new(4, history).unwrap());
        let identities: Vec<_> = (0..3)
            .map(|i| derive_identity(format!("member-{i}").as_bytes()).unwrap())
            .collect();
        for identity in &identities {
            registry.insert(identity.commitment()).unwrap();
        }

        let backend = Arc::new(MockBackend::new(4));
        let engine = Arc::new(ProofEngine::new(backend.clone()));
        let service =
            VerificationService::new(registry, engine, Arc::new(SignalLedger::new()));
        Fixture {
            backend,
            service,
            identities,
        }
    }

    impl Fixture {
        fn proof(&self, member: usize, scope: &str, signal: &[u8]) -> SignalProof {
            let identity = &self.identities[member];
            let witness = self
                .service
                .registry()
                .witness_for(&identity.commitment())
                .unwrap();
            self.service
                .engine()
                .prove(identity, &witness, scope, signal)
                .unwrap()
        }

        fn verify_calls(&self) -> usize {
            self.backend
                .verify_calls
                .load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[test]
    fn test_submit_then_resubmit() {
        let f = fixture(4);
        let proof = f.proof(0, "event-1", b"Hello world");

        let accepted = f.service.submit(&proof).unwrap();
        assert_eq!(accepted.scope, "event-1");
        assert_eq!(accepted.signal, b"Hello world");
        assert_eq!(accepted.nullifier_hash, proof.public_signals.nullifier_hash);

        assert!(matches!(
            f.service.submit(&proof),
            Err(SignalError::DuplicateNullifier { .. })
        ));
        assert_eq!(f.service.ledger().len(), 1);
    }

    #[test]
    fn test_distinct_members_and_scopes_are_accepted() {
        let f = fixture(4);
        f.service.submit(&f.proof(0, "event-1", b"a")).unwrap();
        f.service.submit(&f.proof(1, "event-1", b"b")).unwrap();
        f.service.submit(&f.proof(0, "event-2", b"c")).unwrap();
        assert_eq!(f.service.ledger().len(), 3);

        // Same member, same scope, different signal: still a reuse.
        assert!(matches!(
            f.service.submit(&f.proof(1, "event-1", b"other")),
            Err(SignalError::DuplicateNullifier { .. })
        ));
    }

    #[test]
    fn test_malformed_proof_never_reaches_backend() {
        let f = fixture(4);
        let mut proof = f.proof(0, "event-1", b"x");
        proof.public_signals.root = "not-hex".into();

        assert!(matches!(
            f.service.submit(&proof),
            Err(SignalError::MalformedProof(_))
        ));
        assert_eq!(f.verify_calls(), 0);
        assert!(f.service.ledger().is_empty());
    }

    #[test]
    fn test_unknown_root_is_stale() {
        let f = fixture(4);
        let mut proof = f.proof(0, "event-1", b"x");
        proof.public_signals.root = field_to_hex(pallas::Base::from(5));

        let err = f.service.submit(&proof).unwrap_err();
        assert!(matches!(err, SignalError::WitnessStale(_)));
        assert_eq!(f.verify_calls(), 0);
        assert!(f.service.ledger().is_empty());
    }

    #[test]
    fn test_root_within_window_is_accepted_until_it_expires() {
        let f = fixture(2);
        let early = f.proof(0, "event-1", b"x");
        let late = f.proof(1, "event-1", b"y");

        let newcomer = derive_identity(b"newcomer").unwrap();
        f.service.registry().insert(newcomer.commitment()).unwrap();
        assert!(f.service.submit(&early).is_ok());

        f.service
            .registry()
            .insert(derive_identity(b"another").unwrap().commitment())
            .unwrap();
        assert!(matches!(
            f.service.submit(&late),
            Err(SignalError::WitnessStale(_))
        ));
    }

    #[test]
    fn test_invalid_proof_leaves_ledger_untouched() {
        let f = fixture(4);
        let mut proof = f.proof(0, "event-1", b"x");
        proof.zkp_proof = vec![0u8; 64];

        assert!(matches!(
            f.service.submit(&proof),
            Err(SignalError::InvalidProof)
        ));
        assert!(f.service.ledger().is_empty());

        let genuine = f.proof(0, "event-1", b"x");
        assert!(f.service.submit(&genuine).is_ok());
    }

    #[test]
    fn test_subscribers_receive_accepted_signals() {
        let f = fixture(4);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let id = f.service.subscribe(Arc::new(move |accepted: &AcceptedSignal| {
            sink.lock().push((accepted.scope.clone(), accepted.signal.clone()));
        }));
        assert_eq!(f.service.subscriber_count(), 1);

        let proof = f.proof(0, "event-1", b"Hello world");
        f.service.submit(&proof).unwrap();
        let _ = f.service.submit(&proof);
        assert_eq!(
            *received.lock(),
            vec![("event-1".to_string(), b"Hello world".to_vec())]
        );

        assert!(f.service.unsubscribe(id));
        assert!(!f.service.unsubscribe(id));
        f.service.submit(&f.proof(1, "event-1", b"later")).unwrap();
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_acceptance() {
        let f = fixture(4);
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&delivered);
        f.service.subscribe(Arc::new(|_: &AcceptedSignal| {
            panic!("subscriber failure");
        }));
        f.service.subscribe(Arc::new(move |_: &AcceptedSignal| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let proof = f.proof(0, "event-1", b"x");
        let accepted = f.service.submit(&proof).unwrap();
        assert_eq!(accepted.scope, "event-1");
        assert_eq!(f.service.ledger().len(), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        assert!(matches!(
            f.service.submit(&proof),
            Err(SignalError::DuplicateNullifier { .. })
        ));
        f.service.submit(&f.proof(1, "event-1", b"y")).unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_each_submission_reaches_backend_once() {
        let f = fixture(4);
        f.service.submit(&f.proof(0, "event-1", b"x")).unwrap();
        assert_eq!(f.verify_calls(), 1);

        let mut forged = f.proof(1, "event-1", b"y");
        forged.zkp_proof = vec![0u8; 64];
        assert!(matches!(
            f.service.submit(&forged),
            Err(SignalError::InvalidProof)
        ));
        assert_eq!(f.verify_calls(), 2);
        assert_eq!(f.service.ledger().len(), 1);
    }

    #[test]
    fn test_concurrent_resubmission_accepts_once() {
        const RACERS: usize = 8;
        let f = fixture(4);
        let proof = f.proof(2, "race", b"x");
        let barrier = Barrier::new(RACERS);

        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..RACERS)
                .map(|_| {
                    let (service, proof, barrier) = (&f.service, &proof, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        service.submit(proof)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().filter(|r| r.is_err()).all(|r| matches!(
            r,
            Err(SignalError::DuplicateNullifier { .. })
        )));
        assert_eq!(f.service.ledger().len(), 1);
    }
}
