use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pasta_curves::pallas;
use std::sync::Arc;
use zkp_anon_signal::{
    derive_identity, GroupRegistry, Halo2Backend, Identity, IncrementalMerkleTree, ProofEngine,
    SignalLedger, CIRCUIT_K, TREE_DEPTH,
};

fn setup_group(members: usize) -> (Arc<GroupRegistry>, Vec<Identity>) {
    let registry = Arc::new(GroupRegistry::new(TREE_DEPTH, 30).unwrap());
    let identities: Vec<_> = (0..members)
        .map(|i| derive_identity(format!("bench-{i}").as_bytes()).unwrap())
        .collect();
    for identity in &identities {
        registry.insert(identity.commitment()).unwrap();
    }
    (registry, identities)
}

fn bench_proof_generation_and_verification(c: &mut Criterion) {
    let backend = Arc::new(Halo2Backend::<TREE_DEPTH>::new(CIRCUIT_K).unwrap());
    let engine = ProofEngine::new(backend);
    let (registry, identities) = setup_group(32);
    let witness = registry.witness_for(&identities[0].commitment()).unwrap();

    let mut group = c.benchmark_group("signal_proof");
    group.sample_size(10);
    group.bench_function("prove", |b| {
        b.iter(|| {
            black_box(
                engine
                    .prove(&identities[0], &witness, "bench", b"Hello world")
                    .unwrap(),
            )
        })
    });

    let proof = engine
        .prove(&identities[0], &witness, "bench", b"Hello world")
        .unwrap();
    group.bench_function("verify", |b| {
        b.iter(|| black_box(engine.verify(black_box(&proof)).unwrap()))
    });
    group.finish();
}

fn bench_merkle_tree_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_tree_construction");

    for leaf_count in [4u64, 16, 64, 256, 1024].iter() {
        let leaves: Vec<pallas::Base> = (0..*leaf_count).map(pallas::Base::from).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(leaf_count),
            leaf_count,
            |b, _| {
                b.iter(|| {
                    black_box(IncrementalMerkleTree::from_leaves(TREE_DEPTH, black_box(&leaves)).unwrap())
                })
            },
        );
    }

    group.finish();
}

fn bench_witness_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("witness_generation");

    for members in [4, 64, 256].iter() {
        let (registry, identities) = setup_group(*members);
        let commitment = identities[members - 1].commitment();

        group.bench_with_input(BenchmarkId::from_parameter(members), members, |b, _| {
            b.iter(|| black_box(registry.witness_for(black_box(&commitment)).unwrap()))
        });
    }

    group.finish();
}

fn bench_ledger_check_and_record(c: &mut Criterion) {
    c.bench_function("ledger_check_and_record", |b| {
        let ledger = SignalLedger::new();
        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            black_box(
                ledger
                    .check_and_record("bench", pallas::Base::from(next), b"x")
                    .unwrap(),
            )
        })
    });
}

fn bench_poseidon_hash(c: &mut Criterion) {
    c.bench_function("poseidon_hash", |b| {
        b.iter(|| {
            black_box(zkp_anon_signal::utils::poseidon_hash(
                black_box(pallas::Base::from(42)),
                black_box(pallas::Base::from(99)),
            ))
        })
    });
}

criterion_group!(
    benches,
    bench_proof_generation_and_verification,
    bench_merkle_tree_construction,
    bench_witness_generation,
    bench_ledger_check_and_record,
    bench_poseidon_hash
);
criterion_main!(benches);
