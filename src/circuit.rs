//! halo2 circuit for anonymous group signaling, and the backend built on it.
//!
//! The circuit proves knowledge of `(trapdoor, nullifier_secret, path)` such that
//!
//! 1. `commitment = Poseidon(trapdoor, nullifier_secret)`
//! 2. hashing `commitment` up along `path` yields the public `root`
//! 3. `Poseidon(nullifier_secret, external_nullifier)` equals the public `nullifier_hash`
//! 4. the public `signal_hash` is bound to the proof (it is squared in-circuit)
//!
//! Each path level uses a conditional swap gate with a boolean direction bit:
//! `left = cur + bit * (sibling - cur)` and `right = sibling + bit * (cur - sibling)`.
//!
//! Public inputs live in a single instance column, in the row order given by
//! [`crate::types`].

use crate::engine::ProvingBackend;
use crate::types::{
    CircuitInputs, PublicInputs, EXTERNAL_NULLIFIER_ROW, NULLIFIER_HASH_ROW, ROOT_ROW,
    SIGNAL_HASH_ROW,
};
use anyhow::{Context, Result};
use halo2_gadgets::poseidon::{
    primitives::{ConstantLength, P128Pow5T3},
    Hash as PoseidonHash, Pow5Chip, Pow5Config,
};
use halo2_proofs::{
    circuit::{AssignedCell, Layouter, SimpleFloorPlanner, Value},
    plonk::{
        create_proof, keygen_pk, keygen_vk, verify_proof, Advice, Circuit, Column,
        ConstraintSystem, Error, Expression, Instance, ProvingKey, Selector, SingleVerifier,
        VerifyingKey,
    },
    poly::{commitment::Params, Rotation},
    transcript::{Blake2bRead, Blake2bWrite, Challenge255},
};
use log::{debug, info};
use pasta_curves::group::ff::Field;
use pasta_curves::{pallas, vesta};
use rand::rngs::OsRng;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

type Cell = AssignedCell<pallas::Base, pallas::Base>;

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub advice: [Column<Advice>; 5],
    pub instance: Column<Instance>,
    pub q_swap: Selector,
    pub q_square: Selector,
    pub poseidon: Pow5Config<pallas::Base, 3, 2>,
}

/// Circuit for a group tree of depth `DEPTH`.
#[derive(Debug, Clone)]
pub struct SignalCircuit<const DEPTH: usize> {
    pub trapdoor: Value<pallas::Base>,
    pub nullifier_secret: Value<pallas::Base>,
    pub path_elements: [Value<pallas::Base>; DEPTH],
    /// Direction bits: one for a right child, zero for a left child.
    pub path_indices: [Value<pallas::Base>; DEPTH],
}

impl<const DEPTH: usize> Default for SignalCircuit<DEPTH> {
    fn default() -> Self {
        Self {
            trapdoor: Value::unknown(),
            nullifier_secret: Value::unknown(),
            path_elements: [Value::unknown(); DEPTH],
            path_indices: [Value::unknown(); DEPTH],
        }
    }
}

impl<const DEPTH: usize> SignalCircuit<DEPTH> {
    /// Builds a circuit with known witness values.
    ///
    /// # Errors
    /// Returns an error if the path length differs from `DEPTH`.
    pub fn from_inputs(inputs: &CircuitInputs) -> Result<Self> {
        if inputs.path_elements.len() != DEPTH || inputs.path_indices.len() != DEPTH {
            return Err(anyhow::anyhow!(
                "Witness path has {} elements and {} indices, circuit depth is {}",
                inputs.path_elements.len(),
                inputs.path_indices.len(),
                DEPTH
            ));
        }

        let mut circuit = Self {
            trapdoor: Value::known(inputs.trapdoor),
            nullifier_secret: Value::known(inputs.nullifier_secret),
            ..Self::default()
        };
        for level in 0..DEPTH {
            circuit.path_elements[level] = Value::known(inputs.path_elements[level]);
            circuit.path_indices[level] = Value::known(if inputs.path_indices[level] {
                pallas::Base::ONE
            } else {
                pallas::Base::ZERO
            });
        }
        Ok(circuit)
    }
}

fn poseidon2(
    config: &Pow5Config<pallas::Base, 3, 2>,
    mut layouter: impl Layouter<pallas::Base>,
    message: [Cell; 2],
) -> Result<Cell, Error> {
    let chip = Pow5Chip::construct(config.clone());
    let hasher = PoseidonHash::<_, _, P128Pow5T3, ConstantLength<2>, 3, 2>::init(
        chip,
        layouter.namespace(|| "init"),
    )?;
    hasher.hash(layouter.namespace(|| "hash"), message)
}

impl<const DEPTH: usize> Circuit<pallas::Base> for SignalCircuit<DEPTH> {
    type Config = SignalConfig;
    type FloorPlanner = SimpleFloorPlanner;

    fn without_witnesses(&self) -> Self {
        Self::default()
    }

    fn configure(meta: &mut ConstraintSystem<pallas::Base>) -> Self::Config {
        let advice = [
            meta.advice_column(),
            meta.advice_column(),
            meta.advice_column(),
            meta.advice_column(),
            meta.advice_column(),
        ];
        let instance = meta.instance_column();

        meta.enable_equality(instance);
        for column in &advice {
            meta.enable_equality(*column);
        }

        let rc_a = [meta.fixed_column(), meta.fixed_column(), meta.fixed_column()];
        let rc_b = [meta.fixed_column(), meta.fixed_column(), meta.fixed_column()];
        meta.enable_constant(rc_b[0]);

        let poseidon = Pow5Chip::configure::<P128Pow5T3>(
            meta,
            [advice[0], advice[1], advice[2]],
            advice[3],
            rc_a,
            rc_b,
        );

        let q_swap = meta.selector();
        meta.create_gate("merkle swap", |meta| {
            let q = meta.query_selector(q_swap);
            let cur = meta.query_advice(advice[0], Rotation::cur());
            let sibling = meta.query_advice(advice[1], Rotation::cur());
            let bit = meta.query_advice(advice[2], Rotation::cur());
            let left = meta.query_advice(advice[3], Rotation::cur());
            let right = meta.query_advice(advice[4], Rotation::cur());
            let one = Expression::Constant(pallas::Base::ONE);

            vec![
                q.clone() * bit.clone() * (one - bit.clone()),
                q.clone() * (left - cur.clone() - bit.clone() * (sibling.clone() - cur.clone())),
                q * (right - sibling.clone() - bit * (cur - sibling)),
            ]
        });

        let q_square = meta.selector();
        meta.create_gate("signal binding", |meta| {
            let q = meta.query_selector(q_square);
            let signal = meta.query_advice(advice[0], Rotation::cur());
            let square = meta.query_advice(advice[1], Rotation::cur());
            vec![q * (square - signal.clone() * signal)]
        });

        SignalConfig {
            advice,
            instance,
            q_swap,
            q_square,
            poseidon,
        }
    }

    fn synthesize(
        &self,
        config: Self::Config,
        mut layouter: impl Layouter<pallas::Base>,
    ) -> Result<(), Error> {
        let (trapdoor, nullifier_secret) = layouter.assign_region(
            || "identity secrets",
            |mut region| {
                let trapdoor =
                    region.assign_advice(|| "trapdoor", config.advice[0], 0, || self.trapdoor)?;
                let nullifier_secret = region.assign_advice(
                    || "nullifier secret",
                    config.advice[1],
                    0,
                    || self.nullifier_secret,
                )?;
                Ok((trapdoor, nullifier_secret))
            },
        )?;

        let mut node = poseidon2(
            &config.poseidon,
            layouter.namespace(|| "identity commitment"),
            [trapdoor, nullifier_secret.clone()],
        )?;

        for level in 0..DEPTH {
            let (left, right) = layouter.assign_region(
                || format!("merkle swap {level}"),
                |mut region| {
                    config.q_swap.enable(&mut region, 0)?;
                    let cur = node.copy_advice(|| "current", &mut region, config.advice[0], 0)?;
                    let sibling = region.assign_advice(
                        || "sibling",
                        config.advice[1],
                        0,
                        || self.path_elements[level],
                    )?;
                    let bit = region.assign_advice(
                        || "direction",
                        config.advice[2],
                        0,
                        || self.path_indices[level],
                    )?;

                    let values = cur.value().zip(sibling.value()).zip(bit.value());
                    let left = region.assign_advice(
                        || "left",
                        config.advice[3],
                        0,
                        || values.map(|((c, s), b)| *c + *b * (*s - *c)),
                    )?;
                    let right = region.assign_advice(
                        || "right",
                        config.advice[4],
                        0,
                        || values.map(|((c, s), b)| *s + *b * (*c - *s)),
                    )?;
                    Ok((left, right))
                },
            )?;

            node = poseidon2(
                &config.poseidon,
                layouter.namespace(|| format!("merkle level {level}")),
                [left, right],
            )?;
        }
        layouter.constrain_instance(node.cell(), config.instance, ROOT_ROW)?;

        let external_nullifier = layouter.assign_region(
            || "external nullifier",
            |mut region| {
                region.assign_advice_from_instance(
                    || "external nullifier",
                    config.instance,
                    EXTERNAL_NULLIFIER_ROW,
                    config.advice[0],
                    0,
                )
            },
        )?;
        let nullifier_hash = poseidon2(
            &config.poseidon,
            layouter.namespace(|| "nullifier hash"),
            [nullifier_secret, external_nullifier],
        )?;
        layouter.constrain_instance(nullifier_hash.cell(), config.instance, NULLIFIER_HASH_ROW)?;

        layouter.assign_region(
            || "signal binding",
            |mut region| {
                config.q_square.enable(&mut region, 0)?;
                let signal = region.assign_advice_from_instance(
                    || "signal hash",
                    config.instance,
                    SIGNAL_HASH_ROW,
                    config.advice[0],
                    0,
                )?;
                region.assign_advice(
                    || "signal hash squared",
                    config.advice[1],
                    0,
                    || signal.value().map(|s| *s * *s),
                )?;
                Ok(())
            },
        )
    }
}

/// Proving backend backed by [`SignalCircuit`] over the Pasta IPA commitment scheme.
///
/// The parameters are the only artifact; keys are derived from them at startup.
pub struct Halo2Backend<const DEPTH: usize> {
    k: u32,
    params: Params<vesta::Affine>,
    pk: ProvingKey<vesta::Affine>,
    vk: VerifyingKey<vesta::Affine>,
}

impl<const DEPTH: usize> Halo2Backend<DEPTH> {
    /// Generates fresh parameters for `2^k` rows and derives the keys.
    ///
    /// # Errors
    /// Returns an error if the circuit does not fit in `2^k` rows.
    pub fn new(k: u32) -> Result<Self> {
        Self::with_params(k, Params::<vesta::Affine>::new(k))
    }

    /// Derives proving and verifying keys from existing parameters.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn with_params(k: u32, params: Params<vesta::Affine>) -> Result<Self> {
        let circuit = SignalCircuit::<DEPTH>::default();
        let vk = keygen_vk(&params, &circuit).context("Failed to generate verifying key")?;
        let pk =
            keygen_pk(&params, vk.clone(), &circuit).context("Failed to generate proving key")?;
        debug!("Derived halo2 keys for depth {DEPTH}, k={k}");
        Ok(Self { k, params, pk, vk })
    }

    /// Loads `params-k{k}.bin` from `cache_dir`, generating it if absent.
    /// The generated blob is written back when `persist` is set.
    ///
    /// # Errors
    /// Returns an error if the blob is unreadable or cannot be written.
    pub fn load_or_generate(k: u32, cache_dir: &Path, persist: bool) -> Result<Self> {
        let path = cache_dir.join(format!("params-k{k}.bin"));

        let params = if path.exists() {
            info!("Loading proving parameters from {}", path.display());
            let file = fs::File::open(&path)
                .with_context(|| format!("Failed to open parameters: {}", path.display()))?;
            Params::<vesta::Affine>::read(&mut BufReader::new(file))
                .with_context(|| format!("Failed to read parameters: {}", path.display()))?
        } else {
            info!("Generating proving parameters (k={k})");
            let params = Params::<vesta::Affine>::new(k);
            if persist {
                fs::create_dir_all(cache_dir).with_context(|| {
                    format!("Failed to create key cache: {}", cache_dir.display())
                })?;
                let file = fs::File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                params
                    .write(&mut writer)
                    .and_then(|()| writer.flush())
                    .with_context(|| format!("Failed to write parameters: {}", path.display()))?;
                info!("Proving parameters saved to {}", path.display());
            }
            params
        };

        Self::with_params(k, params)
    }

    #[must_use]
    pub fn k(&self) -> u32 {
        self.k
    }
}

impl<const DEPTH: usize> ProvingBackend for Halo2Backend<DEPTH> {
    fn depth(&self) -> usize {
        DEPTH
    }

    fn prove(&self, inputs: &CircuitInputs) -> Result<(Vec<u8>, PublicInputs)> {
        let circuit = SignalCircuit::<DEPTH>::from_inputs(inputs)?;
        let instances = inputs.public.to_instances();

        let mut transcript = Blake2bWrite::<_, vesta::Affine, Challenge255<_>>::init(vec![]);
        create_proof(
            &self.params,
            &self.pk,
            &[circuit],
            &[&[&instances[..]]],
            OsRng,
            &mut transcript,
        )
        .context("halo2 proof creation failed")?;

        Ok((transcript.finalize(), inputs.public))
    }

    fn verify(&self, proof: &[u8], public: &PublicInputs) -> Result<bool> {
        let instances = public.to_instances();
        let strategy = SingleVerifier::new(&self.params);
        let mut transcript = Blake2bRead::<_, vesta::Affine, Challenge255<_>>::init(proof);

        let result = verify_proof(
            &self.params,
            &self.vk,
            strategy,
            &[&[&instances[..]]],
            &mut transcript,
        );
        if let Err(e) = &result {
            debug!("halo2 verification rejected proof: {e:?}");
        }
        Ok(result.is_ok())
    }
}
