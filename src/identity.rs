//! Deterministic member identities and their public commitments.
//!
//! An [`Identity`] is a pair of secret field elements derived from a seed
//! (typically a signed message). Its [`Commitment`] is the only value that is
//! ever published; the identity itself never leaves the member.

use crate::error::{SignalError, SignalResult};
use crate::utils::{field_from_hex, field_to_bytes, field_to_hex, hash_to_field, poseidon_hash};
use anyhow::{Context, Result};
use pasta_curves::group::ff::FromUniformBytes;
use pasta_curves::pallas;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

const TRAPDOOR_DOMAIN: &[u8] = b"zkp-anon-signal/identity/trapdoor/v1";
const NULLIFIER_DOMAIN: &[u8] = b"zkp-anon-signal/identity/nullifier/v1";

/// Upper bound on seed length. Seeds are signatures or passphrases, so
/// anything larger is almost certainly a mistake (e.g. a file read by accident).
pub const MAX_SEED_LEN: usize = 64 * 1024;

/// A member's secret identity.
///
/// `Debug` is redacted; use [`Identity::to_secret_json`] to export it.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    trapdoor: pallas::Base,
    nullifier_secret: pallas::Base,
}

/// Public fingerprint of an [`Identity`]: `Poseidon(trapdoor, nullifier_secret)`.
///
/// Serializes as the canonical hex encoding of the field element.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Commitment(pallas::Base);

#[derive(Serialize, Deserialize)]
struct IdentitySecret {
    trapdoor: String,
    nullifier_secret: String,
}

/// Derives an identity from a secret seed.
///
/// Deterministic: the same seed always yields the same identity. The trapdoor
/// and nullifier secret come from independent, domain-separated hashes of the
/// seed reduced modulo the field order.
///
/// # Errors
/// Returns [`SignalError::InvalidSeed`] if the seed is empty or exceeds
/// [`MAX_SEED_LEN`].
///
/// ```
/// use zkp_anon_signal::identity::{commitment_of, derive_identity};
///
/// let a = derive_identity(b"signed message").unwrap();
/// let b = derive_identity(b"signed message").unwrap();
/// assert_eq!(commitment_of(&a), commitment_of(&b));
/// ```
pub fn derive_identity(seed: &[u8]) -> SignalResult<Identity> {
    if seed.is_empty() {
        return Err(SignalError::InvalidSeed("seed must not be empty".into()));
    }
    if seed.len() > MAX_SEED_LEN {
        return Err(SignalError::InvalidSeed(format!(
            "seed is {} bytes, maximum is {} bytes",
            seed.len(),
            MAX_SEED_LEN
        )));
    }

    Ok(Identity {
        trapdoor: hash_to_field(TRAPDOOR_DOMAIN, seed),
        nullifier_secret: hash_to_field(NULLIFIER_DOMAIN, seed),
    })
}

/// Computes the public commitment of an identity. Pure and idempotent.
#[must_use]
pub fn commitment_of(identity: &Identity) -> Commitment {
    Commitment(poseidon_hash(identity.trapdoor, identity.nullifier_secret))
}

impl Identity {
    /// Generates a fresh random identity.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut wide = [0u8; 64];
        rng.fill_bytes(&mut wide);
        let trapdoor = pallas::Base::from_uniform_bytes(&wide);
        rng.fill_bytes(&mut wide);
        let nullifier_secret = pallas::Base::from_uniform_bytes(&wide);
        Self {
            trapdoor,
            nullifier_secret,
        }
    }

    #[must_use]
    pub fn trapdoor(&self) -> pallas::Base {
        self.trapdoor
    }

    #[must_use]
    pub fn nullifier_secret(&self) -> pallas::Base {
        self.nullifier_secret
    }

    #[must_use]
    pub fn commitment(&self) -> Commitment {
        commitment_of(self)
    }

    /// Exports both secrets as a JSON string. Treat the output like a private key.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_secret_json(&self) -> Result<String> {
        let secret = IdentitySecret {
            trapdoor: field_to_hex(self.trapdoor),
            nullifier_secret: field_to_hex(self.nullifier_secret),
        };
        serde_json::to_string(&secret).context("Failed to serialize identity")
    }

    /// Restores an identity exported with [`Identity::to_secret_json`].
    ///
    /// # Errors
    /// Returns an error if the JSON is invalid or either secret is not a
    /// canonical field element.
    pub fn from_secret_json(json: &str) -> Result<Self> {
        let secret: IdentitySecret =
            serde_json::from_str(json).context("Failed to parse identity JSON")?;
        Ok(Self {
            trapdoor: field_from_hex(&secret.trapdoor).context("Invalid trapdoor")?,
            nullifier_secret: field_from_hex(&secret.nullifier_secret)
                .context("Invalid nullifier secret")?,
        })
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("trapdoor", &"<redacted>")
            .field("nullifier_secret", &"<redacted>")
            .field("commitment", &self.commitment())
            .finish()
    }
}

impl Commitment {
    #[must_use]
    pub fn from_field(value: pallas::Base) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_field(&self) -> pallas::Base {
        self.0
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        field_to_bytes(self.0)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        field_to_hex(self.0)
    }

    /// Parses a commitment from canonical hex.
    ///
    /// # Errors
    /// Returns an error if the input is not a canonical field element.
    pub fn from_hex(input: &str) -> Result<Self> {
        field_from_hex(input).map(Self)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl TryFrom<String> for Commitment {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<Commitment> for String {
    fn from(value: Commitment) -> Self {
        value.to_hex()
    }
}
