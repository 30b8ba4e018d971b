//! Field encoding, hex validation and hashing helpers.

use anyhow::Result;
use halo2_gadgets::poseidon::primitives::{
    self as poseidon, ConstantLength, P128Pow5T3 as PoseidonSpec,
};
use pasta_curves::group::ff::{FromUniformBytes, PrimeField};
use pasta_curves::pallas;
use sha3::{Digest, Sha3_512};

/// Length of a field element's canonical encoding in bytes.
pub const FIELD_BYTES: usize = 32;

/// Length of a field element's canonical encoding in hex characters.
pub const FIELD_HEX_LEN: usize = FIELD_BYTES * 2;

fn is_valid_hex_string(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .trim()
        .strip_prefix("0x")
        .or_else(|| input.trim().strip_prefix("0X"))
        .unwrap_or_else(|| input.trim())
}

/// Validates and strips hex prefix from a string.
///
/// # Errors
/// Returns an error if:
/// - The hex string has incorrect length
/// - The hex string contains non-hex characters
///
/// # Examples
///
/// ```
/// use zkp_anon_signal::utils::validate_and_strip_hex;
///
/// let result = validate_and_strip_hex("0x1234abcd", 8).unwrap();
/// assert_eq!(result, "1234abcd");
/// ```
pub fn validate_and_strip_hex(input: &str, expected_len: usize) -> Result<String> {
    let stripped = strip_hex_prefix(input);

    if stripped.len() != expected_len {
        return Err(anyhow::anyhow!(
            "Invalid hex string: must be {} characters (got {})",
            expected_len,
            stripped.len()
        ));
    }

    if !is_valid_hex_string(stripped) {
        return Err(anyhow::anyhow!(
            "Invalid hex string: contains non-hex characters"
        ));
    }

    Ok(stripped.to_string())
}

/// Canonical little-endian encoding of a field element.
#[inline]
#[must_use]
pub fn field_to_bytes(field: pallas::Base) -> [u8; FIELD_BYTES] {
    let mut bytes = [0u8; FIELD_BYTES];
    let repr = field.to_repr();
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

/// Decodes a canonical little-endian encoding. Returns `None` for values
/// outside the field.
#[inline]
#[must_use]
pub fn field_from_bytes(bytes: &[u8; FIELD_BYTES]) -> Option<pallas::Base> {
    Option::from(pallas::Base::from_repr(*bytes))
}

/// Lowercase hex of the canonical encoding, without prefix.
#[must_use]
pub fn field_to_hex(field: pallas::Base) -> String {
    hex::encode(field_to_bytes(field))
}

/// Parses a field element from its canonical hex encoding.
///
/// Accepts an optional `0x` prefix and surrounding whitespace.
///
/// # Errors
/// Returns an error if the string is not 64 hex characters or encodes a value
/// outside the field.
///
/// ```
/// use pasta_curves::pallas;
/// use zkp_anon_signal::utils::{field_from_hex, field_to_hex};
///
/// let value = pallas::Base::from(42);
/// assert_eq!(field_from_hex(&field_to_hex(value)).unwrap(), value);
/// ```
pub fn field_from_hex(input: &str) -> Result<pallas::Base> {
    let stripped = validate_and_strip_hex(input, FIELD_HEX_LEN)?;
    let mut bytes = [0u8; FIELD_BYTES];
    hex::decode_to_slice(&stripped, &mut bytes)
        .map_err(|e| anyhow::anyhow!("Invalid hex string: {e}"))?;
    field_from_bytes(&bytes)
        .ok_or_else(|| anyhow::anyhow!("Value {stripped} is not a canonical field element"))
}

/// Poseidon hash of two field elements using `P128Pow5T3`, width 3, rate 2.
///
/// This is the same permutation the circuit uses, so values computed here
/// match the in-circuit values exactly.
///
/// ```
/// use zkp_anon_signal::utils::poseidon_hash;
/// use pasta_curves::pallas;
///
/// let left = pallas::Base::from(1);
/// let right = pallas::Base::from(2);
/// assert_ne!(poseidon_hash(left, right), poseidon_hash(right, left));
/// ```
#[inline]
#[must_use]
pub fn poseidon_hash(left: pallas::Base, right: pallas::Base) -> pallas::Base {
    let inputs = [left, right];
    poseidon::Hash::<_, PoseidonSpec, ConstantLength<2>, 3, 2>::init().hash(inputs)
}

/// Domain-separated hash of arbitrary bytes onto the field.
///
/// Computes `Sha3_512(len(domain) || domain || data)` and reduces the 64-byte
/// digest uniformly modulo the field order.
#[must_use]
pub fn hash_to_field(domain: &[u8], data: &[u8]) -> pallas::Base {
    debug_assert!(domain.len() <= u8::MAX as usize);
    let mut hasher = Sha3_512::new();
    hasher.update([domain.len() as u8]);
    hasher.update(domain);
    hasher.update(data);
    let digest: [u8; 64] = hasher.finalize().into();
    pallas::Base::from_uniform_bytes(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_and_strip_hex_valid() {
        let result = validate_and_strip_hex("0x1234abcd", 8);
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "1234abcd");
    }

    #[test]
    fn test_validate_and_strip_hex_uppercase_prefix() {
        let result = validate_and_strip_hex("0X1234ABCD", 8);
        assert_eq!(result.unwrap(), "1234ABCD");
    }

    #[test]
    fn test_validate_and_strip_hex_with_whitespace() {
        let result = validate_and_strip_hex("  0x1234abcd  ", 8);
        assert_eq!(result.unwrap(), "1234abcd");
    }

    #[test]
    fn test_validate_and_strip_hex_wrong_length() {
        let result = validate_and_strip_hex("0x1234abcd", 10);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be 10 characters"));
    }

    #[test]
    fn test_validate_and_strip_hex_invalid_characters() {
        let result = validate_and_strip_hex("0x1234xyzw", 8);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("non-hex characters"));
    }

    #[test]
    fn test_field_hex_roundtrip_accepts_prefix() {
        let value = pallas::Base::from(0xdead_beef_u64);
        let encoded = field_to_hex(value);
        assert_eq!(encoded.len(), FIELD_HEX_LEN);
        assert_eq!(field_from_hex(&format!("0x{encoded}")).unwrap(), value);
    }

    #[test]
    fn test_field_from_hex_rejects_non_canonical() {
        // 2^256 - 1 is far above the Pallas base field modulus.
        let all_ones = "ff".repeat(FIELD_BYTES);
        let err = field_from_hex(&all_ones).unwrap_err();
        assert!(err.to_string().contains("not a canonical field element"));
    }

    #[test]
    fn test_hash_to_field_is_domain_separated() {
        let a = hash_to_field(b"domain-a", b"payload");
        let b = hash_to_field(b"domain-b", b"payload");
        assert_ne!(a, b);
        assert_eq!(a, hash_to_field(b"domain-a", b"payload"));
    }

    #[test]
    fn test_hash_to_field_length_prefix_prevents_shifting() {
        // Moving a byte between domain and data must change the output.
        let a = hash_to_field(b"ab", b"c");
        let b = hash_to_field(b"a", b"bc");
        assert_ne!(a, b);
    }
}
