use alloy_primitives::{Address, U256};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::crypto::{address_to_field, poseidon_hash, truncate_to_address, u256_to_field, CryptoError};

// 30 bytes keeps the secret well below the BN254 modulus, so it is
// never reduced when it enters the hash.
pub const SECRET_SIZE: usize = 30;

/// The private value binding a receiver to a burn address.
///
/// Only ever leaves the client as a private proof input.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret(U256);

impl Secret {
    /// Draws a fresh secret from the operating system's entropy source.
    pub fn random() -> Self {
        Self::random_with(&mut OsRng)
    }

    pub fn random_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SECRET_SIZE];
        rng.fill_bytes(&mut bytes);
        let mut word = [0u8; 32];
        word[32 - SECRET_SIZE..].copy_from_slice(&bytes);
        Self(U256::from_be_bytes(word))
    }

    pub fn from_u256(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

/// Partial hex representation; the full value is never formatted.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes::<32>();
        write!(
            f,
            "Secret(0x{}...)",
            hex::encode(&bytes[32 - SECRET_SIZE..32 - SECRET_SIZE + 2])
        )
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<U256>()
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// A freshly created commitment: the secret and the burn address it opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub receiver: Address,
    pub secret: Secret,
    pub burn_address: Address,
}

/// Derive the burn address for `(receiver, secret)`.
///
/// `burn_address = low20(poseidon(receiver, secret))`. Pure and deterministic;
/// the redeem flow recomputes it to detect a corrupted ledger entry.
pub fn derive_burn_address(receiver: &Address, secret: &Secret) -> Result<Address, CryptoError> {
    let digest = poseidon_hash(address_to_field(receiver), u256_to_field(&secret.0))?;
    Ok(truncate_to_address(&digest))
}

/// Create a new commitment for `receiver` with a fresh random secret.
pub fn create_commitment(receiver: Address) -> Result<Commitment, CryptoError> {
    create_commitment_with(receiver, &mut OsRng)
}

pub fn create_commitment_with<R: RngCore + CryptoRng>(
    receiver: Address,
    rng: &mut R,
) -> Result<Commitment, CryptoError> {
    let secret = Secret::random_with(rng);
    let burn_address = derive_burn_address(&receiver, &secret)?;
    Ok(Commitment {
        receiver,
        secret,
        burn_address,
    })
}

/// Check that a stored burn address still matches its `(receiver, secret)`.
pub fn verify_burn_address(
    receiver: &Address,
    secret: &Secret,
    burn_address: &Address,
) -> Result<bool, CryptoError> {
    Ok(derive_burn_address(receiver, secret)? == *burn_address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use rand::{rngs::StdRng, SeedableRng};

    const RECEIVER: Address = address!("00000000000000000000000000000000000000aa");

    #[test]
    fn test_secret_fits_thirty_bytes() {
        for _ in 0..16 {
            let secret = Secret::random();
            assert!(secret.as_u256() < U256::from(1u8) << 240);
        }
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::from_u256(U256::MAX >> 16);
        let printed = format!("{:?}", secret);
        assert!(printed.starts_with("Secret(0x"));
        assert!(printed.len() < 20);
    }

    #[test]
    fn test_secret_serializes_as_decimal() {
        let secret = Secret::from_u256(U256::from(123456789u64));
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"123456789\"");
        let back: Secret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, secret);
    }

    #[test]
    fn test_burn_address_deterministic() {
        let secret = Secret::from_u256(U256::from(42u64));
        let a = derive_burn_address(&RECEIVER, &secret).unwrap();
        let b = derive_burn_address(&RECEIVER, &secret).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Address::ZERO);
    }

    #[test]
    fn test_burn_address_depends_on_both_inputs() {
        let secret = Secret::from_u256(U256::from(42u64));
        let other_secret = Secret::from_u256(U256::from(43u64));
        let other_receiver = address!("00000000000000000000000000000000000000bb");

        let base = derive_burn_address(&RECEIVER, &secret).unwrap();
        assert_ne!(base, derive_burn_address(&RECEIVER, &other_secret).unwrap());
        assert_ne!(base, derive_burn_address(&other_receiver, &secret).unwrap());
    }

    #[test]
    fn test_create_commitment_reproducible() {
        let mut rng = StdRng::seed_from_u64(7);
        let commitment = create_commitment_with(RECEIVER, &mut rng).unwrap();

        assert_eq!(commitment.receiver, RECEIVER);
        assert!(verify_burn_address(&RECEIVER, &commitment.secret, &commitment.burn_address).unwrap());
    }

    #[test]
    fn test_fresh_commitments_differ() {
        let first = create_commitment(RECEIVER).unwrap();
        let second = create_commitment(RECEIVER).unwrap();
        assert_ne!(first.secret, second.secret);
        assert_ne!(first.burn_address, second.burn_address);
    }

    #[test]
    fn test_verify_burn_address_detects_tampering() {
        let commitment = create_commitment(RECEIVER).unwrap();
        let tampered = Secret::from_u256(commitment.secret.as_u256() + U256::from(1u8));
        assert!(!verify_burn_address(&RECEIVER, &tampered, &commitment.burn_address).unwrap());
    }
}
