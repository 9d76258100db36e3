//! Cryptographic utilities for Wormhole
//!
//! This module provides the two-to-one Poseidon hash used by the commitment
//! scheme and the Merkle tree, plus the conversions between EVM-native types
//! (addresses, 256-bit words) and BN254 scalar field elements.

use alloy_primitives::{Address, B256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonError, PoseidonHasher};

/// Ethereum address length in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Hash length in bytes
pub const HASH_LENGTH: usize = 32;

/// Errors raised by the hashing primitive.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("poseidon hash failed: {0}")]
    Poseidon(#[from] PoseidonError),
}

/// Compute the circom-compatible Poseidon hash of two field elements
///
/// This is `hash2` of the protocol: burn addresses, Merkle leaves and inner
/// Merkle nodes are all produced by it.
///
/// # Arguments
/// * `left` - Left input field element
/// * `right` - Right input field element
///
/// # Returns
/// * Poseidon hash as a field element
pub fn poseidon_hash(left: Fr, right: Fr) -> Result<Fr, CryptoError> {
    let mut poseidon = Poseidon::<Fr>::new_circom(2)?;
    Ok(poseidon.hash(&[left, right])?)
}

/// Interpret an address as a big-endian integer in the scalar field
pub fn address_to_field(address: &Address) -> Fr {
    Fr::from_be_bytes_mod_order(address.as_slice())
}

/// Interpret a 256-bit word as a field element, reducing modulo the field order
pub fn u256_to_field(value: &U256) -> Fr {
    Fr::from_be_bytes_mod_order(&value.to_be_bytes::<32>())
}

/// Serialize a field element as a 32-byte big-endian word
pub fn field_to_b256(element: &Fr) -> B256 {
    let bytes = element.into_bigint().to_bytes_be();
    let mut word = [0u8; HASH_LENGTH];
    let offset = HASH_LENGTH.saturating_sub(bytes.len());
    word[offset..].copy_from_slice(&bytes[bytes.len().saturating_sub(HASH_LENGTH)..]);
    B256::from(word)
}

/// Serialize a field element as an unsigned 256-bit integer
pub fn field_to_u256(element: &Fr) -> U256 {
    U256::from_be_bytes(field_to_b256(element).0)
}

/// Parse a 32-byte big-endian word into a field element
pub fn b256_to_field(word: &B256) -> Fr {
    Fr::from_be_bytes_mod_order(word.as_slice())
}

/// Decimal string form of a field element, as circuit input maps expect
pub fn field_to_decimal(element: &Fr) -> String {
    field_to_u256(element).to_string()
}

/// Truncate a hash output to address width
///
/// Keeps the low-order 20 bytes of the 32-byte big-endian digest.
pub fn truncate_to_address(digest: &Fr) -> Address {
    let word = field_to_b256(digest);
    Address::from_slice(&word[HASH_LENGTH - ADDRESS_LENGTH..])
}
