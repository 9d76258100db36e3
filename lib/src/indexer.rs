//! Reconstruction of Merkle leaves from the token's transfer history.
//!
//! Leaf order is part of the protocol: the on-chain verifier built its roots
//! from transfers in chain order, so the client must present leaves in
//! exactly that order or its root will not match.

use alloy_primitives::{Address, B256, U256};
use ark_bn254::Fr;
use async_trait::async_trait;
use tracing::debug;

use crate::chain::ChainError;
use crate::crypto::{address_to_field, poseidon_hash, u256_to_field, CryptoError};

/// One decoded `Transfer` log of the token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Option<B256>,
}

impl TransferEvent {
    /// Position in the chain, used to check ordering
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Preimage of a Merkle leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafInput {
    pub destination: Address,
    pub amount: U256,
}

impl LeafInput {
    pub fn new(destination: Address, amount: U256) -> Self {
        Self {
            destination,
            amount,
        }
    }

    /// `poseidon(destination, amount)`
    pub fn hash(&self) -> Result<Fr, CryptoError> {
        poseidon_hash(address_to_field(&self.destination), u256_to_field(&self.amount))
    }
}

/// Source of historical transfer events, in chain order.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn transfer_events(&self, from_block: u64) -> Result<Vec<TransferEvent>, ChainError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("event query failed: {0}")]
    Source(#[from] ChainError),
    #[error("transfer events out of chain order at index {index}: {current:?} follows {previous:?}")]
    OutOfOrder {
        index: usize,
        previous: (u64, u64),
        current: (u64, u64),
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Turn raw events into leaf preimages.
///
/// Transfers to the zero address are burns and produce no leaf. Events must
/// already be in chain order; an inversion is reported rather than repaired.
pub fn leaves_from_events(events: &[TransferEvent]) -> Result<Vec<LeafInput>, IndexerError> {
    for (index, pair) in events.windows(2).enumerate() {
        if pair[1].position() <= pair[0].position() {
            return Err(IndexerError::OutOfOrder {
                index: index + 1,
                previous: pair[0].position(),
                current: pair[1].position(),
            });
        }
    }

    Ok(events
        .iter()
        .filter(|event| event.to != Address::ZERO)
        .map(|event| LeafInput::new(event.to, event.value))
        .collect())
}

/// Query `source` from `from_block` and return the leaf sequence.
pub async fn collect_leaves<E: EventSource + ?Sized>(
    source: &E,
    from_block: u64,
) -> Result<Vec<LeafInput>, IndexerError> {
    let events = source.transfer_events(from_block).await?;
    let leaves = leaves_from_events(&events)?;
    debug!(
        events = events.len(),
        leaves = leaves.len(),
        from_block,
        "collected merkle leaves"
    );
    Ok(leaves)
}

/// Hash every leaf preimage, preserving order.
pub fn hash_leaves(leaves: &[LeafInput]) -> Result<Vec<Fr>, CryptoError> {
    leaves.iter().map(LeafInput::hash).collect()
}
