//! Boundary to the token contract.
//!
//! Transaction signing, broadcasting and receipt polling belong to the
//! implementor; the protocol only needs the outcome of each call.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::fmt;

/// Failure reported by a chain adapter, message preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ChainError {
    message: String,
}

impl ChainError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Final outcome of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    pub transaction_hash: B256,
    /// Receipt status
    pub success: bool,
}

/// Arguments of `verifyAndMint(to, amount, root, nullifier, proof)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintCall {
    pub to: Address,
    pub amount: U256,
    pub root: B256,
    pub nullifier: B256,
    pub proof: Bytes,
}

#[async_trait]
pub trait TokenClient: Send + Sync {
    /// ERC-20 `transfer(to, amount)`, awaited to its receipt.
    async fn transfer(&self, to: Address, amount: U256) -> Result<TxOutcome, ChainError>;

    /// `verifyAndMint`, awaited to its receipt.
    async fn verify_and_mint(&self, call: &MintCall) -> Result<TxOutcome, ChainError>;

    /// Simulate `verifyAndMint` without broadcasting. A rejection means the
    /// contract would revert (unknown root, spent nullifier, bad proof).
    async fn preflight_mint(&self, _call: &MintCall) -> Result<(), ChainError> {
        Ok(())
    }
}
