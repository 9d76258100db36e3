use alloy_primitives::Address;

use crate::crypto::CryptoError;
use crate::indexer::IndexerError;
use crate::ledger::LedgerError;
use crate::merkle::MerkleError;
use crate::prover::ProverError;
use crate::submission::SubmissionPhase;

/// Errors surfaced by the send and redeem flows.
#[derive(Debug, thiserror::Error)]
pub enum WormholeError {
    /// Rejected before any state was written
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Funding transfer failed; the pending record was rolled back
    #[error("funding transfer failed: {0}")]
    FundingFailed(String),

    #[error("could not rebuild the transfer tree: {0}")]
    Indexer(#[from] IndexerError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error("proof generation failed: {0}")]
    Prover(#[from] ProverError),

    /// Mint rejected or reverted; the record stays redeemable
    #[error("mint failed: {0}")]
    MintFailed(String),

    #[error("burn address {0} has already been redeemed")]
    AlreadyRedeemed(Address),

    #[error("burn address {0} has no confirmed funding transfer")]
    NotFunded(Address),

    #[error("no transfer recorded for burn address {0}")]
    UnknownTransfer(Address),

    #[error("stored burn address {0} does not match its receiver and secret")]
    BurnAddressMismatch(Address),

    #[error("submission cannot move from {from} to {to}")]
    InvalidPhase {
        from: SubmissionPhase,
        to: SubmissionPhase,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl WormholeError {
    /// Whether retrying the same call later can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WormholeError::FundingFailed(_)
                | WormholeError::Indexer(IndexerError::Source(_))
                | WormholeError::Merkle(MerkleError::NotFound)
                | WormholeError::Prover(ProverError::Busy)
                | WormholeError::MintFailed(_)
        )
    }
}
