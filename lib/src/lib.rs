//! Wormhole private transfers
//!
//! Client-side protocol for moving tokens between two addresses without an
//! on-chain link between them. The sender funds a one-time burn address
//! derived from the receiver and a secret; later, a zero-knowledge proof of
//! that funding transfer lets the contract mint the same amount to the
//! receiver.

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

pub mod chain;
pub mod commitment;
pub mod crypto;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod merkle;
pub mod prover;
pub mod submission;

/// First block of the token's transfer history that feeds the tree
pub const PROTOCOL_CHECKPOINT_BLOCK: u64 = 24_472_870;

/// Deployed Wormhole token
pub const WORMHOLE_TOKEN: Address = address!("17f558795bef05ffd2cb816e29ddd25e5381974b");

sol! {
    /// Subset of the Wormhole token ABI used by the client.
    interface IWormholeToken {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function balanceOf(address owner) external view returns (uint256);

        function transfer(address to, uint256 amount) external returns (bool);

        function verifyAndMint(
            address to,
            uint256 amount,
            bytes32 root,
            bytes32 nullifier,
            bytes proof
        ) external;
    }
}

pub use chain::{ChainError, MintCall, TokenClient, TxOutcome};
pub use commitment::{create_commitment, derive_burn_address, verify_burn_address, Commitment, Secret};
pub use error::WormholeError;
pub use indexer::{collect_leaves, EventSource, LeafInput, TransferEvent};
pub use ledger::{JsonFileStore, LedgerStore, MemoryStore, TransferLedger, TransferRecord, TransferStatus};
pub use merkle::{prove_inclusion, LeanMerkleTree, MerklePath, MAX_DEPTH};
pub use prover::{
    CircuitId, CircuitRegistry, ProofBackend, ProofData, ProofOrchestrator, ProverError, ProvingPermit,
    PublicOutputs, WormholeInputs,
};
pub use submission::{RedeemReceipt, SendReceipt, Submission, SubmissionPhase, WormholeClient};
