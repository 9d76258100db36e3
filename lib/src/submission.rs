//! Send and redeem flows
//!
//! A send commits to a receiver, records the commitment and funds its burn
//! address. A redeem rebuilds the transfer tree, proves that the burn
//! address was funded and submits the proof to the token contract, which
//! mints the amount to the receiver.
//!
//! ```text
//! Initiated -> Funding -> Funded -> Proving -> Minting -> Completed
//!                 |                               |
//!                 +-----------> Failed <----------+
//! ```

use alloy_primitives::{Address, B256, U256};
use std::fmt;
use tracing::{debug, info, warn};

use crate::chain::{MintCall, TokenClient};
use crate::commitment::{create_commitment, verify_burn_address};
use crate::crypto::field_to_b256;
use crate::error::WormholeError;
use crate::indexer::{collect_leaves, hash_leaves, EventSource, IndexerError, LeafInput};
use crate::ledger::{LedgerStore, TransferLedger, TransferRecord, TransferStatus};
use crate::merkle::{prove_inclusion, LeanMerkleTree};
use crate::prover::{ProofBackend, ProofOrchestrator, WormholeInputs};
use crate::PROTOCOL_CHECKPOINT_BLOCK;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionPhase {
    Initiated,
    Funding,
    Funded,
    Proving,
    Minting,
    Completed,
    Failed,
}

impl SubmissionPhase {
    pub fn can_advance_to(self, next: SubmissionPhase) -> bool {
        use SubmissionPhase::*;
        matches!(
            (self, next),
            (Initiated, Funding)
                | (Funding, Funded)
                | (Funding, Failed)
                | (Funded, Proving)
                | (Proving, Minting)
                | (Minting, Completed)
                | (Minting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionPhase::Completed | SubmissionPhase::Failed)
    }
}

impl fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SubmissionPhase::Initiated => "initiated",
            SubmissionPhase::Funding => "funding",
            SubmissionPhase::Funded => "funded",
            SubmissionPhase::Proving => "proving",
            SubmissionPhase::Minting => "minting",
            SubmissionPhase::Completed => "completed",
            SubmissionPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Phase tracker for one record's trip through a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    burn_address: Address,
    phase: SubmissionPhase,
}

impl Submission {
    pub fn new(burn_address: Address) -> Self {
        Self {
            burn_address,
            phase: SubmissionPhase::Initiated,
        }
    }

    /// Pick up a record whose funding is already confirmed
    pub fn resume_funded(burn_address: Address) -> Self {
        Self {
            burn_address,
            phase: SubmissionPhase::Funded,
        }
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    pub fn advance(&mut self, next: SubmissionPhase) -> Result<(), WormholeError> {
        if !self.phase.can_advance_to(next) {
            return Err(WormholeError::InvalidPhase {
                from: self.phase,
                to: next,
            });
        }
        info!(burn_address = %self.burn_address, from = %self.phase, to = %next, "submission phase changed");
        self.phase = next;
        Ok(())
    }
}

/// Result of a confirmed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub record: TransferRecord,
    pub transaction_hash: B256,
}

/// Result of a confirmed mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemReceipt {
    pub burn_address: Address,
    pub receiver: Address,
    pub amount: U256,
    /// Position of the funding transfer among the tree's leaves
    pub leaf_index: usize,
    pub root: B256,
    pub nullifier: B256,
    pub transaction_hash: B256,
}

/// Client-side driver of the protocol.
///
/// `C` talks to the token contract and its event history, `B` is the proving
/// service. Any number of sends may run concurrently; at most one redeem
/// holds the proving slot at a time.
pub struct WormholeClient<S, C, B> {
    ledger: TransferLedger<S>,
    chain: C,
    prover: ProofOrchestrator<B>,
    checkpoint: u64,
    preflight: bool,
}

impl<S, C, B> WormholeClient<S, C, B>
where
    S: LedgerStore,
    C: TokenClient + EventSource,
    B: ProofBackend,
{
    pub fn new(ledger: TransferLedger<S>, chain: C, prover: ProofOrchestrator<B>) -> Self {
        Self {
            ledger,
            chain,
            prover,
            checkpoint: PROTOCOL_CHECKPOINT_BLOCK,
            preflight: false,
        }
    }

    /// First block scanned for transfer events
    pub fn with_checkpoint(mut self, from_block: u64) -> Self {
        self.checkpoint = from_block;
        self
    }

    /// Simulate every mint before broadcasting it
    pub fn with_preflight(mut self, enabled: bool) -> Self {
        self.preflight = enabled;
        self
    }

    pub fn ledger(&self) -> &TransferLedger<S> {
        &self.ledger
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn prover(&self) -> &ProofOrchestrator<B> {
        &self.prover
    }

    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    /// Commit to `receiver` and fund the resulting burn address with `amount`.
    ///
    /// The record is written before the transfer is sent so the secret
    /// survives a crash mid-flight. If the transfer fails, the record is
    /// removed again and [`WormholeError::FundingFailed`] is returned.
    pub async fn send(&self, receiver: Address, amount: U256) -> Result<SendReceipt, WormholeError> {
        if receiver == Address::ZERO {
            return Err(WormholeError::InvalidInput(
                "receiver must not be the zero address".into(),
            ));
        }
        if amount.is_zero() {
            return Err(WormholeError::InvalidInput("amount must be greater than zero".into()));
        }

        let commitment = create_commitment(receiver)?;
        let burn_address = commitment.burn_address;
        let mut submission = Submission::new(burn_address);

        self.ledger.append(TransferRecord::pending(
            receiver,
            amount,
            burn_address,
            commitment.secret,
        ))?;
        submission.advance(SubmissionPhase::Funding)?;

        info!(%burn_address, %amount, "sending funding transfer");
        let failure = match self.chain.transfer(burn_address, amount).await {
            Ok(outcome) if outcome.success => {
                let record = self.ledger.mark_funded(&burn_address, outcome.transaction_hash)?;
                submission.advance(SubmissionPhase::Funded)?;
                info!(%burn_address, tx = %outcome.transaction_hash, "burn address funded");
                return Ok(SendReceipt {
                    record,
                    transaction_hash: outcome.transaction_hash,
                });
            }
            Ok(outcome) => format!("transaction {} reverted", outcome.transaction_hash),
            Err(err) => err.to_string(),
        };

        submission.advance(SubmissionPhase::Failed)?;
        warn!(%burn_address, error = %failure, "funding failed, rolling back ledger entry");
        if !self.ledger.rollback_pending(&burn_address)? {
            warn!(%burn_address, "pending record already gone during rollback");
        }
        Err(WormholeError::FundingFailed(failure))
    }

    /// Prove that `burn_address` was funded and mint its amount to the
    /// recorded receiver.
    ///
    /// A failure before or during minting leaves the record redeemable. Only
    /// a confirmed mint marks it used, so a used record is rejected up front
    /// and never reaches the contract twice.
    pub async fn redeem(&self, burn_address: Address) -> Result<RedeemReceipt, WormholeError> {
        self.redeemable(&burn_address)?;

        // Held until this function returns, across proving and minting.
        let permit = self.prover.try_acquire()?;
        // Another redeem may have finished between the first check and the
        // permit, so only the record read under the permit is trusted.
        let record = self.redeemable(&burn_address)?;
        let mut submission = Submission::resume_funded(burn_address);
        submission.advance(SubmissionPhase::Proving)?;

        self.prover.init().await?;

        let leaves = collect_leaves(&self.chain, self.checkpoint).await?;
        let tree = LeanMerkleTree::from_leaves(&hash_leaves(&leaves)?)?;
        let leaf = LeafInput::new(burn_address, record.amount).hash()?;
        let path = prove_inclusion(&tree, &leaf)?;
        debug!(
            tree_size = tree.size(),
            depth = tree.depth(),
            leaf_index = path.leaf_index,
            "funding leaf located"
        );

        let inputs = WormholeInputs {
            secret: record.secret,
            receiver: record.receiver,
            amount: record.amount,
            merkle_path: path,
        };
        let proof = self.prover.generate_proof(&permit, &inputs).await?;
        submission.advance(SubmissionPhase::Minting)?;

        let call = MintCall {
            to: record.receiver,
            amount: record.amount,
            root: field_to_b256(&proof.root),
            nullifier: proof.nullifier(),
            proof: proof.data.proof.clone(),
        };

        if self.preflight {
            if let Err(err) = self.chain.preflight_mint(&call).await {
                return Err(mint_failed(&mut submission, format!("pre-flight rejected: {err}")));
            }
        }

        info!(%burn_address, receiver = %call.to, nullifier = %call.nullifier, "submitting mint");
        let outcome = match self.chain.verify_and_mint(&call).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(mint_failed(&mut submission, err.to_string())),
        };
        if !outcome.success {
            return Err(mint_failed(
                &mut submission,
                format!("transaction {} reverted", outcome.transaction_hash),
            ));
        }

        self.ledger.mark_used(&burn_address)?;
        submission.advance(SubmissionPhase::Completed)?;
        info!(%burn_address, tx = %outcome.transaction_hash, "mint confirmed");

        Ok(RedeemReceipt {
            burn_address,
            receiver: record.receiver,
            amount: record.amount,
            leaf_index: inputs.merkle_path.leaf_index,
            root: call.root,
            nullifier: call.nullifier,
            transaction_hash: outcome.transaction_hash,
        })
    }

    fn redeemable(&self, burn_address: &Address) -> Result<TransferRecord, WormholeError> {
        let record = self
            .ledger
            .find(burn_address)?
            .ok_or(WormholeError::UnknownTransfer(*burn_address))?;

        match record.status() {
            TransferStatus::Used => return Err(WormholeError::AlreadyRedeemed(*burn_address)),
            TransferStatus::Pending => return Err(WormholeError::NotFunded(*burn_address)),
            TransferStatus::Ready => {}
        }
        if !verify_burn_address(&record.receiver, &record.secret, &record.burn_address)? {
            return Err(WormholeError::BurnAddressMismatch(*burn_address));
        }
        Ok(record)
    }

    pub fn list(&self) -> Result<Vec<TransferRecord>, WormholeError> {
        Ok(self.ledger.list_all()?)
    }

    /// Promote pending records whose funding transfer is visible on chain.
    ///
    /// A pending record is left behind when the process dies between sending
    /// the funding transfer and recording its receipt. Returns the records
    /// that were promoted.
    pub async fn reconcile_pending(&self) -> Result<Vec<TransferRecord>, WormholeError> {
        let pending: Vec<TransferRecord> = self
            .ledger
            .list_all()?
            .into_iter()
            .filter(|record| record.status() == TransferStatus::Pending)
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let events = self
            .chain
            .transfer_events(self.checkpoint)
            .await
            .map_err(IndexerError::from)?;

        let mut promoted = Vec::new();
        for record in pending {
            let landed = events
                .iter()
                .find(|event| event.to == record.burn_address && event.value == record.amount);
            match landed.and_then(|event| event.transaction_hash) {
                Some(hash) => {
                    info!(burn_address = %record.burn_address, tx = %hash, "recovered funding transfer");
                    promoted.push(self.ledger.mark_funded(&record.burn_address, hash)?);
                }
                None => debug!(burn_address = %record.burn_address, "funding transfer not found"),
            }
        }
        Ok(promoted)
    }
}

fn mint_failed(submission: &mut Submission, message: String) -> WormholeError {
    if let Err(err) = submission.advance(SubmissionPhase::Failed) {
        return err;
    }
    warn!(error = %message, "mint failed, record left redeemable");
    WormholeError::MintFailed(message)
}
