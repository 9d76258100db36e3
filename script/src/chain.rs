//! alloy-backed access to the Wormhole token.

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, Log, TransactionRequest},
    signers::local::PrivateKeySigner,
};
use alloy_sol_types::{SolCall, SolEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use wormhole_lib::chain::{ChainError, MintCall, TokenClient, TxOutcome};
use wormhole_lib::indexer::{EventSource, TransferEvent};
use wormhole_lib::IWormholeToken;

/// Blocks per `eth_getLogs` request
pub const LOG_BLOCK_RANGE: u64 = 10_000;

pub struct EvmTokenClient {
    provider: DynProvider,
    token: Address,
    sender: Option<Address>,
}

impl EvmTokenClient {
    /// Connect with a wallet that signs and pays for transactions.
    pub async fn connect(rpc_url: &str, token: Address, signer: PrivateKeySigner) -> Result<Self> {
        let sender = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(signer)
            .connect(rpc_url)
            .await
            .with_context(|| format!("failed to connect to {rpc_url}"))?
            .erased();
        Ok(Self {
            provider,
            token,
            sender: Some(sender),
        })
    }

    /// Connect without a wallet. Sending transactions will fail.
    pub async fn connect_read_only(rpc_url: &str, token: Address) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .with_context(|| format!("failed to connect to {rpc_url}"))?
            .erased();
        Ok(Self {
            provider,
            token,
            sender: None,
        })
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn sender(&self) -> Option<Address> {
        self.sender
    }

    /// Token balance of `owner`.
    pub async fn balance_of(&self, owner: Address) -> Result<U256, ChainError> {
        let input = IWormholeToken::balanceOfCall { owner }.abi_encode();
        let output = self.provider.call(self.request(input)).await.map_err(ChainError::new)?;
        IWormholeToken::balanceOfCall::abi_decode_returns(&output).map_err(ChainError::new)
    }

    fn request(&self, input: Vec<u8>) -> TransactionRequest {
        let request = TransactionRequest::default()
            .with_to(self.token)
            .with_input(Bytes::from(input));
        match self.sender {
            Some(sender) => request.with_from(sender),
            None => request,
        }
    }

    async fn submit(&self, input: Vec<u8>, label: &str) -> Result<TxOutcome, ChainError> {
        if self.sender.is_none() {
            return Err(ChainError::new("no private key configured"));
        }
        let pending = self
            .provider
            .send_transaction(self.request(input))
            .await
            .map_err(ChainError::new)?;
        info!(tx = %pending.tx_hash(), "{label} transaction pending");

        let receipt = pending.get_receipt().await.map_err(ChainError::new)?;
        debug!(
            tx = %receipt.transaction_hash,
            block = ?receipt.block_number,
            gas_used = receipt.gas_used,
            "{label} receipt"
        );
        Ok(TxOutcome {
            transaction_hash: receipt.transaction_hash,
            success: receipt.status(),
        })
    }
}

#[async_trait]
impl TokenClient for EvmTokenClient {
    async fn transfer(&self, to: Address, amount: U256) -> Result<TxOutcome, ChainError> {
        let input = IWormholeToken::transferCall { to, amount }.abi_encode();
        self.submit(input, "transfer").await
    }

    async fn verify_and_mint(&self, call: &MintCall) -> Result<TxOutcome, ChainError> {
        self.submit(encode_mint(call), "verifyAndMint").await
    }

    async fn preflight_mint(&self, call: &MintCall) -> Result<(), ChainError> {
        self.provider
            .call(self.request(encode_mint(call)))
            .await
            .map_err(ChainError::new)?;
        Ok(())
    }
}

#[async_trait]
impl EventSource for EvmTokenClient {
    async fn transfer_events(&self, from_block: u64) -> Result<Vec<TransferEvent>, ChainError> {
        let latest = self.provider.get_block_number().await.map_err(ChainError::new)?;
        let mut events = Vec::new();

        let mut start = from_block;
        while start <= latest {
            let end = latest.min(start.saturating_add(LOG_BLOCK_RANGE - 1));
            let filter = Filter::new()
                .address(self.token)
                .event_signature(IWormholeToken::Transfer::SIGNATURE_HASH)
                .from_block(start)
                .to_block(end);
            let logs = self.provider.get_logs(&filter).await.map_err(ChainError::new)?;
            debug!(from = start, to = end, logs = logs.len(), "fetched transfer logs");

            for log in &logs {
                events.push(transfer_event(log)?);
            }
            start = end + 1;
        }

        // Chunks arrive in order, but nodes do not promise order within one.
        events.sort_by_key(TransferEvent::position);
        Ok(events)
    }
}

/// Decode a `Transfer` log. A log without a chain position cannot be placed
/// in the tree, and skipping it would shift every later leaf.
fn transfer_event(log: &Log) -> Result<TransferEvent, ChainError> {
    let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
        return Err(ChainError::new(format!(
            "transfer log in tx {:?} has no block position",
            log.transaction_hash
        )));
    };
    let decoded = log
        .log_decode::<IWormholeToken::Transfer>()
        .map_err(ChainError::new)?;
    Ok(TransferEvent {
        to: decoded.inner.data.to,
        value: decoded.inner.data.value,
        block_number,
        log_index,
        transaction_hash: log.transaction_hash,
    })
}

fn encode_mint(call: &MintCall) -> Vec<u8> {
    IWormholeToken::verifyAndMintCall {
        to: call.to,
        amount: call.amount,
        root: call.root,
        nullifier: call.nullifier,
        proof: call.proof.clone(),
    }
    .abi_encode()
}
