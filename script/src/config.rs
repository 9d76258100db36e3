//! Runtime configuration shared by all commands.
//!
//! Every option can come from the command line or the environment (a `.env`
//! file is loaded first by the binary).

use alloy::primitives::{utils::parse_ether, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use wormhole_lib::ledger::{JsonFileStore, TransferLedger, LEDGER_FILENAME};
use wormhole_lib::prover::{CircuitRegistry, ProofOrchestrator};
use wormhole_lib::{WormholeClient, PROTOCOL_CHECKPOINT_BLOCK};

use crate::backend::ExternalProver;
use crate::chain::EvmTokenClient;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_TOKEN: &str = "0x17F558795bEf05FFd2cB816e29ddD25e5381974b";
pub const DEFAULT_PROVER: &str = "wormhole-prover";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts/circuits";

pub type CliClient = WormholeClient<JsonFileStore, EvmTokenClient, ExternalProver>;

#[derive(Args, Clone)]
pub struct Config {
    /// JSON-RPC endpoint
    #[arg(long, env = "WORMHOLE_RPC_URL", default_value = DEFAULT_RPC_URL, global = true)]
    pub rpc_url: String,

    /// Private key paying for transactions (will prompt if not provided)
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true, global = true)]
    pub private_key: Option<String>,

    /// Wormhole token contract
    #[arg(long, env = "WORMHOLE_TOKEN", default_value = DEFAULT_TOKEN, global = true)]
    pub token: Address,

    /// First block scanned for transfer events
    #[arg(long, env = "WORMHOLE_FROM_BLOCK", default_value_t = PROTOCOL_CHECKPOINT_BLOCK, global = true)]
    pub from_block: u64,

    /// Transfer ledger file
    #[arg(long, env = "WORMHOLE_LEDGER", default_value = LEDGER_FILENAME, global = true)]
    pub ledger: PathBuf,

    /// Prover executable
    #[arg(long, env = "WORMHOLE_PROVER", default_value = DEFAULT_PROVER, global = true)]
    pub prover: PathBuf,

    /// Directory holding compiled circuits
    #[arg(long, env = "WORMHOLE_ARTIFACTS", default_value = DEFAULT_ARTIFACTS_DIR, global = true)]
    pub artifacts_dir: PathBuf,

    /// Broadcast mints without simulating them first
    #[arg(long, global = true)]
    pub no_preflight: bool,
}

impl Config {
    pub fn open_ledger(&self) -> TransferLedger<JsonFileStore> {
        TransferLedger::new(JsonFileStore::new(&self.ledger))
    }

    pub fn orchestrator(&self) -> ProofOrchestrator<ExternalProver> {
        ProofOrchestrator::new(
            ExternalProver::new(&self.prover),
            CircuitRegistry::new(&self.artifacts_dir),
        )
    }

    /// Client able to sign transactions
    pub async fn client(&self, signer: PrivateKeySigner) -> Result<CliClient> {
        let chain = EvmTokenClient::connect(&self.rpc_url, self.token, signer).await?;
        Ok(self.assemble(chain))
    }

    /// Client for ledger inspection and event queries only
    pub async fn read_only_client(&self) -> Result<CliClient> {
        let chain = EvmTokenClient::connect_read_only(&self.rpc_url, self.token).await?;
        Ok(self.assemble(chain))
    }

    fn assemble(&self, chain: EvmTokenClient) -> CliClient {
        WormholeClient::new(self.open_ledger(), chain, self.orchestrator())
            .with_checkpoint(self.from_block)
            .with_preflight(!self.no_preflight)
    }
}

/// Parse a `0x`-prefixed 32-byte hex private key.
pub fn parse_private_key(raw: &str) -> Result<PrivateKeySigner> {
    let key = raw.trim();
    if !key.starts_with("0x") || key.len() != 66 {
        bail!("private key must be a 0x-prefixed 32-byte hex string");
    }
    key.parse::<PrivateKeySigner>()
        .context("private key is not a valid secp256k1 scalar")
}

/// Parse a decimal token amount with 18 decimals.
pub fn parse_amount(raw: &str) -> Result<U256> {
    let amount = parse_ether(raw.trim()).with_context(|| format!("invalid amount {raw:?}"))?;
    if amount.is_zero() {
        bail!("amount must be greater than zero");
    }
    Ok(amount)
}

pub fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .with_context(|| format!("invalid address {raw:?}"))
}
