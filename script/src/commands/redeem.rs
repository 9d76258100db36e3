use alloy::primitives::Address;
use anyhow::{bail, Result};
use clap::Args;
use colored::*;
use dialoguer::Select;
use wormhole_lib::merkle::MerkleError;
use wormhole_lib::prover::ProverError;
use wormhole_lib::{TransferRecord, TransferStatus, WormholeError};

use super::{confirm, format_amount, print_header, print_section, resolve_signer, spinner};
use crate::config::{parse_address, Config};

/// Prove a funded burn address and mint its tokens to the receiver
#[derive(Args, Debug)]
pub struct RedeemCommand {
    /// Burn address to redeem (will offer funded transfers if not provided)
    #[arg(long, short = 'b')]
    pub burn_address: Option<String>,

    /// Skip confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl RedeemCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        print_header(&format!("{} {}", "🔮", "Wormhole - Redeem".bright_magenta()));

        let ledger = config.open_ledger();
        let burn_address = match &self.burn_address {
            Some(raw) => parse_address(raw)?,
            None => select_ready(&ledger.list_all()?)?,
        };

        if let Some(record) = ledger.find(&burn_address)? {
            print_section("📋 Redemption Details");
            println!("{} {}", "Burn Address:".bright_white(), burn_address.to_string().bright_red());
            println!("{} {}", "Receiver:".bright_white(), record.receiver.to_string().bright_cyan());
            println!("{} {}", "Amount:".bright_white(), format_amount(record.amount).bright_yellow());
            println!("{} {}", "Status:".bright_white(), record.status());
            println!(
                "{} {}",
                "Pre-flight:".bright_white(),
                if config.no_preflight { "off".bright_yellow() } else { "on".bright_green() }
            );
        }

        let signer = resolve_signer(config)?;
        let client = config.client(signer).await?;

        if !self.yes
            && !confirm(&format!(
                "{} Generate a proof and mint? This may take a while.",
                "⚠️".bright_yellow()
            ))?
        {
            return Ok(());
        }

        println!();
        let pb = spinner("Rebuilding transfer tree and generating proof (this may take a while)...");
        let receipt = match client.redeem(burn_address).await {
            Ok(receipt) => {
                pb.finish_with_message("✅ Proof verified on chain, tokens minted");
                receipt
            }
            Err(err) => {
                pb.finish_with_message("❌ Redemption failed");
                if let Some(hint) = hint_for(&err) {
                    println!("{} {}", "💡".bright_yellow(), hint);
                }
                return Err(err.into());
            }
        };

        print_section("🎉 Minted");
        println!("{} {}", "Receiver:".bright_white(), receipt.receiver.to_string().bright_cyan());
        println!("{} {}", "Amount:".bright_white(), format_amount(receipt.amount).bright_yellow());
        println!("{} {}", "Leaf Index:".bright_white(), receipt.leaf_index);
        println!("{} {}", "Root:".bright_white(), receipt.root.to_string().bright_black());
        println!("{} {}", "Nullifier:".bright_white(), receipt.nullifier.to_string().bright_black());
        println!(
            "{} {}",
            "Transaction:".bright_white(),
            receipt.transaction_hash.to_string().bright_cyan()
        );
        Ok(())
    }
}

fn select_ready(records: &[TransferRecord]) -> Result<Address> {
    let ready: Vec<&TransferRecord> = records
        .iter()
        .filter(|record| record.status() == TransferStatus::Ready)
        .collect();
    if ready.is_empty() {
        bail!("no funded transfers waiting to be redeemed");
    }

    let items: Vec<String> = ready
        .iter()
        .map(|record| {
            format!(
                "{}  {} → {}",
                record.burn_address,
                format_amount(record.amount),
                record.receiver
            )
        })
        .collect();
    let choice = Select::new()
        .with_prompt("Select a transfer to redeem")
        .items(&items)
        .default(0)
        .interact()?;
    Ok(ready[choice].burn_address)
}

fn hint_for(err: &WormholeError) -> Option<&'static str> {
    match err {
        WormholeError::Merkle(MerkleError::NotFound) => {
            Some("The funding transfer is not in the rebuilt tree yet. Wait for it to be indexed and retry.")
        }
        WormholeError::NotFunded(_) => {
            Some("Run `wormhole list` to pick up funding transfers that landed after an interrupted send.")
        }
        WormholeError::MintFailed(_) => Some("The transfer is still redeemable; retry `wormhole redeem` later."),
        WormholeError::Prover(ProverError::Busy) => Some("Another redemption is using the prover; retry when it finishes."),
        WormholeError::Prover(_) => Some("Check --prover and --artifacts-dir point at a working prover setup."),
        _ => None,
    }
}
