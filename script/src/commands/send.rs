use anyhow::{bail, Result};
use clap::Args;
use colored::*;
use dialoguer::Input;
use tracing::warn;
use wormhole_lib::WormholeError;

use super::{confirm, format_amount, print_header, print_section, prompt_address, resolve_signer, spinner};
use crate::config::{parse_address, parse_amount, Config};

/// Fund a fresh burn address for a receiver
#[derive(Args, Debug)]
pub struct SendCommand {
    /// Address that will receive the minted tokens
    #[arg(long, short = 't')]
    pub to: Option<String>,

    /// Amount of tokens to send (decimal, 18 decimals)
    #[arg(long, short = 'a')]
    pub amount: Option<String>,

    /// Skip confirmation prompts
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl SendCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        print_header(&format!("{} {}", "🌀", "Wormhole - Send".bright_cyan()));

        let receiver = match &self.to {
            Some(raw) => parse_address(raw)?,
            None => prompt_address(&format!("{} Receiver address", "🎯".bright_green()))?,
        };

        let amount = match &self.amount {
            Some(raw) => parse_amount(raw)?,
            None => {
                let raw: String = Input::new()
                    .with_prompt(format!("{} Amount of tokens to send", "💰".bright_yellow()))
                    .validate_with(|input: &String| -> Result<(), String> {
                        parse_amount(input).map(|_| ()).map_err(|e| e.to_string())
                    })
                    .interact()?;
                parse_amount(&raw)?
            }
        };

        let signer = resolve_signer(config)?;
        let sender = signer.address();
        let client = config.client(signer).await?;

        print_section("📋 Transfer Details");
        println!("{} {}", "Receiver:".bright_white(), receiver.to_string().bright_cyan());
        println!("{} {}", "Amount:".bright_white(), format_amount(amount).bright_yellow());
        println!("{} {}", "From:".bright_white(), sender.to_string().bright_cyan());
        println!("{} {}", "Token:".bright_white(), config.token.to_string().bright_black());
        println!("{} {}", "Provider:".bright_white(), config.rpc_url.bright_cyan());

        match client.chain().balance_of(sender).await {
            Ok(balance) if balance < amount => {
                bail!(
                    "insufficient token balance: have {}, need {}",
                    format_amount(balance),
                    format_amount(amount)
                );
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "could not read token balance"),
        }

        if !self.yes
            && !confirm(&format!(
                "{} Send {} tokens through a new burn address?",
                "⚠️".bright_yellow(),
                format_amount(amount).bright_red().bold()
            ))?
        {
            return Ok(());
        }

        println!();
        let pb = spinner("Creating commitment and sending funding transfer...");
        let receipt = match client.send(receiver, amount).await {
            Ok(receipt) => {
                pb.finish_with_message("✅ Burn address funded");
                receipt
            }
            Err(err) => {
                pb.finish_with_message("❌ Funding failed");
                if matches!(err, WormholeError::FundingFailed(_)) {
                    println!(
                        "{} The ledger entry was rolled back; no tokens left your account.",
                        "ℹ️".bright_blue()
                    );
                }
                return Err(err.into());
            }
        };

        print_section("🔥 Burn Address");
        println!(
            "{} {}",
            "Burn Address:".bright_white(),
            receipt.record.burn_address.to_string().bright_red()
        );
        println!(
            "{} {}",
            "Transaction:".bright_white(),
            receipt.transaction_hash.to_string().bright_cyan()
        );
        println!(
            "{} {}",
            "Ledger:".bright_white(),
            config.ledger.display().to_string().bright_black()
        );
        println!();
        println!(
            "{} Keep the ledger file safe: its secret is the only way to redeem.",
            "🔐".bright_yellow()
        );
        println!(
            "{} Redeem with: wormhole redeem --burn-address {}",
            "💡".bright_yellow(),
            receipt.record.burn_address
        );
        Ok(())
    }
}
