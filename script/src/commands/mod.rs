pub mod list;
pub mod redeem;
pub mod send;

pub use list::ListCommand;
pub use redeem::RedeemCommand;
pub use send::SendCommand;

use alloy::primitives::{utils::format_ether, Address, U256};
use alloy::signers::local::PrivateKeySigner;
use anyhow::Result;
use colored::*;
use dialoguer::{Confirm, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::config::{parse_address, parse_private_key, Config};

pub(crate) fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(50).bright_black());
    println!();
}

pub(crate) fn print_section(title: &str) {
    println!();
    println!("{}", title.bright_green().bold());
    println!("{}", "─".repeat(30).bright_black());
}

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Token amount with 18 decimals, trailing zeros trimmed
pub(crate) fn format_amount(amount: U256) -> String {
    let formatted = format_ether(amount);
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => formatted,
    }
}

pub(crate) fn prompt_address(prompt: &str) -> Result<Address> {
    let raw: String = Input::new()
        .with_prompt(prompt)
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.starts_with("0x") && input.len() == 42 && parse_address(input).is_ok() {
                Ok(())
            } else {
                Err("Please enter a valid Ethereum address (0x...)")
            }
        })
        .interact()?;
    parse_address(&raw)
}

pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    println!();
    let confirmed = Confirm::new().with_prompt(prompt).default(false).interact()?;
    if !confirmed {
        println!("{} Operation cancelled by user", "🚫".bright_red());
    }
    Ok(confirmed)
}

/// Signer from `--private-key`/`PRIVATE_KEY`, or an interactive prompt.
pub(crate) fn resolve_signer(config: &Config) -> Result<PrivateKeySigner> {
    let raw = match &config.private_key {
        Some(key) => key.clone(),
        None => {
            println!(
                "{} {}",
                "🔐".bright_blue(),
                "Private key required to sign transactions".bright_cyan()
            );
            Password::new().with_prompt("Enter your private key").interact()?
        }
    };
    parse_private_key(&raw)
}
