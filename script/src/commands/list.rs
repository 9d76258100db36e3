use anyhow::Result;
use clap::Args;
use colored::*;
use tracing::warn;
use wormhole_lib::{TransferRecord, TransferStatus};

use super::{format_amount, print_header, print_section};
use crate::config::Config;

/// Show recorded transfers and their status
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Do not query the chain for pending transfers that have landed
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    pending: usize,
    ready: usize,
    used: usize,
}

impl Summary {
    fn of(records: &[TransferRecord]) -> Self {
        records.iter().fold(Summary::default(), |mut summary, record| {
            match record.status() {
                TransferStatus::Pending => summary.pending += 1,
                TransferStatus::Ready => summary.ready += 1,
                TransferStatus::Used => summary.used += 1,
            }
            summary
        })
    }
}

fn status_label(status: TransferStatus) -> ColoredString {
    match status {
        TransferStatus::Pending => "Pending".bright_yellow(),
        TransferStatus::Ready => "Ready".bright_green(),
        TransferStatus::Used => "Used".bright_black(),
    }
}

impl ListCommand {
    pub async fn execute(&self, config: &Config) -> Result<()> {
        print_header(&format!("{} {}", "📜", "Wormhole - Transfers".bright_blue()));

        if !self.offline {
            refresh_pending(config).await;
        }

        let records = config.open_ledger().list_all()?;
        if records.is_empty() {
            println!(
                "{} No transfers recorded in {}",
                "ℹ️".bright_blue(),
                config.ledger.display()
            );
            return Ok(());
        }

        for (index, record) in records.iter().enumerate() {
            println!(
                "{} {}  {}",
                format!("#{index}").bright_white(),
                status_label(record.status()),
                record.burn_address.to_string().bright_red()
            );
            println!("   {} {}", "Amount:".bright_white(), format_amount(record.amount));
            println!("   {} {}", "Receiver:".bright_white(), record.receiver);
            if let Some(hash) = record.transaction_hash {
                println!("   {} {}", "Funding Tx:".bright_white(), hash.to_string().bright_black());
            }
        }

        let summary = Summary::of(&records);
        print_section("Summary");
        println!(
            "{} pending, {} ready, {} used",
            summary.pending.to_string().bright_yellow(),
            summary.ready.to_string().bright_green(),
            summary.used.to_string().bright_black()
        );
        Ok(())
    }
}

/// Best effort: failures are logged and the listing goes on.
async fn refresh_pending(config: &Config) {
    let client = match config.read_only_client().await {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "skipping pending transfer refresh");
            return;
        }
    };
    match client.reconcile_pending().await {
        Ok(promoted) => {
            for record in promoted {
                println!(
                    "{} Funding transfer found for {}",
                    "🔄".bright_green(),
                    record.burn_address
                );
            }
        }
        Err(err) => warn!(error = %err, "could not refresh pending transfers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256, U256};
    use wormhole_lib::Secret;

    fn record(byte: u8) -> TransferRecord {
        TransferRecord::pending(
            Address::repeat_byte(1),
            U256::from(10u64),
            Address::repeat_byte(byte),
            Secret::from_u256(U256::from(byte)),
        )
    }

    #[test]
    fn test_summary_counts_statuses() {
        let pending = record(1);
        let mut ready = record(2);
        ready.transaction_hash = Some(B256::repeat_byte(2));
        let mut used = record(3);
        used.transaction_hash = Some(B256::repeat_byte(3));
        used.used = true;

        let summary = Summary::of(&[pending, ready.clone(), ready, used]);
        assert_eq!(
            summary,
            Summary {
                pending: 1,
                ready: 2,
                used: 1
            }
        );
    }
}
