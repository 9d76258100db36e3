//! Wormhole CLI - private token transfers through one-time burn addresses
//!
//! Usage:
//! ```shell
//! # Fund a burn address for a receiver
//! cargo run --bin wormhole -- send --to $RECEIVER --amount 1.5
//!
//! # Prove the funding transfer and mint to the receiver
//! cargo run --bin wormhole -- redeem --burn-address $BURN_ADDR
//!
//! # Show recorded transfers
//! cargo run --bin wormhole -- list
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use console::Term;
use std::process;
use tracing_subscriber::EnvFilter;

use wormhole_script::commands::{ListCommand, RedeemCommand, SendCommand};
use wormhole_script::config::Config;

#[derive(Parser)]
#[command(
    name = "wormhole",
    about = "🌀 Wormhole - private token transfers",
    long_about = "Wormhole sends tokens to a one-time burn address and later mints the same amount to the receiver with a zero-knowledge proof, leaving no on-chain link between the two.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    config: Config,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 🔥 Fund a fresh burn address for a receiver
    Send(SendCommand),
    /// 🔮 Prove a funded burn address and mint to its receiver
    Redeem(RedeemCommand),
    /// 📜 Show recorded transfers
    List(ListCommand),
}

fn print_banner() {
    if !Term::stdout().is_term() {
        return;
    }
    println!(
        "{}",
        r#"
    ╦ ╦╔═╗╦═╗╔╦╗╦ ╦╔═╗╦  ╔═╗
    ║║║║ ║╠╦╝║║║╠═╣║ ║║  ║╣
    ╚╩╝╚═╝╩╚═╩ ╩╩ ╩╚═╝╩═╝╚═╝
    "#
        .bright_cyan()
        .bold()
    );
    println!("{}", "    Private transfers through burn addresses".bright_cyan().italic());
    println!("{}", "    ════════════════════════════════════════".bright_black());
    println!();
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .init();
}

#[tokio::main]
async fn main() {
    // Initialize rustls crypto provider; an already installed one is fine.
    use rustls::crypto::ring::default_provider;
    use rustls::crypto::CryptoProvider;
    let _ = CryptoProvider::install_default(default_provider());

    dotenv::dotenv().ok();

    let cli = Cli::parse();
    setup_logging(cli.verbose);
    print_banner();

    let result = match &cli.command {
        Commands::Send(cmd) => cmd.execute(&cli.config).await,
        Commands::Redeem(cmd) => cmd.execute(&cli.config).await,
        Commands::List(cmd) => cmd.execute(&cli.config).await,
    };

    if let Err(e) = result {
        println!();
        eprintln!("{} {}", "💥".bright_red(), "Operation failed!".bright_red().bold());
        eprintln!("{} {}", "📋".bright_yellow(), "Error details:".bright_yellow());
        eprintln!("   {}", format!("{e:#}").bright_red());
        println!();
        eprintln!("{} {}", "💡".bright_blue(), "Tips:".bright_blue().bold());
        eprintln!("   • Check your private key format (should start with 0x)");
        eprintln!("   • Ensure your RPC provider is accessible (--rpc-url / WORMHOLE_RPC_URL)");
        eprintln!("   • Verify the prover and circuit artifacts are installed");
        eprintln!("   • Run with --verbose for detailed logs");
        process::exit(1);
    }
}
