//! Wormhole host library
//!
//! Connects the protocol in `wormhole-lib` to the outside world: an alloy
//! provider for the token contract, an external prover process, and the
//! command implementations behind the `wormhole` binary.

pub mod backend;
pub mod chain;
pub mod commands;
pub mod config;

pub use backend::ExternalProver;
pub use chain::EvmTokenClient;
pub use config::{CliClient, Config};
