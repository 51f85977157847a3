//! Wallet-Pilot CLI - wallet-extension browser automation for LLM agents
//!
//! Each invocation runs one command against the (possibly already running)
//! browser session and prints exactly one structured JSON record to stdout.

use clap::Parser;
use wallet_pilot::commands::Commands;
use wallet_pilot::common::logging;
use wallet_pilot::{cli, report};

#[derive(Parser)]
#[command(name = "wallet-pilot", about = "LLM-friendly wallet-extension browser automation")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let _log_guard = logging::init_cli();

    let cli = Cli::parse();

    match cli::dispatch(cli.command).await {
        Ok(record) => report::emit(&record),
        Err(e) => {
            // Structural failure: still emit a record, then exit non-zero
            report::emit(&report::failure(&e));
            std::process::exit(1);
        }
    }
}
