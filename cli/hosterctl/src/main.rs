//! hosterctl - operator CLI for the hoster control plane
//!
//! Offline placement dry-runs, lifecycle and routing checks, and node pings through the
//! connection pool.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
