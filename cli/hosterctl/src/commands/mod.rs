//! CLI commands.

mod lifecycle;
mod network;
mod ping;
mod schedule;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// hosterctl - inspect placement, lifecycle and routing decisions.
#[derive(Debug, Parser)]
#[command(name = "hosterctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    /// Log filter for diagnostics on stderr (example: debug).
    #[arg(long, global = true, env = "HOSTER_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rank nodes for a resource request and show the placement decision.
    Schedule(schedule::ScheduleCommand),

    /// Check whether a status transition is legal.
    Transition(lifecycle::TransitionCommand),

    /// List the deployment lifecycle table.
    Transitions(lifecycle::TransitionsCommand),

    /// Compute the next free host port.
    Port(network::PortCommand),

    /// Resolve a Host header to a deployment slug.
    Host(network::HostCommand),

    /// Ping a node's runtime through the connection pool.
    Ping(ping::PingCommand),
}

impl Cli {
    /// Send logs to stderr so `--json` output stays parseable.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level.as_str()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            format: if self.json {
                OutputFormat::Json
            } else {
                OutputFormat::Table
            },
        };

        match self.command {
            Commands::Schedule(cmd) => cmd.run(ctx),
            Commands::Transition(cmd) => cmd.run(ctx),
            Commands::Transitions(cmd) => cmd.run(ctx),
            Commands::Port(cmd) => cmd.run(ctx),
            Commands::Host(cmd) => cmd.run(ctx),
            Commands::Ping(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_json_flag_is_global() {
        let cli = Cli::try_parse_from(["hosterctl", "transitions", "--json"]).unwrap();
        assert!(cli.json);
    }
}
