//! Orchestrator configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use hoster_networking::{PortRange, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START};

/// Orchestrator configuration (env-driven).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Host ports handed out to deployments.
    pub port_range: PortRange,

    /// Grace period passed to the runtime when stopping a container.
    pub stop_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            port_range: PortRange::default(),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let start: u16 = std::env::var("HOSTER_PORT_RANGE_START")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("HOSTER_PORT_RANGE_START must be a port number.")?
            .unwrap_or(DEFAULT_PORT_RANGE_START);

        let end: u16 = std::env::var("HOSTER_PORT_RANGE_END")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("HOSTER_PORT_RANGE_END must be a port number.")?
            .unwrap_or(DEFAULT_PORT_RANGE_END);

        let port_range = PortRange::new(start, end).context("Invalid host port range")?;

        let stop_timeout_ms: u64 = std::env::var("HOSTER_STOP_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("HOSTER_STOP_TIMEOUT_MS must be an integer (milliseconds).")?
            .unwrap_or(10_000);

        Ok(Self {
            port_range,
            stop_timeout: Duration::from_millis(stop_timeout_ms),
        })
    }
}
