//! Pool configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Node pool configuration (env-driven).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on one tunnel dial, handshake included.
    pub dial_timeout: Duration,

    /// `ssh` executable used for tunnels.
    pub ssh_binary: String,

    /// Helper executable name or path, on this host and on remote nodes.
    pub helper_path: String,

    /// Directory for control sockets and staged keys.
    pub runtime_dir: PathBuf,

    /// Connect timeout for direct TCP streams to local deployments.
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_millis(10_000),
            ssh_binary: "ssh".to_string(),
            helper_path: "hoster-helper".to_string(),
            runtime_dir: std::env::temp_dir(),
            connect_timeout: Duration::from_millis(2_000),
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let dial_timeout = std::env::var("HOSTER_DIAL_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("HOSTER_DIAL_TIMEOUT_MS must be an integer (milliseconds).")?
            .map(|ms| Duration::from_millis(ms.max(100)))
            .unwrap_or(defaults.dial_timeout);

        let connect_timeout = std::env::var("HOSTER_CONNECT_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("HOSTER_CONNECT_TIMEOUT_MS must be an integer (milliseconds).")?
            .map(|ms| Duration::from_millis(ms.max(10)))
            .unwrap_or(defaults.connect_timeout);

        let ssh_binary = std::env::var("HOSTER_SSH_BINARY").unwrap_or(defaults.ssh_binary);
        let helper_path = std::env::var("HOSTER_HELPER_PATH").unwrap_or(defaults.helper_path);
        let runtime_dir = std::env::var("HOSTER_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.runtime_dir);

        Ok(Self {
            dial_timeout,
            ssh_binary,
            helper_path,
            runtime_dir,
            connect_timeout,
        })
    }
}
