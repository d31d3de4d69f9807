//! Ingress configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use hoster_node_pool::PoolConfig;

/// Ingress configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Public proxy listener.
    pub listen_addr: SocketAddr,

    /// Admin endpoint (`/healthz`, `/stats`).
    pub admin_addr: SocketAddr,

    /// Hostnames are `<slug>.<base_domain>`.
    pub base_domain: String,

    /// Control plane base URL (example: http://localhost:8080).
    pub control_plane_url: String,

    pub sync_interval: Duration,

    /// Where the last applied target table is kept across restarts.
    pub state_file: Option<PathBuf>,

    pub max_connections: usize,

    /// Closes forwarded connections idle this long; unset means no limit.
    pub idle_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Tunnels to remote nodes; `pool.connect_timeout` also bounds local target dials.
    pub pool: PoolConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("HOSTER_INGRESS_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()
            .context("HOSTER_INGRESS_LISTEN_ADDR must be a socket address.")?;

        let admin_addr = std::env::var("HOSTER_ADMIN_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:9100".to_string())
            .parse()
            .context("HOSTER_ADMIN_LISTEN_ADDR must be a socket address.")?;

        let base_domain = std::env::var("HOSTER_BASE_DOMAIN")
            .context("Missing base domain. Set HOSTER_BASE_DOMAIN (example: apps.example.com).")?;

        let control_plane_url = std::env::var("HOSTER_CONTROL_PLANE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());

        let sync_interval_ms: u64 = std::env::var("HOSTER_SYNC_INTERVAL_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("HOSTER_SYNC_INTERVAL_MS must be an integer (milliseconds).")?
            .unwrap_or(2000);
        let sync_interval = Duration::from_millis(sync_interval_ms.max(100));

        let state_file = std::env::var("HOSTER_STATE_FILE").ok().map(PathBuf::from);

        let max_connections: usize = std::env::var("HOSTER_MAX_CONNECTIONS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("HOSTER_MAX_CONNECTIONS must be an integer.")?
            .unwrap_or(10_000)
            .max(1);

        let idle_timeout = std::env::var("HOSTER_IDLE_TIMEOUT_MS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("HOSTER_IDLE_TIMEOUT_MS must be an integer (milliseconds).")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let log_level = std::env::var("HOSTER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let pool = PoolConfig::from_env()?;

        Ok(Self {
            listen_addr,
            admin_addr,
            base_domain,
            control_plane_url,
            sync_interval,
            state_file,
            max_connections,
            idle_timeout,
            log_level,
            pool,
        })
    }
}
