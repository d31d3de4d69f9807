//! Node reachability through the connection pool.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use hoster_id::NodeId;
use hoster_node_pool::{HttpCredentialStore, KeyDecryptor, NodePool, PoolConfig};
use serde::Serialize;
use tracing::debug;

use crate::output::{print_info, print_json, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PingCommand {
    /// Node ID, or `local` for this host.
    node: NodeId,

    /// Control plane base URL, used to look up node connection details.
    #[arg(long, env = "HOSTER_CONTROL_PLANE_URL", default_value = "http://localhost:8080")]
    control_plane_url: String,
}

#[derive(Debug, Serialize)]
struct PingResult {
    node_id: NodeId,
    latency_ms: u64,
    version: serde_json::Value,
}

impl PingCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let config = PoolConfig::from_env()?;
        let keys = KeyDecryptor::from_env().context("Node key decryptor unavailable")?;
        let credentials = Arc::new(HttpCredentialStore::new(self.control_plane_url.clone())?);
        let pool = NodePool::from_config(&config, credentials, keys);

        let started = Instant::now();
        let client = pool.get_client(&self.node).await?;
        debug!(node_id = %self.node, dials = pool.dial_count(), "Client ready");

        client.ping().await?;
        let latency_ms = started.elapsed().as_millis() as u64;
        let version = client.version().await?;
        pool.close_all().await;

        match ctx.format {
            OutputFormat::Json => print_json(&PingResult {
                node_id: self.node,
                latency_ms,
                version: serde_json::to_value(&version)?,
            }),
            OutputFormat::Table => {
                print_success(&format!("{} answered in {latency_ms} ms", self.node));
                print_info(&format!(
                    "helper {} (api {}), runtime {}",
                    version.version, version.api_version, version.runtime_version
                ));
            }
        }
        Ok(())
    }
}
