//! hoster ingress
//!
//! HTTP/1.x proxy routing `<slug>.<base domain>` to deployment ports.
//!
//! This service:
//! - Loads the last known target table from disk, then keeps it in sync with the
//!   control plane
//! - Sniffs the `Host` header of each connection and resolves it to a deployment
//! - Forwards to local deployments over loopback and to remote ones through node tunnels
//! - Serves `/healthz` and `/stats` on the admin address

use std::sync::Arc;

use anyhow::{Context, Result};
use hoster_ingress::admin::{self, AdminState};
use hoster_ingress::config::Config;
use hoster_ingress::persistence::StatePersistence;
use hoster_ingress::sync::TargetSync;
use hoster_ingress::{Listener, ListenerConfig, TargetTable};
use hoster_networking::HostnameParser;
use hoster_node_pool::{ClientProvider, HttpCredentialStore, KeyDecryptor, NodePool};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to HOSTER_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting hoster ingress");
    info!(
        listen_addr = %config.listen_addr,
        admin_addr = %config.admin_addr,
        base_domain = %config.base_domain,
        control_plane_url = %config.control_plane_url,
        state_file = ?config.state_file,
        "Configuration loaded"
    );

    let parser = HostnameParser::new(&config.base_domain).context("Invalid HOSTER_BASE_DOMAIN")?;

    let persistence = config.state_file.clone().map(StatePersistence::new);
    let initial = match &persistence {
        Some(p) => p.load()?.targets,
        None => Default::default(),
    };
    let targets = Arc::new(TargetTable::from_targets(initial));

    let keys = KeyDecryptor::from_env().context("Node key decryptor unavailable")?;
    info!(key_id = %keys.key_id(), "Node key loaded");
    let credentials = Arc::new(
        HttpCredentialStore::new(config.control_plane_url.clone())
            .context("Failed to build credential store")?,
    );
    let pool: Arc<dyn ClientProvider> =
        Arc::new(NodePool::from_config(&config.pool, credentials, keys));

    let mut listener_config = ListenerConfig::new(config.listen_addr);
    listener_config.max_connections = config.max_connections;
    listener_config.connect_timeout = config.pool.connect_timeout;
    listener_config.idle_timeout = config.idle_timeout;

    let listener = Arc::new(
        Listener::bind(listener_config, parser, Arc::clone(&targets), pool)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen_addr))?,
    );

    let admin_state = AdminState {
        stats: listener.stats(),
        targets: Arc::clone(&targets),
    };
    let admin_addr = config.admin_addr;
    tokio::spawn(async move {
        if let Err(e) = admin::serve(admin_addr, admin_state).await {
            error!(error = %e, "Admin endpoint stopped");
        }
    });

    tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            error!(error = %e, "Listener error");
        }
    });

    let sync = TargetSync::new(&config.control_plane_url, targets, persistence)?;
    sync.run(config.sync_interval).await;
    Ok(())
}
