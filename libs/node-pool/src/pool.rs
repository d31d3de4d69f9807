//! Per-node connection cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hoster_id::NodeId;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::client::{HelperClient, RuntimeClient};
use crate::config::PoolConfig;
use crate::credentials::NodeCredentialStore;
use crate::error::PoolError;
use crate::key::KeyDecryptor;
use crate::ssh::SshDialer;
use crate::transport::{LocalTransport, TunnelDialer};

/// Cached state for one remote node.
///
/// The state mutex is held across a dial, so concurrent callers for the same node wait
/// for that dial instead of starting their own. `cached` mirrors `state.client.is_some()`
/// and can be read without waiting on that mutex.
#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    cached: AtomicBool,
}

#[derive(Default)]
struct SlotState {
    client: Option<Arc<HelperClient>>,
    removed: bool,
}

impl Slot {
    fn store(&self, state: &mut SlotState, client: Option<Arc<HelperClient>>) {
        self.cached.store(client.is_some(), Ordering::Release);
        state.client = client;
    }

    fn take(&self, state: &mut SlotState) -> Option<Arc<HelperClient>> {
        self.cached.store(false, Ordering::Release);
        state.client.take()
    }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub cached: usize,
    pub dials: u64,
    pub dial_failures: u64,
}

/// Source of runtime clients keyed by node.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client(&self, node_id: &NodeId) -> Result<Arc<dyn RuntimeClient>, PoolError>;

    /// Report that a client handed out for `node_id` stopped working.
    async fn invalidate(&self, node_id: &NodeId);
}

/// Hands out runtime clients for nodes, dialing remote nodes on demand.
pub struct NodePool {
    local: Arc<dyn RuntimeClient>,
    credentials: Arc<dyn NodeCredentialStore>,
    dialer: Arc<dyn TunnelDialer>,
    keys: KeyDecryptor,
    dial_timeout: Duration,
    slots: RwLock<HashMap<NodeId, Arc<Slot>>>,
    dials: AtomicU64,
    dial_failures: AtomicU64,
}

impl NodePool {
    pub fn new(
        local: Arc<dyn RuntimeClient>,
        credentials: Arc<dyn NodeCredentialStore>,
        dialer: Arc<dyn TunnelDialer>,
        keys: KeyDecryptor,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            local,
            credentials,
            dialer,
            keys,
            dial_timeout,
            slots: RwLock::new(HashMap::new()),
            dials: AtomicU64::new(0),
            dial_failures: AtomicU64::new(0),
        }
    }

    /// Pool with a local helper client and SSH tunnels for remote nodes.
    pub fn from_config(
        config: &PoolConfig,
        credentials: Arc<dyn NodeCredentialStore>,
        keys: KeyDecryptor,
    ) -> Self {
        let local = Arc::new(HelperClient::new(
            NodeId::local(),
            Arc::new(LocalTransport::new(
                config.helper_path.clone(),
                config.connect_timeout,
            )),
        ));
        let dialer = Arc::new(SshDialer::new(
            config.ssh_binary.clone(),
            config.helper_path.clone(),
            config.runtime_dir.clone(),
            config.dial_timeout,
        ));
        Self::new(local, credentials, dialer, keys, config.dial_timeout)
    }

    /// Return a live client for `node_id`, dialing if nothing usable is cached.
    #[instrument(skip_all, fields(node_id = %node_id))]
    pub async fn get_client(&self, node_id: &NodeId) -> Result<Arc<dyn RuntimeClient>, PoolError> {
        if node_id.is_local() {
            return Ok(self.local.clone());
        }

        let slot = self.slot(node_id).await;
        let mut guard = slot.state.lock().await;

        if guard.removed {
            return Err(PoolError::NodeRemoved(node_id.clone()));
        }

        if let Some(client) = &guard.client {
            if client.is_alive() {
                let client: Arc<dyn RuntimeClient> = client.clone();
                return Ok(client);
            }
            warn!("Cached tunnel is no longer alive, redialing");
            client.transport().close().await;
            slot.take(&mut guard);
        }

        let client = self.establish(node_id).await?;
        slot.store(&mut guard, Some(client.clone()));
        let client: Arc<dyn RuntimeClient> = client;
        Ok(client)
    }

    /// Drop the cached connection for `node_id`; the next call dials afresh.
    pub async fn invalidate(&self, node_id: &NodeId) {
        let Some(slot) = self.slots.read().await.get(node_id).cloned() else {
            return;
        };
        let stale = {
            let mut guard = slot.state.lock().await;
            slot.take(&mut guard)
        };
        if let Some(client) = stale {
            client.transport().close().await;
            info!(node_id = %node_id, "Invalidated node connection");
        }
    }

    /// Forget `node_id` entirely. Callers waiting on an in-flight dial get
    /// [`PoolError::NodeRemoved`].
    pub async fn remove(&self, node_id: &NodeId) {
        let Some(slot) = self.slots.write().await.remove(node_id) else {
            return;
        };
        let mut guard = slot.state.lock().await;
        guard.removed = true;
        if let Some(client) = slot.take(&mut guard) {
            client.transport().close().await;
        }
        info!(node_id = %node_id, "Removed node from pool");
    }

    /// Close every cached connection.
    pub async fn close_all(&self) {
        let slots: Vec<_> = self.slots.write().await.drain().collect();
        for (node_id, slot) in slots {
            let mut guard = slot.state.lock().await;
            guard.removed = true;
            if let Some(client) = slot.take(&mut guard) {
                client.transport().close().await;
                debug!(node_id = %node_id, "Closed node connection");
            }
        }
    }

    /// Nodes with a cached connection, sorted.
    ///
    /// Does not wait for in-flight dials or lookups.
    pub async fn cached_nodes(&self) -> Vec<NodeId> {
        let mut cached: Vec<NodeId> = self
            .slots
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.cached.load(Ordering::Acquire))
            .map(|(id, _)| id.clone())
            .collect();
        cached.sort();
        cached
    }

    /// Number of tunnel dials attempted since construction.
    pub fn dial_count(&self) -> u64 {
        self.dials.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> PoolStats {
        PoolStats {
            cached: self.cached_nodes().await.len(),
            dials: self.dial_count(),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
        }
    }

    async fn slot(&self, node_id: &NodeId) -> Arc<Slot> {
        // Fast path: read lock
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(node_id) {
                return slot.clone();
            }
        }

        // Slow path: write lock
        let mut slots = self.slots.write().await;
        slots.entry(node_id.clone()).or_default().clone()
    }

    async fn establish(&self, node_id: &NodeId) -> Result<Arc<HelperClient>, PoolError> {
        let attempt = async {
            let connection = self
                .credentials
                .connection(node_id)
                .await
                .map_err(|source| PoolError::Credentials {
                    node_id: node_id.clone(),
                    source,
                })?;

            let key = self
                .keys
                .decrypt(&connection.encrypted_private_key)
                .map_err(|source| PoolError::Key {
                    node_id: node_id.clone(),
                    source,
                })?;

            self.dials.fetch_add(1, Ordering::Relaxed);
            self.dialer.dial(node_id, &connection, &key).await
        };

        let result = match tokio::time::timeout(self.dial_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::Timeout {
                node_id: node_id.clone(),
                timeout: self.dial_timeout,
            }),
        };

        match result {
            Ok(transport) => {
                info!("Node connection established");
                Ok(Arc::new(HelperClient::new(node_id.clone(), transport)))
            }
            Err(e) => {
                self.dial_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Node connection failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ClientProvider for NodePool {
    async fn client(&self, node_id: &NodeId) -> Result<Arc<dyn RuntimeClient>, PoolError> {
        self.get_client(node_id).await
    }

    async fn invalidate(&self, node_id: &NodeId) {
        NodePool::invalidate(self, node_id).await
    }
}
