//! Deployment orchestration.
//!
//! Drives deployments through the lifecycle table against a [`DeploymentStore`], using
//! the scheduler for placement and a [`ClientProvider`] to reach node runtimes.
//!
//! Every status change is validated against the table first and then applied with a
//! compare-and-set, so a concurrent writer makes the call fail instead of being
//! overwritten.
//!
//! Host ports are allocated inside a per-node critical section covering
//! "read used ports, allocate, persist".

mod error;
mod store;

pub use error::{OrchestratorError, OrchestratorResult};
pub use store::{ContainerSpec, DeploymentStore, MemoryStore, StoreError};

use std::collections::HashMap;
use std::sync::Arc;

use hoster_id::{DeploymentId, NodeId};
use hoster_model::{lifecycle, Deployment, DeploymentStatus};
use hoster_networking::allocate_port;
use hoster_node_pool::{ClientError, ClientProvider, RuntimeClient};
use hoster_remote_protocol::{
    CreateContainerRequest, ErrorCode, PortBinding, PortProtocol, RemoveContainerRequest,
    ResourceLimits, RestartPolicy,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::scheduler::{self, Placement, ScheduleRequest};

const MANAGED_LABEL: &str = "hoster.managed";
const DEPLOYMENT_LABEL: &str = "hoster.deployment";

/// Runtime container name for a deployment.
pub fn container_name(id: &DeploymentId) -> String {
    format!("hoster-{id}")
}

pub struct Orchestrator {
    store: Arc<dyn DeploymentStore>,
    clients: Arc<dyn ClientProvider>,
    config: OrchestratorConfig,
    port_locks: std::sync::Mutex<HashMap<NodeId, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        clients: Arc<dyn ClientProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            clients,
            config,
            port_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Place a pending deployment on a node: pending -> scheduled.
    #[instrument(skip_all, fields(deployment_id = %id))]
    pub async fn schedule(&self, id: &DeploymentId) -> OrchestratorResult<Placement> {
        let deployment = self.store.get(id).await?;
        let trigger = lifecycle::validate(deployment.status, DeploymentStatus::Scheduled)?;

        let nodes = self.store.list_nodes().await?;
        let placement =
            scheduler::schedule(&nodes, &ScheduleRequest::for_deployment(&deployment))?;

        self.store
            .place(id, deployment.status, &placement.node_id)
            .await?;

        info!(
            node_id = %placement.node_id,
            score = placement.score,
            from = %deployment.status,
            trigger = trigger.as_str(),
            "Deployment scheduled"
        );
        Ok(placement)
    }

    /// Bring a deployment up: (scheduled | stopped | failed) -> starting -> running.
    ///
    /// Any failure after entering `starting` moves the deployment to `failed`.
    #[instrument(skip_all, fields(deployment_id = %id))]
    pub async fn start(&self, id: &DeploymentId) -> OrchestratorResult<Deployment> {
        let deployment = self.store.get(id).await?;
        lifecycle::validate(deployment.status, DeploymentStatus::Starting)?;
        let node_id = deployment
            .node_id
            .clone()
            .ok_or_else(|| OrchestratorError::NotScheduled(id.clone()))?;

        self.advance(id, deployment.status, DeploymentStatus::Starting)
            .await?;

        match self.provision(&deployment, &node_id).await {
            Ok(()) => {
                self.advance(id, DeploymentStatus::Starting, DeploymentStatus::Running)
                    .await?;
                let running = self.store.get(id).await?;
                info!(node_id = %node_id, port = running.port, "Deployment running");
                Ok(running)
            }
            Err(e) => {
                warn!(node_id = %node_id, error = %e, "Deployment failed to start");
                self.note_failure(&node_id, &e).await;
                if let Err(mark) = self
                    .advance(id, DeploymentStatus::Starting, DeploymentStatus::Failed)
                    .await
                {
                    warn!(error = %mark, "Could not mark deployment failed");
                }
                Err(e)
            }
        }
    }

    /// Stop a running deployment: running -> stopping -> stopped.
    ///
    /// A deployment left in `stopping` by an earlier failed attempt is resumed.
    #[instrument(skip_all, fields(deployment_id = %id))]
    pub async fn stop(&self, id: &DeploymentId) -> OrchestratorResult<()> {
        let deployment = self.store.get(id).await?;
        if deployment.status != DeploymentStatus::Stopping {
            self.advance(id, deployment.status, DeploymentStatus::Stopping)
                .await?;
        }

        if let Some(node_id) = &deployment.node_id {
            let name = container_name(id);
            let result = async {
                let client = self.clients.client(node_id).await?;
                client
                    .stop_container(&name, Some(self.config.stop_timeout))
                    .await
                    .or_else(|e| ignore_codes(e, &[ErrorCode::NotRunning, ErrorCode::NotFound]))?;
                Ok::<_, OrchestratorError>(())
            }
            .await;

            if let Err(e) = result {
                self.note_failure(node_id, &e).await;
                return Err(e);
            }
        }

        self.advance(id, DeploymentStatus::Stopping, DeploymentStatus::Stopped)
            .await?;
        info!("Deployment stopped");
        Ok(())
    }

    /// Delete a stopped or failed deployment: -> deleting -> deleted.
    ///
    /// Container removal is best-effort; the node may already be gone.
    #[instrument(skip_all, fields(deployment_id = %id))]
    pub async fn delete(&self, id: &DeploymentId) -> OrchestratorResult<()> {
        let deployment = self.store.get(id).await?;
        if deployment.status != DeploymentStatus::Deleting {
            self.advance(id, deployment.status, DeploymentStatus::Deleting)
                .await?;
        }

        if let Some(node_id) = &deployment.node_id {
            if let Err(e) = self.remove_container(node_id, id).await {
                warn!(node_id = %node_id, error = %e, "Container removal failed, continuing delete");
            }
        }

        self.advance(id, DeploymentStatus::Deleting, DeploymentStatus::Deleted)
            .await?;
        info!("Deployment deleted");
        Ok(())
    }

    /// Record a runtime failure reported from outside: (starting | running) -> failed.
    #[instrument(skip_all, fields(deployment_id = %id))]
    pub async fn fail(&self, id: &DeploymentId, reason: &str) -> OrchestratorResult<()> {
        let deployment = self.store.get(id).await?;
        self.advance(id, deployment.status, DeploymentStatus::Failed)
            .await?;
        warn!(reason, "Deployment failed");
        Ok(())
    }

    /// Validate `from -> to` against the table and apply it with a compare-and-set.
    async fn advance(
        &self,
        id: &DeploymentId,
        from: DeploymentStatus,
        to: DeploymentStatus,
    ) -> OrchestratorResult<()> {
        let trigger = lifecycle::validate(from, to)?;
        self.store.compare_and_set_status(id, from, to).await?;
        info!(
            deployment_id = %id,
            from = %from,
            to = %to,
            trigger = trigger.as_str(),
            "Deployment transitioned"
        );
        Ok(())
    }

    fn port_lock(&self, node_id: &NodeId) -> Arc<Mutex<()>> {
        let mut locks = match self.port_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(node_id.clone()).or_default().clone()
    }

    /// Reserve a host port for the deployment unless it already holds one.
    async fn reserve_port(
        &self,
        deployment: &Deployment,
        node_id: &NodeId,
    ) -> OrchestratorResult<u16> {
        if deployment.port > 0 {
            return Ok(deployment.port);
        }

        let lock = self.port_lock(node_id);
        let _guard = lock.lock().await;

        let used = self.store.used_ports(node_id).await?;
        let port = allocate_port(&used, self.config.port_range)?;
        self.store.assign_port(&deployment.id, port).await?;

        info!(node_id = %node_id, port, "Reserved host port");
        Ok(port)
    }

    async fn provision(&self, deployment: &Deployment, node_id: &NodeId) -> OrchestratorResult<()> {
        let port = self.reserve_port(deployment, node_id).await?;
        let client = self.clients.client(node_id).await?;
        let name = container_name(&deployment.id);

        let exists = match client.inspect_container(&name).await {
            Ok(_) => true,
            Err(ClientError::Remote(e)) if e.code == ErrorCode::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if !exists {
            let spec = self.store.container_spec(deployment).await?;
            let request = container_request(deployment, &spec, port);
            if !client.image_exists(&spec.image).await? {
                info!(image = %spec.image, "Pulling image");
                client
                    .pull_image(&hoster_remote_protocol::PullImageRequest {
                        image: spec.image.clone(),
                    })
                    .await?;
            }
            client
                .create_container(&request)
                .await
                .or_else(|e| ignore_codes(e, &[ErrorCode::AlreadyExists]).map(|_| Default::default()))?;
        }

        client
            .start_container(&name)
            .await
            .or_else(|e| ignore_codes(e, &[ErrorCode::AlreadyRunning]))?;
        Ok(())
    }

    async fn remove_container(&self, node_id: &NodeId, id: &DeploymentId) -> OrchestratorResult<()> {
        let client: Arc<dyn RuntimeClient> = self.clients.client(node_id).await?;
        client
            .remove_container(
                &container_name(id),
                &RemoveContainerRequest {
                    force: true,
                    remove_volumes: false,
                },
            )
            .await
            .or_else(|e| ignore_codes(e, &[ErrorCode::NotFound]))?;
        Ok(())
    }

    /// Drop the cached connection after a connectivity failure so the next call redials.
    async fn note_failure(&self, node_id: &NodeId, error: &OrchestratorError) {
        let connectivity = match error {
            OrchestratorError::Pool(_) => true,
            OrchestratorError::Client(e) => matches!(e, ClientError::Transport { .. }),
            _ => false,
        };
        if connectivity {
            self.clients.invalidate(node_id).await;
        }
    }
}

/// Treat remote errors with one of `codes` as success.
fn ignore_codes(error: ClientError, codes: &[ErrorCode]) -> Result<(), ClientError> {
    match &error {
        ClientError::Remote(remote) if codes.contains(&remote.code) => Ok(()),
        _ => Err(error),
    }
}

fn container_request(
    deployment: &Deployment,
    spec: &ContainerSpec,
    host_port: u16,
) -> CreateContainerRequest {
    let mut labels = std::collections::BTreeMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(DEPLOYMENT_LABEL.to_string(), deployment.id.to_string());

    CreateContainerRequest {
        name: container_name(&deployment.id),
        image: spec.image.clone(),
        command: spec.command.clone(),
        env: spec.env.clone(),
        ports: vec![PortBinding {
            container_port: spec.container_port,
            host_port,
            protocol: PortProtocol::Tcp,
        }],
        resources: ResourceLimits {
            cpu_cores: deployment.resources.cpu_cores,
            memory_mb: deployment.resources.memory_mb,
        },
        restart_policy: RestartPolicy::UnlessStopped,
        labels,
        ..Default::default()
    }
}
