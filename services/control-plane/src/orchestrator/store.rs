//! Deployment storage seam.
//!
//! The resource store is an external collaborator; the orchestrator only relies on the
//! operations below. Status changes go through [`DeploymentStore::compare_and_set_status`]
//! so a transition is checked against the persisted status, not a stale copy.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use hoster_id::{DeploymentId, NodeId, TemplateId};
use hoster_model::{Deployment, DeploymentStatus, Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("deployment {id} is {actual}, expected {expected}")]
    Conflict {
        id: DeploymentId,
        expected: DeploymentStatus,
        actual: DeploymentStatus,
    },

    #[error("store error: {0}")]
    Backend(String),
}

/// What to run for a deployment, resolved from its template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    /// Port the application listens on inside the container.
    pub container_port: u16,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn get(&self, id: &DeploymentId) -> Result<Deployment, StoreError>;

    /// Set the status to `next` only if it is currently `expected`.
    async fn compare_and_set_status(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        next: DeploymentStatus,
    ) -> Result<(), StoreError>;

    /// Record the placement and move to `scheduled`, only if the status is still
    /// `expected`. Node and status change together or not at all.
    async fn place(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        node_id: &NodeId,
    ) -> Result<(), StoreError>;

    async fn assign_port(&self, id: &DeploymentId, port: u16) -> Result<(), StoreError>;

    /// Host ports held by live deployments on `node_id`.
    async fn used_ports(&self, node_id: &NodeId) -> Result<Vec<u16>, StoreError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;

    async fn container_spec(&self, deployment: &Deployment) -> Result<ContainerSpec, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    deployments: HashMap<DeploymentId, Deployment>,
    nodes: Vec<Node>,
    specs: HashMap<TemplateId, ContainerSpec>,
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_node(&self, node: Node) {
        let mut state = self.state.write().await;
        state.nodes.retain(|n| n.id != node.id);
        state.nodes.push(node);
    }

    pub async fn insert_deployment(&self, deployment: Deployment) {
        self.state
            .write()
            .await
            .deployments
            .insert(deployment.id.clone(), deployment);
    }

    pub async fn insert_spec(&self, template_id: TemplateId, spec: ContainerSpec) {
        self.state.write().await.specs.insert(template_id, spec);
    }

    pub async fn deployments(&self) -> Vec<Deployment> {
        self.state.read().await.deployments.values().cloned().collect()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn get(&self, id: &DeploymentId) -> Result<Deployment, StoreError> {
        self.state
            .read()
            .await
            .deployments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "deployment",
                id: id.to_string(),
            })
    }

    async fn compare_and_set_status(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        next: DeploymentStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let deployment = state
            .deployments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "deployment",
                id: id.to_string(),
            })?;

        if deployment.status != expected {
            return Err(StoreError::Conflict {
                id: id.clone(),
                expected,
                actual: deployment.status,
            });
        }
        deployment.status = next;
        Ok(())
    }

    async fn place(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        node_id: &NodeId,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let deployment = state
            .deployments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "deployment",
                id: id.to_string(),
            })?;

        if deployment.status != expected {
            return Err(StoreError::Conflict {
                id: id.clone(),
                expected,
                actual: deployment.status,
            });
        }
        deployment.node_id = Some(node_id.clone());
        deployment.status = DeploymentStatus::Scheduled;
        Ok(())
    }

    async fn assign_port(&self, id: &DeploymentId, port: u16) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let deployment = state
            .deployments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "deployment",
                id: id.to_string(),
            })?;
        deployment.port = port;
        Ok(())
    }

    async fn used_ports(&self, node_id: &NodeId) -> Result<Vec<u16>, StoreError> {
        let state = self.state.read().await;
        let mut ports: Vec<u16> = state
            .deployments
            .values()
            .filter(|d| d.node_id.as_ref() == Some(node_id))
            .filter(|d| d.port > 0 && d.status != DeploymentStatus::Deleted)
            .map(|d| d.port)
            .collect();
        ports.sort_unstable();
        Ok(ports)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.state.read().await.nodes.clone())
    }

    async fn container_spec(&self, deployment: &Deployment) -> Result<ContainerSpec, StoreError> {
        self.state
            .read()
            .await
            .specs
            .get(&deployment.template_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "template",
                id: deployment.template_id.to_string(),
            })
    }
}
