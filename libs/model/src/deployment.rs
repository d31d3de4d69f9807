//! Deployments: one customer's instance of a template on a node.

use hoster_id::{CustomerId, DeploymentId, NodeId, TemplateId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::{self, TransitionError};
use crate::node::CapabilitySet;
use crate::resources::Resources;

/// Deployment lifecycle status. See [`crate::lifecycle`] for the legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Scheduled,
    Starting,
    Running,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
    Failed,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 9] = [
        Self::Pending,
        Self::Scheduled,
        Self::Starting,
        Self::Running,
        Self::Stopping,
        Self::Stopped,
        Self::Deleting,
        Self::Deleted,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
        }
    }

    /// True for states with no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        lifecycle::allowed_transitions(*self).is_empty()
    }

    /// Only running deployments receive traffic.
    pub fn is_routable(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn can_transition_to(&self, to: DeploymentStatus) -> bool {
        lifecycle::validate(*self, to).is_ok()
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown deployment status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for DeploymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// A running or pending application instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub customer_id: CustomerId,
    pub template_id: TemplateId,
    /// Assigned node, `None` until scheduled.
    #[serde(default)]
    pub node_id: Option<NodeId>,
    /// Assigned host port, 0 until started.
    #[serde(default)]
    pub port: u16,
    pub status: DeploymentStatus,
    pub resources: Resources,
    /// Template-mandated capabilities; the node must have all of them.
    #[serde(default)]
    pub required_capabilities: CapabilitySet,
    /// Plan entitlement; the node must share at least one tag. Empty means unrestricted.
    #[serde(default)]
    pub allowed_capabilities: CapabilitySet,
}

impl Deployment {
    /// A fresh pending deployment.
    pub fn new(
        customer_id: CustomerId,
        template_id: TemplateId,
        resources: Resources,
    ) -> Self {
        Self {
            id: DeploymentId::new(),
            customer_id,
            template_id,
            node_id: None,
            port: 0,
            status: DeploymentStatus::Pending,
            resources,
            required_capabilities: CapabilitySet::new(),
            allowed_capabilities: CapabilitySet::new(),
        }
    }

    /// Move to `to` if the lifecycle table allows it. Only the status field changes.
    ///
    /// Returns the previous status.
    pub fn transition(&mut self, to: DeploymentStatus) -> Result<DeploymentStatus, TransitionError> {
        lifecycle::validate(self.status, to)?;
        let previous = self.status;
        self.status = to;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> Deployment {
        Deployment::new(
            CustomerId::new(),
            TemplateId::new(),
            Resources::new(0.5, 512, 1024),
        )
    }

    #[test]
    fn test_status_roundtrip() {
        for status in DeploymentStatus::ALL {
            assert_eq!(status.as_str().parse::<DeploymentStatus>().unwrap(), status);
        }
        assert!("paused".parse::<DeploymentStatus>().is_err());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&DeploymentStatus::Deleting).unwrap();
        assert_eq!(json, "\"deleting\"");
    }

    #[test]
    fn test_transition_only_touches_status() {
        let mut d = deployment();
        let before = d.clone();
        let previous = d.transition(DeploymentStatus::Scheduled).unwrap();
        assert_eq!(previous, DeploymentStatus::Pending);
        assert_eq!(d.status, DeploymentStatus::Scheduled);
        assert_eq!(d.node_id, before.node_id);
        assert_eq!(d.port, before.port);
    }

    #[test]
    fn test_illegal_transition_leaves_status() {
        let mut d = deployment();
        let err = d.transition(DeploymentStatus::Running).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: DeploymentStatus::Pending,
                to: DeploymentStatus::Running
            }
        );
        assert_eq!(d.status, DeploymentStatus::Pending);
    }

    #[test]
    fn test_terminal_and_routable() {
        assert!(DeploymentStatus::Deleted.is_terminal());
        assert!(!DeploymentStatus::Failed.is_terminal());
        assert!(DeploymentStatus::Running.is_routable());
        assert!(!DeploymentStatus::Starting.is_routable());
    }
}
