//! Routing projection of a deployment.

use std::net::{Ipv4Addr, SocketAddr};

use hoster_id::{CustomerId, DeploymentId, NodeId};
use serde::{Deserialize, Serialize};

use crate::deployment::DeploymentStatus;

/// Read-optimised view of a deployment for the ingress proxy.
///
/// Always recomputed from the deployment record; never a source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    pub deployment_id: DeploymentId,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub port: u16,
    pub status: DeploymentStatus,
    pub customer_id: CustomerId,
}

impl ProxyTarget {
    /// Only running targets with an assigned port receive traffic.
    pub fn can_route(&self) -> bool {
        self.status == DeploymentStatus::Running && self.port > 0
    }

    /// True when there is no node or the node is the local sentinel.
    pub fn is_local(&self) -> bool {
        self.node_id.as_ref().is_none_or(NodeId::is_local)
    }

    /// Loopback address for local targets.
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}
