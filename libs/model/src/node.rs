//! Registered compute nodes.

use std::collections::BTreeSet;

use hoster_id::{CustomerId, NodeId};
use serde::{Deserialize, Serialize};

use crate::resources::Resources;

/// Node lifecycle status. Driven externally by health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    Maintenance,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of free-form capability tags (`gpu`, `ssd`, ...).
///
/// Operators define their own tags, so this stays a set of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True if every tag in `other` is present here.
    pub fn is_superset(&self, other: &CapabilitySet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// True if the two sets share at least one tag.
    pub fn intersects(&self, other: &CapabilitySet) -> bool {
        !self.0.is_disjoint(&other.0)
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Total and currently used capacity of a node.
///
/// `used <= total` is advisory only; nodes can be over-committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub total: Resources,
    pub used: Resources,
}

impl Capacity {
    pub fn new(total: Resources, used: Resources) -> Self {
        Self { total, used }
    }

    /// True if `used + request <= total` holds for every dimension.
    pub fn fits(&self, request: &Resources) -> bool {
        self.used.cpu_cores + request.cpu_cores <= self.total.cpu_cores
            && self
                .used
                .memory_mb
                .checked_add(request.memory_mb)
                .is_some_and(|m| m <= self.total.memory_mb)
            && self
                .used
                .disk_mb
                .checked_add(request.disk_mb)
                .is_some_and(|d| d <= self.total.disk_mb)
    }
}

/// A registered compute target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub owner_id: CustomerId,
    pub status: NodeStatus,
    #[serde(default)]
    pub capabilities: CapabilitySet,
    pub capacity: Capacity,
}

impl Node {
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }

    pub fn is_local(&self) -> bool {
        self.id.is_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superset_and_intersects() {
        let node: CapabilitySet = ["gpu", "ssd"].into_iter().collect();
        let req: CapabilitySet = ["gpu"].into_iter().collect();
        let plan: CapabilitySet = ["nvme", "ssd"].into_iter().collect();
        let other: CapabilitySet = ["arm"].into_iter().collect();

        assert!(node.is_superset(&req));
        assert!(!req.is_superset(&node));
        assert!(node.intersects(&plan));
        assert!(!node.intersects(&other));
        assert!(node.is_superset(&CapabilitySet::new()));
    }

    #[test]
    fn test_capacity_fits_boundary() {
        let cap = Capacity::new(Resources::new(4.0, 8192, 100_000), Resources::new(3.0, 4096, 0));
        assert!(cap.fits(&Resources::new(1.0, 4096, 100_000)));
        assert!(!cap.fits(&Resources::new(1.5, 0, 0)));
        assert!(!cap.fits(&Resources::new(0.0, 4097, 0)));
    }

    #[test]
    fn test_overcommitted_never_fits() {
        let cap = Capacity::new(Resources::new(2.0, 1024, 10), Resources::new(3.0, 2048, 20));
        assert!(!cap.fits(&Resources::default()));
    }

    #[test]
    fn test_node_json_shape() {
        let json = r#"{
            "id": "node_a",
            "owner_id": "cus_1",
            "status": "maintenance",
            "capabilities": ["gpu"],
            "capacity": {
                "total": {"cpu_cores": 8.0, "memory_mb": 16384, "disk_mb": 200000},
                "used": {"cpu_cores": 1.5, "memory_mb": 2048, "disk_mb": 1000}
            }
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.status, NodeStatus::Maintenance);
        assert!(node.capabilities.contains("gpu"));
        assert!(!node.is_online());
    }
}
