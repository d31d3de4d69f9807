//! Node placement.
//!
//! Placement is a pure function of a node snapshot and a request. Nodes pass through an
//! ordered filter pipeline:
//!
//! 1. status is online
//! 2. capabilities are a superset of the required set (if any)
//! 3. capabilities share at least one tag with the plan's allowed set (if any)
//! 4. `used + requested <= total` for cpu, memory and disk
//!
//! Survivors are scored with [`score`] and the highest wins. Ties keep input order.
//! When nothing survives, the exclusion counts pick the most specific error.

mod diagnostics;
mod score;

pub use diagnostics::{Diagnostics, ExclusionReason, ScheduleError};
pub use score::{score, CPU_WEIGHT, DISK_WEIGHT, MEMORY_WEIGHT};

use hoster_id::NodeId;
use hoster_model::{CapabilitySet, Deployment, Node, Resources};
use serde::{Deserialize, Serialize};

/// What a deployment needs from a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub resources: Resources,
    /// Capabilities the node must all have.
    #[serde(default)]
    pub required: CapabilitySet,
    /// Plan entitlement; the node must have at least one. Empty means unrestricted.
    #[serde(default)]
    pub allowed: CapabilitySet,
}

impl ScheduleRequest {
    pub fn new(resources: Resources) -> Self {
        Self {
            resources,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_required(mut self, required: CapabilitySet) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn with_allowed(mut self, allowed: CapabilitySet) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn for_deployment(deployment: &Deployment) -> Self {
        Self {
            resources: deployment.resources,
            required: deployment.required_capabilities.clone(),
            allowed: deployment.allowed_capabilities.clone(),
        }
    }
}

/// A node that survived filtering, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub node_id: NodeId,
    pub score: f64,
}

/// Every survivor, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub candidates: Vec<Candidate>,
    pub diagnostics: Diagnostics,
}

/// The chosen node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub node_id: NodeId,
    pub score: f64,
    pub diagnostics: Diagnostics,
}

/// First filter stage that rejects `node`, if any.
fn exclusion(node: &Node, request: &ScheduleRequest) -> Option<ExclusionReason> {
    if !node.is_online() {
        return Some(ExclusionReason::NotOnline);
    }
    if !request.required.is_empty() && !node.capabilities.is_superset(&request.required) {
        return Some(ExclusionReason::MissingCapability);
    }
    if !request.allowed.is_empty() && !node.capabilities.intersects(&request.allowed) {
        return Some(ExclusionReason::PlanForbidden);
    }
    if !node.capacity.fits(&request.resources) {
        return Some(ExclusionReason::InsufficientCapacity);
    }
    None
}

/// Filter and score every node. Survivors are ordered best first; equal scores keep
/// their input order.
pub fn rank(nodes: &[Node], request: &ScheduleRequest) -> Ranking {
    let mut diagnostics = Diagnostics::new(nodes.len());
    let mut candidates = Vec::with_capacity(nodes.len());

    for node in nodes {
        match exclusion(node, request) {
            Some(reason) => diagnostics.exclude(reason),
            None => candidates.push(Candidate {
                node_id: node.id.clone(),
                score: score(&node.capacity, &request.resources),
            }),
        }
    }

    // `sort_by` is stable.
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    Ranking {
        candidates,
        diagnostics,
    }
}

/// Pick the best node for `request`.
pub fn schedule(nodes: &[Node], request: &ScheduleRequest) -> Result<Placement, ScheduleError> {
    let Ranking {
        candidates,
        diagnostics,
    } = rank(nodes, request);

    match candidates.into_iter().next() {
        Some(best) => Ok(Placement {
            node_id: best.node_id,
            score: best.score,
            diagnostics,
        }),
        None => Err(diagnostics.into_error()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoster_id::CustomerId;
    use hoster_model::{Capacity, NodeStatus};
    use proptest::prelude::*;

    fn caps(tags: &[&str]) -> CapabilitySet {
        tags.iter().copied().collect()
    }

    fn node(id: &str, status: NodeStatus, tags: &[&str], total: Resources, used: Resources) -> Node {
        Node {
            id: NodeId::parse(id).unwrap(),
            owner_id: CustomerId::parse("cus_owner").unwrap(),
            status,
            capabilities: caps(tags),
            capacity: Capacity::new(total, used),
        }
    }

    fn big() -> Resources {
        Resources::new(8.0, 16_384, 200_000)
    }

    fn online(id: &str, tags: &[&str], used: Resources) -> Node {
        node(id, NodeStatus::Online, tags, big(), used)
    }

    fn small_request() -> ScheduleRequest {
        ScheduleRequest::new(Resources::new(1.0, 1024, 10_000))
    }

    #[test]
    fn test_picks_least_loaded() {
        let nodes = vec![
            online("node_busy", &[], Resources::new(6.0, 12_000, 150_000)),
            online("node_idle", &[], Resources::default()),
            online("node_half", &[], Resources::new(4.0, 8192, 100_000)),
        ];
        let placement = schedule(&nodes, &small_request()).unwrap();
        assert_eq!(placement.node_id.as_str(), "node_idle");
        assert!(placement.score > 0.0 && placement.score <= 100.0);
        assert_eq!(placement.diagnostics.survivors(), 3);
    }

    #[test]
    fn test_tie_keeps_input_order() {
        let nodes = vec![
            online("node_first", &[], Resources::default()),
            online("node_second", &[], Resources::default()),
        ];
        let placement = schedule(&nodes, &small_request()).unwrap();
        assert_eq!(placement.node_id.as_str(), "node_first");

        let ranking = rank(&nodes, &small_request());
        let order: Vec<_> = ranking.candidates.iter().map(|c| c.node_id.as_str()).collect();
        assert_eq!(order, ["node_first", "node_second"]);
    }

    #[test]
    fn test_offline_and_maintenance_excluded() {
        let nodes = vec![
            node("node_off", NodeStatus::Offline, &[], big(), Resources::default()),
            node("node_maint", NodeStatus::Maintenance, &[], big(), Resources::default()),
        ];
        let err = schedule(&nodes, &small_request()).unwrap_err();
        assert!(matches!(err, ScheduleError::NoNodesAvailable(_)));
        assert_eq!(err.diagnostics().count(ExclusionReason::NotOnline), 2);
    }

    #[test]
    fn test_empty_fleet() {
        let err = schedule(&[], &small_request()).unwrap_err();
        assert!(matches!(err, ScheduleError::NoNodesAvailable(ref d) if d.candidates == 0));
    }

    #[test]
    fn test_required_capabilities() {
        let nodes = vec![
            online("node_cpu", &["ssd"], Resources::default()),
            online("node_gpu", &["gpu", "ssd"], Resources::new(6.0, 12_000, 150_000)),
        ];
        let req = small_request().with_required(caps(&["gpu"]));
        let placement = schedule(&nodes, &req).unwrap();
        assert_eq!(placement.node_id.as_str(), "node_gpu");
        assert_eq!(placement.diagnostics.count(ExclusionReason::MissingCapability), 1);

        let req = small_request().with_required(caps(&["gpu", "arm"]));
        let err = schedule(&nodes, &req).unwrap_err();
        assert!(matches!(err, ScheduleError::NoCapableNodes(_)));
    }

    #[test]
    fn test_plan_forbids_capability() {
        let nodes = vec![online("node_a", &["gpu"], Resources::default())];
        let req = small_request().with_allowed(caps(&["standard"]));
        let err = schedule(&nodes, &req).unwrap_err();
        assert!(matches!(err, ScheduleError::PlanForbidsCapability(_)));
    }

    #[test]
    fn test_allowed_set_needs_one_shared_tag() {
        let nodes = vec![online("node_a", &["gpu", "standard"], Resources::default())];
        let req = small_request().with_allowed(caps(&["standard", "premium"]));
        assert!(schedule(&nodes, &req).is_ok());
    }

    #[test]
    fn test_insufficient_capacity() {
        let nodes = vec![
            online("node_full", &[], Resources::new(7.5, 1000, 1000)),
            node("node_off", NodeStatus::Offline, &[], big(), Resources::default()),
        ];
        let err = schedule(&nodes, &small_request()).unwrap_err();
        assert!(matches!(err, ScheduleError::InsufficientCapacity(_)));
        assert_eq!(err.diagnostics().count(ExclusionReason::InsufficientCapacity), 1);
        assert_eq!(err.diagnostics().count(ExclusionReason::NotOnline), 1);
    }

    #[test]
    fn test_exact_fit_is_allowed() {
        let nodes = vec![online("node_a", &[], Resources::new(7.0, 15_360, 190_000))];
        let placement = schedule(&nodes, &small_request()).unwrap();
        assert_eq!(placement.score, 0.0);
    }

    #[test]
    fn test_overcommitted_node_excluded() {
        let nodes = vec![node(
            "node_over",
            NodeStatus::Online,
            &[],
            Resources::new(1.0, 100, 100),
            Resources::new(2.0, 200, 200),
        )];
        let err = schedule(&nodes, &ScheduleRequest::new(Resources::default())).unwrap_err();
        assert!(matches!(err, ScheduleError::InsufficientCapacity(_)));
    }

    #[test]
    fn test_zero_request_fits_full_node() {
        let nodes = vec![online("node_full", &[], big())];
        assert!(schedule(&nodes, &ScheduleRequest::new(Resources::default())).is_ok());
    }

    fn arb_node(index: usize) -> impl Strategy<Value = Node> {
        (
            prop_oneof![
                Just(NodeStatus::Online),
                Just(NodeStatus::Offline),
                Just(NodeStatus::Maintenance)
            ],
            0.0f64..8.0,
            0u64..16_384,
            0u64..200_000,
            proptest::bool::ANY,
        )
            .prop_map(move |(status, cpu, mem, disk, gpu)| {
                let tags: &[&str] = if gpu { &["gpu"] } else { &[] };
                node(
                    &format!("node_{index}"),
                    status,
                    tags,
                    big(),
                    Resources::new(cpu, mem, disk),
                )
            })
    }

    fn arb_fleet() -> impl Strategy<Value = Vec<Node>> {
        (0usize..8).prop_flat_map(|n| (0..n).map(arb_node).collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn prop_placement_satisfies_every_filter(nodes in arb_fleet(), need_gpu in proptest::bool::ANY) {
            let mut req = small_request();
            if need_gpu {
                req = req.with_required(caps(&["gpu"]));
            }
            match schedule(&nodes, &req) {
                Ok(p) => {
                    let chosen = nodes.iter().find(|n| n.id == p.node_id).unwrap();
                    prop_assert!(chosen.is_online());
                    prop_assert!(chosen.capacity.fits(&req.resources));
                    prop_assert!(chosen.capabilities.is_superset(&req.required));
                    prop_assert!((0.0..=100.0).contains(&p.score));
                    // Nothing scores higher than the winner.
                    for c in rank(&nodes, &req).candidates {
                        prop_assert!(c.score <= p.score);
                    }
                }
                Err(e) => {
                    prop_assert!(rank(&nodes, &req).candidates.is_empty());
                    prop_assert_eq!(e.diagnostics().candidates, nodes.len());
                    prop_assert_eq!(e.diagnostics().survivors(), 0);
                }
            }
        }

        #[test]
        fn prop_single_survivor_is_selected(pos in 0usize..5, n in 1usize..6) {
            let pos = pos % n;
            let nodes: Vec<Node> = (0..n)
                .map(|i| {
                    let status = if i == pos { NodeStatus::Online } else { NodeStatus::Offline };
                    node(&format!("node_{i}"), status, &[], big(), Resources::default())
                })
                .collect();
            let placement = schedule(&nodes, &small_request()).unwrap();
            prop_assert_eq!(placement.node_id.as_str(), format!("node_{pos}"));
        }
    }
}
