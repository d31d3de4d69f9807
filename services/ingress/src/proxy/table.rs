//! Slug -> target lookup table.
//!
//! Readers load an immutable snapshot; writers build a new map and swap it in, so a
//! connection never observes a half-applied sync.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use hoster_model::ProxyTarget;
use hoster_networking::normalize_hostname;
use tracing::{debug, info};

pub type TargetMap = BTreeMap<String, ProxyTarget>;

/// Routing table keyed by deployment slug.
pub struct TargetTable {
    snapshot: ArcSwap<TargetMap>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(TargetMap::new()),
        }
    }

    pub fn from_targets(targets: TargetMap) -> Self {
        let table = Self::new();
        table.replace(targets);
        table
    }

    /// Replace every entry in a single swap.
    pub fn replace(&self, targets: TargetMap) {
        let normalized: TargetMap = targets
            .into_iter()
            .map(|(slug, target)| (normalize_hostname(&slug), target))
            .collect();
        let count = normalized.len();
        self.snapshot.store(Arc::new(normalized));
        info!(target_count = count, "Target table replaced");
    }

    pub fn upsert(&self, slug: &str, target: ProxyTarget) {
        let slug = normalize_hostname(slug);
        self.snapshot.rcu(|current| {
            let mut next = TargetMap::clone(current);
            next.insert(slug.clone(), target.clone());
            next
        });
        debug!(slug = %slug, "Target upserted");
    }

    pub fn remove(&self, slug: &str) -> bool {
        let slug = normalize_hostname(slug);
        if !self.snapshot.load().contains_key(&slug) {
            return false;
        }
        self.snapshot.rcu(|current| {
            let mut next = TargetMap::clone(current);
            next.remove(&slug);
            next
        });
        debug!(slug = %slug, "Target removed");
        true
    }

    pub fn resolve(&self, slug: &str) -> Option<ProxyTarget> {
        self.snapshot.load().get(slug).cloned()
    }

    /// Current snapshot, for persistence and change detection.
    pub fn snapshot(&self) -> Arc<TargetMap> {
        self.snapshot.load_full()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}

impl Default for TargetTable {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedTargetTable = Arc<TargetTable>;

#[cfg(test)]
mod tests {
    use super::*;
    use hoster_id::{CustomerId, DeploymentId};
    use hoster_model::DeploymentStatus;

    fn target(port: u16) -> ProxyTarget {
        ProxyTarget {
            deployment_id: DeploymentId::new(),
            node_id: None,
            port,
            status: DeploymentStatus::Running,
            customer_id: CustomerId::new(),
        }
    }

    #[test]
    fn test_replace_and_resolve() {
        let table = TargetTable::new();
        assert!(table.is_empty());

        let mut targets = TargetMap::new();
        targets.insert("My-Blog".to_string(), target(30001));
        targets.insert("api.shop".to_string(), target(30002));
        table.replace(targets);

        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("my-blog").unwrap().port, 30001);
        assert_eq!(table.resolve("api.shop").unwrap().port, 30002);
        assert!(table.resolve("missing").is_none());
    }

    #[test]
    fn test_replace_drops_old_entries() {
        let table = TargetTable::new();
        table.upsert("old", target(30001));
        table.replace(TargetMap::from([("new".to_string(), target(30002))]));
        assert!(table.resolve("old").is_none());
        assert!(table.resolve("new").is_some());
    }

    #[test]
    fn test_upsert_and_remove() {
        let table = TargetTable::new();
        table.upsert("blog", target(30001));
        table.upsert("blog", target(30005));
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("blog").unwrap().port, 30005);

        assert!(table.remove("BLOG"));
        assert!(!table.remove("blog"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_snapshot_is_stable_across_swaps() {
        let table = TargetTable::new();
        table.upsert("blog", target(30001));
        let before = table.snapshot();
        table.replace(TargetMap::new());
        assert_eq!(before.len(), 1);
        assert!(table.is_empty());
    }
}
