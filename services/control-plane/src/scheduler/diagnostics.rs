//! Filter exclusion accounting and the errors derived from it.

use std::collections::BTreeMap;

use hoster_model::ErrorClass;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a node was dropped by the filter pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    NotOnline,
    MissingCapability,
    PlanForbidden,
    InsufficientCapacity,
}

impl ExclusionReason {
    pub const ALL: [ExclusionReason; 4] = [
        Self::NotOnline,
        Self::MissingCapability,
        Self::PlanForbidden,
        Self::InsufficientCapacity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotOnline => "not_online",
            Self::MissingCapability => "missing_capability",
            Self::PlanForbidden => "plan_forbidden",
            Self::InsufficientCapacity => "insufficient_capacity",
        }
    }
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage exclusion counts for one scheduling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Nodes considered.
    pub candidates: usize,
    /// Nodes dropped, by the first stage that rejected them.
    pub excluded: BTreeMap<ExclusionReason, usize>,
}

impl Diagnostics {
    pub(crate) fn new(candidates: usize) -> Self {
        Self {
            candidates,
            excluded: BTreeMap::new(),
        }
    }

    pub(crate) fn exclude(&mut self, reason: ExclusionReason) {
        *self.excluded.entry(reason).or_insert(0) += 1;
    }

    pub fn count(&self, reason: ExclusionReason) -> usize {
        self.excluded.get(&reason).copied().unwrap_or(0)
    }

    /// Nodes that passed every filter.
    pub fn survivors(&self) -> usize {
        self.candidates
            .saturating_sub(self.excluded.values().sum::<usize>())
    }

    /// The most actionable error for a pass in which nothing survived.
    pub(crate) fn into_error(self) -> ScheduleError {
        let forbidden = self.count(ExclusionReason::PlanForbidden);
        let missing = self.count(ExclusionReason::MissingCapability);
        let capacity = self.count(ExclusionReason::InsufficientCapacity);

        if forbidden > 0 && missing == 0 {
            ScheduleError::PlanForbidsCapability(self)
        } else if missing > 0 {
            ScheduleError::NoCapableNodes(self)
        } else if capacity > 0 {
            ScheduleError::InsufficientCapacity(self)
        } else {
            ScheduleError::NoNodesAvailable(self)
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} candidates", self.candidates)?;
        for (reason, count) in &self.excluded {
            write!(f, ", {reason}={count}")?;
        }
        Ok(())
    }
}

/// No node can take the deployment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("no nodes available ({0})")]
    NoNodesAvailable(Diagnostics),

    #[error("no node offers the required capabilities ({0})")]
    NoCapableNodes(Diagnostics),

    #[error("plan does not allow any capability offered by eligible nodes ({0})")]
    PlanForbidsCapability(Diagnostics),

    #[error("insufficient capacity on every eligible node ({0})")]
    InsufficientCapacity(Diagnostics),
}

impl ScheduleError {
    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            Self::NoNodesAvailable(d)
            | Self::NoCapableNodes(d)
            | Self::PlanForbidsCapability(d)
            | Self::InsufficientCapacity(d) => d,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoNodesAvailable(_) => "no_nodes_available",
            Self::NoCapableNodes(_) => "no_capable_nodes",
            Self::PlanForbidsCapability(_) => "plan_forbids_capability",
            Self::InsufficientCapacity(_) => "insufficient_capacity",
        }
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::Capacity
    }
}
