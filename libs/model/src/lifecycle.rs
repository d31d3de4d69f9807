//! Deployment lifecycle state machine.
//!
//! [`TRANSITIONS`] is the single source of truth for legal moves. Validation is a pure
//! predicate: callers persisting the new status must do the read-check-write atomically
//! (compare-and-set on the stored status). Side effects such as provisioning or cleanup
//! are performed by whoever observes the transition, never here.
//!
//! ```text
//! pending -> scheduled -> starting -> running -> stopping -> stopped
//!                           |  ^        |                     |   |
//!                           v  |        v                     |   |
//!                          failed <-----+      starting <-----+   |
//!                           |                                     v
//!                           +------------------------------> deleting -> deleted
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::deployment::DeploymentStatus;

/// What causes a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    NodeAssigned,
    ProvisioningBegins,
    ContainersHealthy,
    StartFailed,
    UserStop,
    RuntimeFailure,
    ContainersStopped,
    Restart,
    Delete,
    Retry,
    CleanupComplete,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeAssigned => "node_assigned",
            Self::ProvisioningBegins => "provisioning_begins",
            Self::ContainersHealthy => "containers_healthy",
            Self::StartFailed => "start_failed",
            Self::UserStop => "user_stop",
            Self::RuntimeFailure => "runtime_failure",
            Self::ContainersStopped => "containers_stopped",
            Self::Restart => "restart",
            Self::Delete => "delete",
            Self::Retry => "retry",
            Self::CleanupComplete => "cleanup_complete",
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: DeploymentStatus,
    pub to: DeploymentStatus,
    pub trigger: Trigger,
}

const fn row(from: DeploymentStatus, to: DeploymentStatus, trigger: Trigger) -> Transition {
    Transition { from, to, trigger }
}

/// Every legal transition. Anything not listed is rejected.
pub const TRANSITIONS: &[Transition] = {
    use DeploymentStatus::*;
    &[
        row(Pending, Scheduled, Trigger::NodeAssigned),
        row(Scheduled, Starting, Trigger::ProvisioningBegins),
        row(Starting, Running, Trigger::ContainersHealthy),
        row(Starting, Failed, Trigger::StartFailed),
        row(Running, Stopping, Trigger::UserStop),
        row(Running, Failed, Trigger::RuntimeFailure),
        row(Stopping, Stopped, Trigger::ContainersStopped),
        row(Stopped, Starting, Trigger::Restart),
        row(Stopped, Deleting, Trigger::Delete),
        row(Failed, Starting, Trigger::Retry),
        row(Failed, Deleting, Trigger::Delete),
        row(Deleting, Deleted, Trigger::CleanupComplete),
    ]
};

/// Rejected transition.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal deployment transition: {from} -> {to}")]
    Illegal {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },
}

impl TransitionError {
    pub fn class(&self) -> crate::ErrorClass {
        crate::ErrorClass::State
    }
}

/// Look up the table row for `from -> to`.
pub fn find(from: DeploymentStatus, to: DeploymentStatus) -> Option<&'static Transition> {
    TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

/// Validate `from -> to` against the table.
pub fn validate(from: DeploymentStatus, to: DeploymentStatus) -> Result<Trigger, TransitionError> {
    find(from, to)
        .map(|t| t.trigger)
        .ok_or(TransitionError::Illegal { from, to })
}

/// Every status reachable from `from` in one step, in table order.
pub fn allowed_transitions(from: DeploymentStatus) -> Vec<DeploymentStatus> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == from)
        .map(|t| t.to)
        .collect()
}
