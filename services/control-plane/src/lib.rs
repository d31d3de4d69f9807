//! hoster control plane library.
//!
//! Placement of deployments onto nodes and orchestration of their lifecycle. Storage
//! of resources and the public API live elsewhere; this crate reaches them through the
//! [`orchestrator::DeploymentStore`] seam.

pub mod config;
pub mod orchestrator;
pub mod scheduler;

pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use scheduler::{rank, schedule, Placement, ScheduleError, ScheduleRequest};
