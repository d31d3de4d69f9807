//! # hoster-model
//!
//! Data model shared by the scheduler, the orchestrator, the node pool and the ingress
//! proxy, plus the deployment lifecycle state machine.
//!
//! Everything here is plain data or a pure function over plain data. Persistence,
//! locking and I/O live in the services.

mod class;
mod deployment;
pub mod lifecycle;
mod node;
mod resources;
mod target;

pub use class::ErrorClass;
pub use deployment::{Deployment, DeploymentStatus, ParseStatusError};
pub use lifecycle::{Transition, TransitionError, Trigger, TRANSITIONS};
pub use node::{CapabilitySet, Capacity, Node, NodeStatus};
pub use resources::Resources;
pub use target::ProxyTarget;
