use hoster_id::DeploymentId;
use hoster_model::{ErrorClass, TransitionError};
use hoster_networking::NetworkError;
use hoster_node_pool::{ClientError, PoolError};
use thiserror::Error;

use super::store::StoreError;
use crate::scheduler::ScheduleError;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("deployment {0} has no node assigned")]
    NotScheduled(DeploymentId),

    #[error("port allocation failed: {0}")]
    Ports(#[from] NetworkError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl OrchestratorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Schedule(e) => e.class(),
            Self::Transition(e) => e.class(),
            Self::Store(StoreError::NotFound { .. }) => ErrorClass::Input,
            Self::Store(StoreError::Conflict { .. }) => ErrorClass::State,
            Self::Store(StoreError::Backend(_)) => ErrorClass::Connectivity,
            Self::NotScheduled(_) => ErrorClass::State,
            Self::Ports(NetworkError::PortsExhausted { .. }) => ErrorClass::Capacity,
            Self::Ports(_) => ErrorClass::Input,
            Self::Pool(e) => e.class(),
            Self::Client(e) => e.class(),
        }
    }
}
