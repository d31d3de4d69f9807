//! Pool and client errors.

use std::time::Duration;

use hoster_id::NodeId;
use hoster_model::ErrorClass;
use hoster_remote_protocol::RemoteError;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::key::KeyError;

/// Failure to obtain a client for a node.
///
/// Every variant means "node unavailable right now"; none of them affect other nodes.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("node {node_id} is unreachable: {message}")]
    Connectivity { node_id: NodeId, message: String },

    #[error("no usable credentials for node {node_id}: {source}")]
    Credentials {
        node_id: NodeId,
        #[source]
        source: CredentialError,
    },

    #[error("private key for node {node_id} could not be recovered: {source}")]
    Key {
        node_id: NodeId,
        #[source]
        source: KeyError,
    },

    #[error("dial to node {node_id} timed out after {timeout:?}")]
    Timeout { node_id: NodeId, timeout: Duration },

    #[error("node {0} was removed from the pool")]
    NodeRemoved(NodeId),
}

impl PoolError {
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::Connectivity { node_id, .. }
            | Self::Credentials { node_id, .. }
            | Self::Key { node_id, .. }
            | Self::Timeout { node_id, .. } => node_id,
            Self::NodeRemoved(node_id) => node_id,
        }
    }

    pub fn class(&self) -> ErrorClass {
        ErrorClass::Connectivity
    }
}

/// Failure of a runtime client call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("transport failure running {command}: {source}")]
    Transport {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{command}: unreadable helper output (exit status {exit_code:?}): {message}")]
    Protocol {
        command: String,
        exit_code: Option<i32>,
        message: String,
    },
}

impl ClientError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Pool(_) | Self::Transport { .. } => ErrorClass::Connectivity,
            Self::Remote(_) | Self::Protocol { .. } => ErrorClass::Remote,
        }
    }

    /// Whether retrying the call (after invalidating the node) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Pool(_) | Self::Transport { .. } => true,
            Self::Remote(e) => e.code.is_retryable(),
            Self::Protocol { .. } => false,
        }
    }
}
