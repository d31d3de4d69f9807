use serde::{Deserialize, Serialize};

/// Coarse error category used by callers to decide between retrying and surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed or disallowed request. Never retried.
    Input,
    /// No room on any eligible node, or no free port.
    Capacity,
    /// Tunnel, credential or dial failure. Retry after invalidating the cached connection.
    Connectivity,
    /// The entity is in the wrong lifecycle state for the operation.
    State,
    /// The node's runtime reported a failure.
    Remote,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Capacity => "capacity",
            Self::Connectivity => "connectivity",
            Self::State => "state",
            Self::Remote => "remote",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
