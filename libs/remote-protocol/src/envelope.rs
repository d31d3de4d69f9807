//! JSON response envelope and error codes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error codes reported by the helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    ConnectionFailed,
    NotFound,
    AlreadyExists,
    AlreadyRunning,
    NotRunning,
    PortConflict,
    InUse,
    PullFailed,
    Internal,
    /// A code this build does not know about.
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::ConnectionFailed => "connection_failed",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::PortConflict => "port_conflict",
            Self::InUse => "in_use",
            Self::PullFailed => "pull_failed",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }

    /// Transient failures an orchestrator may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed | Self::PullFailed)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the helper.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{command} failed ({code}): {message}")]
pub struct RemoteError {
    pub command: String,
    pub code: ErrorCode,
    pub message: String,
}

/// The single object the helper writes to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            command: None,
            error_code: None,
            message: None,
        }
    }

    pub fn failure(command: &str, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            command: Some(command.to_string()),
            error_code: Some(code),
            message: Some(message.into()),
        }
    }

    /// Split into the success payload or the reported error.
    ///
    /// A failure envelope missing its fields is reported as `internal`.
    pub fn into_result(self, command: &str) -> Result<Value, RemoteError> {
        if self.success {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        Err(RemoteError {
            command: self.command.unwrap_or_else(|| command.to_string()),
            code: self.error_code.unwrap_or(ErrorCode::Internal),
            message: self.message.unwrap_or_default(),
        })
    }

    /// Decode the payload of a successful envelope into `T`.
    pub fn decode<T: DeserializeOwned>(self, command: &str) -> Result<T, RemoteError> {
        let data = self.into_result(command)?;
        serde_json::from_value(data).map_err(|e| RemoteError {
            command: command.to_string(),
            code: ErrorCode::Internal,
            message: format!("unexpected response payload: {e}"),
        })
    }
}
