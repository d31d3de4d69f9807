//! Failures reported back to the HTTP client.

use hoster_model::{DeploymentStatus, ErrorClass};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("no deployment serves {host}")]
    NotFound { host: String },

    #[error("deployment {slug} is {status}")]
    Stopped {
        slug: String,
        status: DeploymentStatus,
    },

    #[error("deployment {slug} is unavailable: {reason}")]
    Unavailable { slug: String, reason: String },

    #[error("malformed request: {0}")]
    BadRequest(String),
}

impl ProxyError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Stopped { .. } | Self::Unavailable { .. } => 503,
            Self::BadRequest(_) => 400,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } | Self::BadRequest(_) => ErrorClass::Input,
            Self::Stopped { .. } => ErrorClass::State,
            Self::Unavailable { .. } => ErrorClass::Connectivity,
        }
    }

    fn reason_phrase(&self) -> &'static str {
        match self.status_code() {
            404 => "Not Found",
            503 => "Service Unavailable",
            _ => "Bad Request",
        }
    }

    /// Complete HTTP/1.1 response; the connection is closed after writing it.
    pub fn to_response(&self) -> Vec<u8> {
        let body = format!("{self}\n");
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status_code(),
            self.reason_phrase(),
            body.len(),
            body
        )
        .into_bytes()
    }
}
