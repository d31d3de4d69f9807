//! Networking utilities for the platform.
//!
//! This library provides helpers for:
//! - Host port allocation for deployments
//! - Mapping ingress hostnames to deployment slugs

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Port range exhausted.
    #[error("no free port in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    /// Range with start after end, or starting at 0.
    #[error("invalid port range: {start}-{end}")]
    InvalidRange { start: u16, end: u16 },

    /// Invalid base domain.
    #[error("invalid base domain: {0:?}")]
    InvalidDomain(String),
}

// ============================================================================
// Port Allocation
// ============================================================================

/// Default first host port handed to deployments.
pub const DEFAULT_PORT_RANGE_START: u16 = 30000;

/// Default last host port handed to deployments.
pub const DEFAULT_PORT_RANGE_END: u16 = 32767;

/// Inclusive host port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Create a new range; `start` must be non-zero and not after `end`.
    pub fn new(start: u16, end: u16) -> Result<Self, NetworkError> {
        if start == 0 || start > end {
            return Err(NetworkError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Number of ports in the range.
    pub fn size(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_RANGE_START,
            end: DEFAULT_PORT_RANGE_END,
        }
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Return the lowest port in `range` not present in `used` (first-fit).
///
/// `used` may be in any order and may contain ports outside the range. The result is
/// only a candidate: nothing is reserved, so callers must hold a lock across
/// "read used ports -> allocate -> persist" or two allocations can race onto one port.
pub fn allocate_port(used: &[u16], range: PortRange) -> Result<u16, NetworkError> {
    let taken: BTreeSet<u16> = used
        .iter()
        .copied()
        .filter(|p| range.contains(*p))
        .collect();

    (range.start..=range.end)
        .find(|p| !taken.contains(p))
        .ok_or(NetworkError::PortsExhausted {
            start: range.start,
            end: range.end,
        })
}

// ============================================================================
// Ingress Hostnames
// ============================================================================

/// Maps `Host` header values to deployment slugs under a base domain.
///
/// `my-blog.apps.hoster.io:8080` with base `apps.hoster.io` yields slug `my-blog`;
/// nested subdomains keep their dots (`v1.api.my-blog`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnameParser {
    base_domain: String,
}

impl HostnameParser {
    pub fn new(base_domain: &str) -> Result<Self, NetworkError> {
        let normalized = normalize_hostname(base_domain);
        if normalized.is_empty() || normalized.starts_with('.') {
            return Err(NetworkError::InvalidDomain(base_domain.to_string()));
        }
        Ok(Self {
            base_domain: normalized,
        })
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Extract the slug, or `None` for an empty host, a bare base-domain hit, or any
    /// host outside the base domain.
    pub fn parse(&self, host: &str) -> Option<String> {
        let host = strip_port(host);
        if host.is_empty() {
            return None;
        }
        let host = normalize_hostname(host);

        let slug = host.strip_suffix(self.base_domain.as_str())?.strip_suffix('.')?;
        if slug.is_empty() {
            return None;
        }
        Some(slug.to_string())
    }
}

/// Strip a trailing `:port`, only when everything after the last colon is digits.
pub fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

/// Normalize a hostname for matching.
///
/// - Convert to lowercase
/// - Trim trailing dot
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().to_lowercase().trim_end_matches('.').to_string()
}
