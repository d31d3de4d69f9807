//! Resource requests.

use serde::{Deserialize, Serialize};

/// A resource request, used both as a requirement and as a usage delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// CPU cores (fractional).
    pub cpu_cores: f64,
    /// Memory in MB.
    pub memory_mb: u64,
    /// Disk in MB.
    pub disk_mb: u64,
}

impl Resources {
    pub const fn new(cpu_cores: f64, memory_mb: u64, disk_mb: u64) -> Self {
        Self {
            cpu_cores,
            memory_mb,
            disk_mb,
        }
    }
}
