//! Last-known target table on disk.
//!
//! The proxy keeps serving the last applied table through control-plane outages, and
//! loads it at startup before the first sync completes. Writes go to a temp file that is
//! renamed over the old one, so a crash never leaves a torn file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::proxy::TargetMap;

/// Persisted file format version.
const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    /// Targets by slug.
    pub targets: TargetMap,
}

impl PersistedState {
    pub fn new(targets: TargetMap) -> Self {
        Self {
            version: STATE_VERSION,
            targets,
        }
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::new(TargetMap::new())
    }
}

pub struct StatePersistence {
    state_path: PathBuf,
}

impl StatePersistence {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }

    /// Load the saved table.
    ///
    /// A missing file or a file from another format version yields an empty state; an
    /// unreadable or corrupt file is an error.
    pub fn load(&self) -> Result<PersistedState> {
        if !self.state_path.exists() {
            debug!(path = %self.state_path.display(), "No state file, starting empty");
            return Ok(PersistedState::default());
        }

        let content = fs::read_to_string(&self.state_path)
            .with_context(|| format!("Failed to read state file: {}", self.state_path.display()))?;
        let state: PersistedState = serde_json::from_str(&content).with_context(|| {
            format!("Failed to parse state file: {}", self.state_path.display())
        })?;

        if state.version != STATE_VERSION {
            warn!(
                file_version = state.version,
                current_version = STATE_VERSION,
                "State file version mismatch, starting empty"
            );
            return Ok(PersistedState::default());
        }

        info!(
            path = %self.state_path.display(),
            target_count = state.targets.len(),
            "Loaded target table from disk"
        );
        Ok(state)
    }

    pub fn save(&self, targets: &TargetMap) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let state = PersistedState::new(targets.clone());
        let content = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;

        let tmp_path = self.state_path.with_extension("tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.state_path).with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                tmp_path.display(),
                self.state_path.display()
            )
        })?;

        debug!(
            path = %self.state_path.display(),
            target_count = targets.len(),
            "Saved target table"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoster_id::{CustomerId, DeploymentId, NodeId};
    use hoster_model::{DeploymentStatus, ProxyTarget};

    fn targets() -> TargetMap {
        TargetMap::from([(
            "blog".to_string(),
            ProxyTarget {
                deployment_id: DeploymentId::new(),
                node_id: Some(NodeId::parse("node_edge1").unwrap()),
                port: 30001,
                status: DeploymentStatus::Running,
                customer_id: CustomerId::new(),
            },
        )])
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("targets.json"));
        let state = persistence.load().unwrap();
        assert_eq!(state.version, STATE_VERSION);
        assert!(state.targets.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = StatePersistence::new(dir.path().join("nested/targets.json"));
        let saved = targets();

        persistence.save(&saved).unwrap();
        assert!(!persistence.path().with_extension("tmp").exists());

        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.targets, saved);
    }

    #[test]
    fn test_other_version_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        fs::write(&path, r#"{"version": 99, "targets": {}}"#).unwrap();

        let state = StatePersistence::new(&path).load().unwrap();
        assert_eq!(state.version, STATE_VERSION);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        fs::write(&path, "{not json").unwrap();

        let err = StatePersistence::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}
