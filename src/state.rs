use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Deploy records kept in the state file
const HISTORY_LIMIT: usize = 20;

/// Deploy history, newest last
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeployState {
    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub deployments: Vec<DeployRecord>,
}

/// Outcome of one `pakdrop deploy`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeployRecord {
    pub package: PathBuf,
    pub target: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    /// Number of file changes left in place
    #[serde(default)]
    pub changes: usize,
    /// Diagnostic of a failed run
    pub error: Option<String>,
    /// Rollback failed too; the target needs manual recovery
    #[serde(default)]
    pub needs_recovery: bool,
    /// Backup tree kept for manual recovery
    pub backup: Option<PathBuf>,
}

impl DeployState {
    /// Get the state file path
    pub fn state_file() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join("state.toml"))
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::state_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::state_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create state directory: {}", dir.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize state to TOML")?;
        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Append a record, dropping the oldest beyond the history limit
    pub fn record(&mut self, record: DeployRecord) {
        self.deployments.push(record);
        if self.deployments.len() > HISTORY_LIMIT {
            let excess = self.deployments.len() - HISTORY_LIMIT;
            self.deployments.drain(..excess);
        }
        self.last_updated = Utc::now();
    }

    pub fn last(&self) -> Option<&DeployRecord> {
        self.deployments.last()
    }
}

impl Default for DeployState {
    fn default() -> Self {
        Self {
            last_updated: Utc::now(),
            deployments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(package: &str, success: bool) -> DeployRecord {
        let now = Utc::now();
        DeployRecord {
            package: PathBuf::from(package),
            target: PathBuf::from("/opt/app"),
            started_at: now,
            finished_at: now,
            success,
            changes: 3,
            error: (!success).then(|| "script fix.exc exited with exit code 2".to_string()),
            needs_recovery: !success,
            backup: (!success).then(|| PathBuf::from("/var/tmp/pakdrop/backup/20261019-120000-42")),
        }
    }

    #[test]
    fn test_default_state() {
        let state = DeployState::default();
        assert!(state.deployments.is_empty());
        assert!(state.last().is_none());
    }

    #[test]
    fn test_history_is_capped() {
        let mut state = DeployState::default();
        for i in 0..HISTORY_LIMIT + 5 {
            state.record(record(&format!("/pkg/{i}"), true));
        }
        assert_eq!(state.deployments.len(), HISTORY_LIMIT);
        assert_eq!(state.deployments[0].package, PathBuf::from("/pkg/5"));
        assert_eq!(
            state.last().unwrap().package,
            PathBuf::from(format!("/pkg/{}", HISTORY_LIMIT + 4))
        );
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/state.toml");

        let mut state = DeployState::default();
        state.record(record("/pkg/ok", true));
        state.record(record("/pkg/bad", false));
        state.save_to(&path).unwrap();

        let loaded = DeployState::load_from(&path).unwrap();
        assert_eq!(loaded.deployments.len(), 2);
        assert!(!loaded.last().unwrap().success);
        assert!(loaded.last().unwrap().error.as_deref().unwrap().contains("fix.exc"));
        assert_eq!(loaded.deployments[0].error, None);
        assert!(loaded.last().unwrap().needs_recovery);
        assert!(loaded.last().unwrap().backup.is_some());
        assert_eq!(loaded.deployments[0].backup, None);
    }

    #[test]
    fn test_missing_file_gives_default() {
        let tmp = TempDir::new().unwrap();
        let state = DeployState::load_from(&tmp.path().join("state.toml")).unwrap();
        assert!(state.deployments.is_empty());
    }
}
