//! Result and plan types for patch runs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::command::{CommandKind, ScriptStage};
use crate::error::Error;
use crate::layout::PackageEntry;

/// Marker placed between the original failure and a rollback failure
pub const ROLLBACK_ERROR_MARKER: &str = "Rollback Error =>";

/// Counters for a completed pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub merged: usize,
    pub scripts_run: usize,
    /// Scripts listed in a replayed backup tree (never executed)
    pub scripts_skipped: usize,
    pub backups_recorded: usize,
    /// Target files touched, in application order
    #[serde(default)]
    pub touched: Vec<PathBuf>,
}

impl UpdateReport {
    /// Count a successfully applied file command
    pub fn add_file(&mut self, kind: CommandKind, target: PathBuf) {
        match kind {
            CommandKind::AddFile => self.added += 1,
            CommandKind::UpdateFile => self.updated += 1,
            CommandKind::DeleteFile => self.deleted += 1,
            CommandKind::MergeDocument => self.merged += 1,
            _ => return,
        }
        self.touched.push(target);
    }

    /// Total number of file changes made
    pub fn total_changes(&self) -> usize {
        self.added + self.updated + self.deleted + self.merged
    }
}

/// What happened to the rollback pass of a failed run
#[derive(Debug)]
pub enum RollbackOutcome {
    /// Backups were disabled, nothing to replay
    NotAttempted,
    /// The backup tree was replayed successfully
    Succeeded(UpdateReport),
    /// Replaying the backup tree failed too; manual recovery needed
    Failed(Error),
}

/// Result of one `update_files` invocation
#[derive(Debug)]
pub enum UpdateOutcome {
    Applied(UpdateReport),
    Failed {
        error: Error,
        rollback: RollbackOutcome,
    },
}

impl UpdateOutcome {
    /// Check if every phase completed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Single diagnostic string: empty on success, the failure otherwise,
    /// followed by the rollback failure when there is one
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Applied(_) => String::new(),
            Self::Failed {
                error,
                rollback: RollbackOutcome::Failed(rollback_error),
            } => format!("{error}\n{ROLLBACK_ERROR_MARKER}\n{rollback_error}"),
            Self::Failed { error, .. } => error.to_string(),
        }
    }

    /// Convert into a `Result`, stacking a rollback failure onto the original error
    pub fn into_result(self) -> crate::Result<UpdateReport> {
        match self {
            Self::Applied(report) => Ok(report),
            Self::Failed {
                error,
                rollback: RollbackOutcome::Failed(rollback),
            } => Err(Error::Rollback {
                original: Box::new(error),
                rollback: Box::new(rollback),
            }),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

/// Package entries grouped by execution phase
#[derive(Debug, Clone, Default)]
pub struct PatchPlan {
    /// Phase 1: `.eini` scripts
    pub before: Vec<PackageEntry>,
    /// Phase 2: file commands and `.exc` scripts
    pub files: Vec<PackageEntry>,
    /// Phase 3: `.eend` scripts
    pub after: Vec<PackageEntry>,
}

impl PatchPlan {
    /// Split enumerated entries into phases, keeping enumeration order
    pub fn from_entries(entries: Vec<PackageEntry>) -> Self {
        let mut plan = Self::default();
        for entry in entries {
            match entry.kind.stage() {
                Some(ScriptStage::Before) => plan.before.push(entry),
                Some(ScriptStage::After) => plan.after.push(entry),
                Some(ScriptStage::During) | None => plan.files.push(entry),
            }
        }
        plan
    }

    /// Total number of entries across all phases
    pub fn len(&self) -> usize {
        self.before.len() + self.files.len() + self.after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in execution order
    pub fn iter(&self) -> impl Iterator<Item = &PackageEntry> {
        self.before
            .iter()
            .chain(self.files.iter())
            .chain(self.after.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn entry(name: &str) -> PackageEntry {
        PackageEntry::new(Path::new("/pkg"), &Path::new("/pkg").join(name)).unwrap()
    }

    #[test]
    fn test_plan_splits_phases() {
        let plan = PatchPlan::from_entries(vec![
            entry("cleanup.eend"),
            entry("a.add"),
            entry("init.eini"),
            entry("fix.exc"),
        ]);

        let order: Vec<_> = plan.iter().map(PackageEntry::display_path).collect();
        assert_eq!(order, vec!["init.eini", "a.add", "fix.exc", "cleanup.eend"]);
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_diagnostic_without_rollback_failure_has_no_marker() {
        let outcome = UpdateOutcome::Failed {
            error: Error::ScriptMissing("/pkg/x.exc".into()),
            rollback: RollbackOutcome::Succeeded(UpdateReport::default()),
        };
        assert!(!outcome.diagnostic().contains(ROLLBACK_ERROR_MARKER));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_diagnostic_stacks_rollback_failure() {
        let outcome = UpdateOutcome::Failed {
            error: Error::ScriptMissing("/pkg/x.exc".into()),
            rollback: RollbackOutcome::Failed(Error::SourceNotFound("/backup".into())),
        };
        let diagnostic = outcome.diagnostic();
        assert!(diagnostic.contains("\nRollback Error =>\n"));

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.to_string(), diagnostic);
    }

    #[test]
    fn test_report_counts() {
        let mut report = UpdateReport::default();
        report.add_file(CommandKind::AddFile, "/t/a".into());
        report.add_file(CommandKind::MergeDocument, "/t/b".into());
        report.add_file(CommandKind::ScriptParams, "/t/c".into());
        assert_eq!(report.total_changes(), 2);
        assert_eq!(report.touched.len(), 2);
    }
}
