//! Patch engine - three-phase application with rollback
//!
//! A pass runs in three phases separated by hard barriers:
//! 1. `.eini` scripts, in enumeration order
//! 2. per-file commands (`.add`, `.upd`, `.del`, `.xmrg`, `.exc`)
//! 3. `.eend` scripts, in enumeration order
//!
//! When a backup root is given, every mutation is preceded by a backup
//! artifact (see [`crate::backup`]). If the pass fails, the backup tree is
//! replayed once as an update package against the same target. The replay
//! pass has no recorder, so a rollback never backs itself up and never
//! triggers another rollback.

use std::fs;
use std::io;
use std::path::Path;

use crate::backup::BackupRecorder;
use crate::command::CommandKind;
use crate::error::{Error, Result};
use crate::layout::{PackageEntry, scan_package};
use crate::merge::MergeTransform;
use crate::script::ScriptRunner;
use crate::types::{PatchPlan, RollbackOutcome, UpdateOutcome, UpdateReport};

/// Applies update packages using injected script and merge capabilities
pub struct PatchEngine<'a> {
    scripts: &'a dyn ScriptRunner,
    merge: &'a dyn MergeTransform,
}

/// Whether a pass applies a package or replays a backup tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Forward,
    Replay,
}

impl<'a> PatchEngine<'a> {
    pub fn new(scripts: &'a dyn ScriptRunner, merge: &'a dyn MergeTransform) -> Self {
        Self { scripts, merge }
    }

    /// Apply the package at `source` onto `target`
    ///
    /// With a `backup` directory, inverse artifacts are recorded before each
    /// mutation and a failure triggers exactly one rollback pass. Without
    /// one, a failure leaves already-applied changes in place.
    pub fn update_files(&self, source: &Path, target: &Path, backup: Option<&Path>) -> UpdateOutcome {
        let Some(backup) = backup else {
            return match self.run_pass(source, target, None, Mode::Forward) {
                Ok(report) => UpdateOutcome::Applied(report),
                Err(error) => {
                    log::error!("Update failed: {error}");
                    UpdateOutcome::Failed {
                        error,
                        rollback: RollbackOutcome::NotAttempted,
                    }
                }
            };
        };

        // Nothing has been applied yet if the backup root cannot be created
        let mut recorder = match BackupRecorder::new(backup) {
            Ok(recorder) => recorder,
            Err(error) => {
                log::error!("Update aborted: {error}");
                return UpdateOutcome::Failed {
                    error,
                    rollback: RollbackOutcome::NotAttempted,
                };
            }
        };

        match self.run_pass(source, target, Some(&mut recorder), Mode::Forward) {
            Ok(report) => UpdateOutcome::Applied(report),
            Err(error) => {
                log::error!("Update failed: {error}");
                log::warn!("Rolling back from {}", recorder.root().display());

                let rollback = match self.rollback(recorder.root(), target) {
                    Ok(report) => {
                        log::info!(
                            "Rollback restored {} file(s)",
                            report.total_changes()
                        );
                        RollbackOutcome::Succeeded(report)
                    }
                    Err(rollback_error) => {
                        log::error!("Rollback failed: {rollback_error}");
                        RollbackOutcome::Failed(rollback_error)
                    }
                };

                UpdateOutcome::Failed { error, rollback }
            }
        }
    }

    /// Replay a backup tree against `target`, without recording backups
    ///
    /// Scripts found in the backup tree are listed but not executed.
    pub fn rollback(&self, backup: &Path, target: &Path) -> Result<UpdateReport> {
        self.run_pass(backup, target, None, Mode::Replay)
    }

    fn run_pass(
        &self,
        source: &Path,
        target: &Path,
        recorder: Option<&mut BackupRecorder>,
        mode: Mode,
    ) -> Result<UpdateReport> {
        let plan = plan(source)?;
        log::info!(
            "Applying {} entries from {} to {}",
            plan.len(),
            source.display(),
            target.display()
        );

        let mut pass = Pass {
            scripts: self.scripts,
            merge: self.merge,
            target,
            recorder,
            mode,
            report: UpdateReport::default(),
        };

        for entry in plan.iter() {
            pass.apply(entry)?;
        }

        Ok(pass.report)
    }
}

/// Enumerate a package and group its entries by phase
pub fn plan(source: &Path) -> Result<PatchPlan> {
    Ok(PatchPlan::from_entries(scan_package(source)?))
}

/// State of a single pass over one package
struct Pass<'p> {
    scripts: &'p dyn ScriptRunner,
    merge: &'p dyn MergeTransform,
    target: &'p Path,
    recorder: Option<&'p mut BackupRecorder>,
    mode: Mode,
    report: UpdateReport,
}

impl Pass<'_> {
    fn apply(&mut self, entry: &PackageEntry) -> Result<()> {
        let target = entry.target_path(self.target);

        match entry.kind {
            CommandKind::AddFile | CommandKind::UpdateFile => {
                self.backup(entry, &target)?;
                copy_file(&entry.source, &target)?;
            }
            CommandKind::DeleteFile => {
                self.backup(entry, &target)?;
                remove_file(&target)?;
            }
            CommandKind::MergeDocument => {
                self.backup(entry, &target)?;
                if target.is_file() {
                    self.merge.apply(&entry.source, &target)?;
                } else {
                    // Nothing to merge into yet, the transform becomes the document
                    copy_file(&entry.source, &target)?;
                }
            }
            CommandKind::ExecuteScript
            | CommandKind::ExecuteScriptBefore
            | CommandKind::ExecuteScriptAfter => return self.run_script(entry),
            CommandKind::ScriptParams => {
                log::debug!("Skipping script parameters {}", entry.display_path());
                return Ok(());
            }
        }

        self.report.add_file(entry.kind, target);
        Ok(())
    }

    fn run_script(&mut self, entry: &PackageEntry) -> Result<()> {
        if self.mode == Mode::Replay {
            log::info!("Not re-running recorded script {}", entry.display_path());
            self.report.scripts_skipped += 1;
            return Ok(());
        }

        if !entry.source.is_file() {
            return Err(Error::ScriptMissing(entry.source.clone()));
        }

        self.backup(entry, &entry.source)?;

        let working_dir = entry.source.parent().unwrap_or_else(|| Path::new("."));
        let output = self.scripts.run(&entry.source, working_dir)?;

        if output.timed_out {
            return Err(Error::ScriptTimedOut {
                name: entry.name(),
                suffix: entry.kind.suffix(),
            });
        }
        if !output.success() {
            return Err(Error::ScriptFailed {
                name: entry.name(),
                suffix: entry.kind.suffix(),
                exit_code: output.exit_code,
            });
        }

        log::info!("Script {} completed", entry.display_path());
        self.report.scripts_run += 1;
        Ok(())
    }

    fn backup(&mut self, entry: &PackageEntry, target: &Path) -> Result<()> {
        if let Some(recorder) = self.recorder.as_deref_mut() {
            if recorder.record(entry, target)?.is_some() {
                self.report.backups_recorded += 1;
            }
        }
        Ok(())
    }
}

/// Copy `source` over `target`, creating parent directories
fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::fs("create directory", parent, e))?;
    }
    fs::copy(source, target).map_err(|e| Error::fs("copy", target, e))?;
    log::info!("Copied {} to {}", source.display(), target.display());
    Ok(())
}

/// Remove `target`; an already-absent file is not an error
fn remove_file(target: &Path) -> Result<()> {
    match fs::remove_file(target) {
        Ok(()) => {
            log::info!("Deleted {}", target.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("{} already absent", target.display());
            Ok(())
        }
        Err(e) => Err(Error::fs("delete", target, e)),
    }
}
