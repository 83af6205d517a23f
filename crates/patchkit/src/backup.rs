//! Backup recorder - inverse-operation artifacts for rollback
//!
//! Before a target file is mutated, the recorder writes a file into the
//! backup tree whose suffix is the inverse command. Replaying the backup
//! tree as an update package against the same target undoes the run.
//!
//! | Forward              | Target   | Backup written    | Suffix |
//! |----------------------|----------|-------------------|--------|
//! | add / update / merge | present  | snapshot          | `.upd` |
//! | add / update / merge | absent   | empty marker      | `.del` |
//! | delete               | present  | snapshot          | `.add` |
//! | delete               | absent   | empty snapshot \* | `.add` |
//! | any script           | -        | copy of script    | same   |
//!
//! \* an empty target is synthesized first so the snapshot exists.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::command::CommandKind;
use crate::error::{Error, Result};
use crate::layout::PackageEntry;

/// A single artifact written to the backup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Path of the artifact inside the backup tree
    pub path: PathBuf,
    /// Command the artifact will perform when replayed
    pub replay: CommandKind,
}

/// Writes inverse-operation artifacts under a backup root
///
/// The backup tree mirrors the target-relative directory structure. Only
/// the first artifact per target path is kept, so the tree always reflects
/// the state before the run started.
#[derive(Debug)]
pub struct BackupRecorder {
    root: PathBuf,
    recorded: HashSet<PathBuf>,
}

impl BackupRecorder {
    /// Create a recorder, creating the backup root if needed
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| Error::fs("create backup directory", root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
            recorded: HashSet::new(),
        })
    }

    /// Root of the backup tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record the inverse of `entry` applied to `target`
    ///
    /// Must be called before the forward mutation. Returns `None` when the
    /// command has nothing to back up or the target was already recorded.
    pub fn record(&mut self, entry: &PackageEntry, target: &Path) -> Result<Option<BackupRecord>> {
        let record = match entry.kind {
            CommandKind::AddFile | CommandKind::UpdateFile | CommandKind::MergeDocument => {
                if !self.recorded.insert(target.to_path_buf()) {
                    return Ok(None);
                }
                if target.is_file() {
                    self.snapshot(entry, target, CommandKind::UpdateFile)?
                } else {
                    self.marker(entry, CommandKind::DeleteFile)?
                }
            }
            CommandKind::DeleteFile => {
                if !self.recorded.insert(target.to_path_buf()) {
                    return Ok(None);
                }
                if !target.exists() {
                    synthesize_empty(target)?;
                }
                self.snapshot(entry, target, CommandKind::AddFile)?
            }
            CommandKind::ExecuteScript
            | CommandKind::ExecuteScriptBefore
            | CommandKind::ExecuteScriptAfter => self.record_script(entry)?,
            CommandKind::ScriptParams => return Ok(None),
        };

        log::debug!(
            "Backed up {} as {}",
            target.display(),
            record.path.display()
        );
        Ok(Some(record))
    }

    /// Copy a script verbatim into the backup tree, suffix preserved
    ///
    /// Recorded scripts are informational: a replay pass never runs them.
    pub fn record_script(&self, entry: &PackageEntry) -> Result<BackupRecord> {
        let path = self.artifact_path(entry, entry.kind)?;
        fs::copy(&entry.source, &path).map_err(|e| Error::fs("back up script", &path, e))?;
        Ok(BackupRecord {
            path,
            replay: entry.kind,
        })
    }

    fn snapshot(
        &self,
        entry: &PackageEntry,
        target: &Path,
        replay: CommandKind,
    ) -> Result<BackupRecord> {
        let path = self.artifact_path(entry, replay)?;
        fs::copy(target, &path).map_err(|e| Error::fs("back up", target, e))?;
        Ok(BackupRecord { path, replay })
    }

    fn marker(&self, entry: &PackageEntry, replay: CommandKind) -> Result<BackupRecord> {
        let path = self.artifact_path(entry, replay)?;
        fs::write(&path, b"").map_err(|e| Error::fs("write backup marker", &path, e))?;
        Ok(BackupRecord { path, replay })
    }

    /// `<root>/<relative_dir>/<logical>.<suffix>`, parent created on demand
    fn artifact_path(&self, entry: &PackageEntry, replay: CommandKind) -> Result<PathBuf> {
        let dir = self.root.join(&entry.relative_dir);
        fs::create_dir_all(&dir).map_err(|e| Error::fs("create backup directory", &dir, e))?;

        let mut file_name = entry.logical_name.clone();
        file_name.push(".");
        file_name.push(replay.suffix());
        Ok(dir.join(file_name))
    }
}

/// Create an empty file at `target`, including missing parent directories
fn synthesize_empty(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::fs("create directory", parent, e))?;
    }
    fs::write(target, b"").map_err(|e| Error::fs("create", target, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        package: PathBuf,
        target: PathBuf,
        backup: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let package = tmp.path().join("package");
        let target = tmp.path().join("target");
        let backup = tmp.path().join("backup");
        fs::create_dir_all(package.join("conf")).unwrap();
        fs::create_dir_all(&target).unwrap();
        Fixture {
            _tmp: tmp,
            package,
            target,
            backup,
        }
    }

    fn entry(fx: &Fixture, rel: &str, content: &str) -> PackageEntry {
        let path = fx.package.join(rel);
        fs::write(&path, content).unwrap();
        PackageEntry::new(&fx.package, &path).unwrap()
    }

    #[test]
    fn test_add_over_absent_target_writes_delete_marker() {
        let fx = fixture();
        let mut recorder = BackupRecorder::new(&fx.backup).unwrap();
        let e = entry(&fx, "conf/app.toml.add", "new");

        let record = recorder.record(&e, &e.target_path(&fx.target)).unwrap().unwrap();

        assert_eq!(record.replay, CommandKind::DeleteFile);
        assert_eq!(record.path, fx.backup.join("conf/app.toml.del"));
        assert_eq!(fs::read(&record.path).unwrap(), b"");
    }

    #[test]
    fn test_update_over_present_target_snapshots_content() {
        let fx = fixture();
        fs::write(fx.target.join("app.toml"), "old").unwrap();
        let mut recorder = BackupRecorder::new(&fx.backup).unwrap();
        let e = entry(&fx, "app.toml.upd", "new");

        let record = recorder.record(&e, &e.target_path(&fx.target)).unwrap().unwrap();

        assert_eq!(record.replay, CommandKind::UpdateFile);
        assert_eq!(fs::read_to_string(&record.path).unwrap(), "old");
    }

    #[test]
    fn test_delete_snapshots_as_add() {
        let fx = fixture();
        fs::write(fx.target.join("gone.txt"), "keep me").unwrap();
        let mut recorder = BackupRecorder::new(&fx.backup).unwrap();
        let e = entry(&fx, "gone.txt.del", "");

        let record = recorder.record(&e, &e.target_path(&fx.target)).unwrap().unwrap();

        assert_eq!(record.path, fx.backup.join("gone.txt.add"));
        assert_eq!(fs::read_to_string(&record.path).unwrap(), "keep me");
    }

    #[test]
    fn test_delete_of_absent_target_synthesizes_empty_file() {
        let fx = fixture();
        let mut recorder = BackupRecorder::new(&fx.backup).unwrap();
        let e = entry(&fx, "conf/missing.ini.del", "");
        let target = e.target_path(&fx.target);

        let record = recorder.record(&e, &target).unwrap().unwrap();

        assert!(target.is_file());
        assert_eq!(record.replay, CommandKind::AddFile);
        assert_eq!(fs::read(&record.path).unwrap(), b"");
    }

    #[test]
    fn test_script_is_copied_with_same_suffix() {
        let fx = fixture();
        let mut recorder = BackupRecorder::new(&fx.backup).unwrap();
        let e = entry(&fx, "init.eini", "echo hi");

        let record = recorder.record(&e, &e.target_path(&fx.target)).unwrap().unwrap();

        assert_eq!(record.path, fx.backup.join("init.eini"));
        assert_eq!(fs::read_to_string(&record.path).unwrap(), "echo hi");
    }

    #[test]
    fn test_first_backup_for_a_target_wins() {
        let fx = fixture();
        fs::write(fx.target.join("app.toml"), "original").unwrap();
        let mut recorder = BackupRecorder::new(&fx.backup).unwrap();
        let first = entry(&fx, "app.toml.upd", "v2");
        let target = first.target_path(&fx.target);

        recorder.record(&first, &target).unwrap();
        fs::write(&target, "v2").unwrap();
        let second = entry(&fx, "app.toml.xmrg", "<xdt/>");

        assert!(recorder.record(&second, &target).unwrap().is_none());
        assert_eq!(
            fs::read_to_string(fx.backup.join("app.toml.upd")).unwrap(),
            "original"
        );
    }

    #[test]
    fn test_params_are_not_recorded() {
        let fx = fixture();
        let mut recorder = BackupRecorder::new(&fx.backup).unwrap();
        let e = entry(&fx, "job.params", "--fast");

        assert!(recorder.record(&e, &e.target_path(&fx.target)).unwrap().is_none());
    }
}
