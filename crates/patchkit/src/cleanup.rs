//! Directory cleanup after a run
//!
//! Backup trees and consumed packages are the caller's to delete. Cleanup
//! is best effort: failures are logged and counted, never returned.

use serde::Serialize;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Counts from a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub failures: usize,
    /// The root directory itself was removed
    pub root_removed: bool,
}

/// Remove everything under `dir`
///
/// Files below a directory named `exclude` are kept, as is that directory.
/// With `remove_root`, `dir` itself is deleted once it has no
/// subdirectories left. A missing `dir` is a no-op.
pub fn remove_directory_contents(
    dir: &Path,
    exclude: Option<&str>,
    remove_root: bool,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    if !dir.is_dir() {
        return report;
    }

    let is_excluded = |path: &Path| {
        exclude.is_some_and(|name| {
            path.strip_prefix(dir)
                .map(|rel| rel.components().any(|c| c.as_os_str() == OsStr::new(name)))
                .unwrap_or(false)
        })
    };

    for entry in WalkDir::new(dir).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || is_excluded(entry.path()) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => report.files_removed += 1,
            Err(e) => {
                log::warn!("Could not remove {}: {e}", entry.path().display());
                report.failures += 1;
            }
        }
    }

    match fs::read_dir(dir) {
        Ok(children) => {
            for child in children.filter_map(|e| e.ok()) {
                let path = child.path();
                if !path.is_dir() || is_excluded(&path) {
                    continue;
                }
                match fs::remove_dir_all(&path) {
                    Ok(()) => report.dirs_removed += 1,
                    Err(e) => {
                        log::warn!("Could not remove {}: {e}", path.display());
                        report.failures += 1;
                    }
                }
            }
        }
        Err(e) => {
            log::warn!("Could not list {}: {e}", dir.display());
            report.failures += 1;
        }
    }

    if remove_root && !has_subdirectories(dir) {
        match fs::remove_dir_all(dir) {
            Ok(()) => report.root_removed = true,
            Err(e) => {
                log::error!("Could not remove {}: {e}", dir.display());
                report.failures += 1;
            }
        }
    }

    log::debug!(
        "Cleaned {}: {} file(s), {} dir(s), {} failure(s)",
        dir.display(),
        report.files_removed,
        report.dirs_removed,
        report.failures
    );
    report
}

fn has_subdirectories(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|children| children.filter_map(|e| e.ok()).any(|e| e.path().is_dir()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("logs/old")).unwrap();
        fs::write(root.join("top.txt"), "x").unwrap();
        fs::write(root.join("a/b/deep.txt"), "x").unwrap();
        fs::write(root.join("logs/keep.log"), "x").unwrap();
        fs::write(root.join("logs/old/keep.log"), "x").unwrap();
    }

    #[test]
    fn test_removes_everything() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());

        let report = remove_directory_contents(tmp.path(), None, false);

        assert_eq!(report.files_removed, 4);
        assert_eq!(report.dirs_removed, 2);
        assert!(tmp.path().exists());
        assert!(fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_exclude_keeps_named_directory() {
        let tmp = TempDir::new().unwrap();
        populate(tmp.path());

        let report = remove_directory_contents(tmp.path(), Some("logs"), true);

        assert!(tmp.path().join("logs/keep.log").exists());
        assert!(tmp.path().join("logs/old/keep.log").exists());
        assert!(!tmp.path().join("a").exists());
        assert!(!tmp.path().join("top.txt").exists());
        // root still has the excluded subdirectory
        assert!(!report.root_removed);
    }

    #[test]
    fn test_remove_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("backup");
        populate(&root);

        let report = remove_directory_contents(&root, None, true);

        assert!(report.root_removed);
        assert!(!root.exists());
    }

    #[test]
    fn test_missing_directory_is_noop() {
        let tmp = TempDir::new().unwrap();
        let report = remove_directory_contents(&tmp.path().join("missing"), None, true);
        assert_eq!(report, CleanupReport::default());
    }
}
