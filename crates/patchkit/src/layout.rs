//! Package layout - mapping package files onto target and backup paths
//!
//! Directories under the package root mirror the target-relative structure,
//! so a file `<root>/bin/tool.exe.upd` updates `<target>/bin/tool.exe`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::command::{CommandKind, classify};
use crate::error::{Error, Result};

/// A classified file inside an update package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    /// Absolute path of the package file
    pub source: PathBuf,
    /// Directory of the file relative to the package root (empty at the root)
    pub relative_dir: PathBuf,
    /// File name with the command suffix stripped
    pub logical_name: OsString,
    /// Command derived from the suffix
    pub kind: CommandKind,
}

impl PackageEntry {
    /// Build an entry for `file` under `root`, or `None` if its suffix is unknown
    pub fn new(root: &Path, file: &Path) -> Option<Self> {
        let kind = classify(file)?;
        Some(Self {
            source: file.to_path_buf(),
            relative_dir: relative_dir(root, file),
            logical_name: logical_name(file),
            kind,
        })
    }

    /// Path of the logical file inside `target_root`
    pub fn target_path(&self, target_root: &Path) -> PathBuf {
        target_root
            .join(&self.relative_dir)
            .join(&self.logical_name)
    }

    /// Logical name as a display string
    pub fn name(&self) -> String {
        self.logical_name.to_string_lossy().into_owned()
    }

    /// Package-relative path for logs, e.g. `bin/tool.exe.upd`
    pub fn display_path(&self) -> String {
        self.relative_dir
            .join(format!("{}.{}", self.name(), self.kind.suffix()))
            .display()
            .to_string()
    }
}

/// Directory of `file` relative to `root`
///
/// Both paths are made absolute first. A file directly under the root (or
/// outside of it) has an empty relative directory.
pub fn relative_dir(root: &Path, file: &Path) -> PathBuf {
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    let file = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());

    file.strip_prefix(&root)
        .ok()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// File name with its final extension removed (`readme.txt.add` -> `readme.txt`)
pub fn logical_name(file: &Path) -> OsString {
    file.file_stem().map(OsString::from).unwrap_or_default()
}

/// Enumerate every classified file under `root`, recursively
///
/// Files with an unrecognized suffix are skipped. Entries are returned in
/// file-name order per directory so repeated runs see the same sequence.
pub fn scan_package(root: &Path) -> Result<Vec<PackageEntry>> {
    if !root.is_dir() {
        return Err(Error::SourceNotFound(root.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        match PackageEntry::new(root, entry.path()) {
            Some(package_entry) => entries.push(package_entry),
            None => log::debug!("Ignoring {} (no command suffix)", entry.path().display()),
        }
    }

    Ok(entries)
}
