//! Merge transform capability
//!
//! A `.xmrg` package file describes a structured-document transform (for
//! example an XDT file) applied in place to an existing target document.
//! The transform algorithm itself lives outside this crate.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Placeholder replaced by the transform file path in tool arguments
pub const TRANSFORM_PLACEHOLDER: &str = "{transform}";

/// Placeholder replaced by the target document path in tool arguments
pub const DOCUMENT_PLACEHOLDER: &str = "{document}";

/// Applies a structured-document transform onto a document, in place
pub trait MergeTransform {
    /// Apply `transform` to `document`, rewriting `document`
    ///
    /// Failures must be reported as [`Error::MergeFailed`] naming the
    /// transform file.
    fn apply(&self, transform: &Path, document: &Path) -> Result<()>;
}

/// Delegates merges to an external transform tool
///
/// Arguments may contain `{transform}` and `{document}` placeholders. When
/// neither appears, both paths are appended in that order.
#[derive(Debug, Clone)]
pub struct ExternalMergeTool {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalMergeTool {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Expand placeholders into the final argument list
    fn expand_args(&self, transform: &Path, document: &Path) -> Vec<OsString> {
        let has_placeholder = self
            .args
            .iter()
            .any(|a| a.contains(TRANSFORM_PLACEHOLDER) || a.contains(DOCUMENT_PLACEHOLDER));

        let mut args: Vec<OsString> = self
            .args
            .iter()
            .map(|arg| {
                if arg == TRANSFORM_PLACEHOLDER {
                    transform.as_os_str().to_os_string()
                } else if arg == DOCUMENT_PLACEHOLDER {
                    document.as_os_str().to_os_string()
                } else {
                    arg.replace(TRANSFORM_PLACEHOLDER, &transform.to_string_lossy())
                        .replace(DOCUMENT_PLACEHOLDER, &document.to_string_lossy())
                        .into()
                }
            })
            .collect();

        if !has_placeholder {
            args.push(transform.as_os_str().to_os_string());
            args.push(document.as_os_str().to_os_string());
        }
        args
    }
}

impl MergeTransform for ExternalMergeTool {
    fn apply(&self, transform: &Path, document: &Path) -> Result<()> {
        let failed = |reason: String| Error::MergeFailed {
            transform: transform.to_path_buf(),
            reason,
        };

        let output = Command::new(&self.program)
            .args(self.expand_args(transform, document))
            .output()
            .map_err(|e| failed(format!("cannot run {}: {e}", self.program.display())))?;

        if output.status.success() {
            log::info!(
                "Merged {} into {}",
                transform.display(),
                document.display()
            );
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )))
        }
    }
}

/// Rejects every merge
///
/// Used when no transform tool is configured, so a package containing
/// `.xmrg` files fails (and rolls back) instead of being half-applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedMerge;

impl MergeTransform for UnsupportedMerge {
    fn apply(&self, transform: &Path, _document: &Path) -> Result<()> {
        Err(Error::MergeFailed {
            transform: transform.to_path_buf(),
            reason: "no merge tool configured".to_string(),
        })
    }
}
