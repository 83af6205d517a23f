//! Error types for the patchkit crate

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while applying or rolling back an update package.
///
/// Every error aborts the remainder of the current pass. The engine never
/// swallows a per-file error to keep processing later files.
#[derive(Error, Debug)]
pub enum Error {
    /// Package root does not exist or is not a directory
    #[error("update package not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// A script scheduled for execution is missing on disk
    #[error("script not found: {}", .0.display())]
    ScriptMissing(PathBuf),

    /// Script could not be started at all
    #[error("failed to start script {}: {source}", .script.display())]
    ScriptSpawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Script ran and exited unsuccessfully
    #[error("script {name}.{suffix} exited with {}", exit_label(.exit_code))]
    ScriptFailed {
        name: String,
        suffix: &'static str,
        exit_code: Option<i32>,
    },

    /// Script was killed by the runner after exceeding its timeout
    #[error("script {name}.{suffix} timed out")]
    ScriptTimedOut { name: String, suffix: &'static str },

    /// Structured-document transform could not be applied
    #[error("cannot apply merge transform {}: {reason}", .transform.display())]
    MergeFailed { transform: PathBuf, reason: String },

    /// Copy, delete or directory creation failed
    #[error("failed to {op} {}: {source}", .path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Package enumeration failed
    #[error("failed to enumerate update package: {0}")]
    Walk(#[from] walkdir::Error),

    /// A failed run whose rollback pass failed as well
    #[error("{original}\nRollback Error =>\n{rollback}")]
    Rollback {
        original: Box<Error>,
        rollback: Box<Error>,
    },
}

impl Error {
    /// Wrap an IO error with the operation and path it concerns
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }

    /// Returns true if the error came from an external script
    pub fn is_script_error(&self) -> bool {
        matches!(
            self,
            Error::ScriptMissing(_)
                | Error::ScriptSpawn { .. }
                | Error::ScriptFailed { .. }
                | Error::ScriptTimedOut { .. }
        )
    }

    /// Returns true if a rollback was attempted and failed too.
    /// Manual intervention is required in that case.
    pub fn needs_manual_recovery(&self) -> bool {
        matches!(self, Error::Rollback { .. })
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Result type for patchkit operations
pub type Result<T> = std::result::Result<T, Error>;
