//! # Patchkit
//!
//! Apply suffix-driven update packages onto an installation directory, with
//! transactional rollback.
//!
//! An update package is a directory tree. Each file is named
//! `<logicalName>.<suffix>` and the suffix says what to do with the logical
//! file at the same relative path in the target:
//!
//! | Suffix    | Command                                          |
//! |-----------|--------------------------------------------------|
//! | `.add`    | copy into the target                             |
//! | `.upd`    | overwrite the target file                        |
//! | `.del`    | delete the target file                           |
//! | `.xmrg`   | merge a document transform into the target       |
//! | `.exc`    | run a script with the per-file commands          |
//! | `.eini`   | run a script before any per-file command         |
//! | `.eend`   | run a script after all per-file commands         |
//! | `.params` | reserved                                         |
//!
//! ## Rollback
//!
//! Given a backup directory, the engine writes an inverse artifact before
//! each mutation (an `.upd` snapshot, an `.add` copy of a deleted file or an
//! empty `.del` marker). On failure the backup directory is replayed as an
//! update package against the same target, undoing everything applied so
//! far.
//!
//! ## Example
//!
//! ```no_run
//! use patchkit::{PatchEngine, ShellScriptRunner, UnsupportedMerge};
//! use std::path::Path;
//!
//! let scripts = ShellScriptRunner::default();
//! let engine = PatchEngine::new(&scripts, &UnsupportedMerge);
//!
//! let outcome = engine.update_files(
//!     Path::new("/tmp/package"),
//!     Path::new("/opt/app"),
//!     Some(Path::new("/tmp/backup")),
//! );
//! if !outcome.is_success() {
//!     eprintln!("{}", outcome.diagnostic());
//! }
//! ```
//!
//! ## Capabilities
//!
//! Script execution and document merging are injected:
//!
//! - [`ScriptRunner`]: runs a script, returns its exit status and output
//! - [`MergeTransform`]: applies a transform onto a document in place
//!
//! Tests substitute recording doubles for both.

pub mod backup;
pub mod cleanup;
pub mod command;
pub mod engine;
mod error;
pub mod layout;
pub mod merge;
pub mod script;
pub mod types;

pub use backup::{BackupRecord, BackupRecorder};
pub use cleanup::{CleanupReport, remove_directory_contents};
pub use command::{CommandKind, ScriptStage, classify};
pub use engine::{PatchEngine, plan};
pub use error::{Error, Result};
pub use layout::{PackageEntry, scan_package};
pub use merge::{ExternalMergeTool, MergeTransform, UnsupportedMerge};
pub use script::{ScriptOutput, ScriptRunner, ShellScriptRunner};
pub use types::{PatchPlan, ROLLBACK_ERROR_MARKER, RollbackOutcome, UpdateOutcome, UpdateReport};
