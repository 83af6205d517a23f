//! Command classification by file suffix
//!
//! Every file in an update package is named `<logicalName>.<suffix>`. The
//! suffix alone decides what happens to the logical file.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Operation encoded by a package file's suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// `.add` - copy the file into the target
    AddFile,
    /// `.upd` - overwrite the target file
    UpdateFile,
    /// `.del` - remove the target file
    DeleteFile,
    /// `.xmrg` - apply a structured-document transform onto the target
    MergeDocument,
    /// `.exc` - run a script during the per-file phase
    ExecuteScript,
    /// `.eini` - run a script before any per-file command
    ExecuteScriptBefore,
    /// `.eend` - run a script after every per-file command
    ExecuteScriptAfter,
    /// `.params` - reserved, never dispatched
    ScriptParams,
}

/// When a script runs relative to the per-file commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptStage {
    Before,
    During,
    After,
}

impl CommandKind {
    /// All command kinds, in suffix-table order
    pub const ALL: [CommandKind; 8] = [
        CommandKind::AddFile,
        CommandKind::UpdateFile,
        CommandKind::DeleteFile,
        CommandKind::MergeDocument,
        CommandKind::ExecuteScript,
        CommandKind::ExecuteScriptBefore,
        CommandKind::ExecuteScriptAfter,
        CommandKind::ScriptParams,
    ];

    /// Canonical suffix, lower case, without the leading dot
    pub fn suffix(self) -> &'static str {
        match self {
            Self::AddFile => "add",
            Self::UpdateFile => "upd",
            Self::DeleteFile => "del",
            Self::MergeDocument => "xmrg",
            Self::ExecuteScript => "exc",
            Self::ExecuteScriptBefore => "eini",
            Self::ExecuteScriptAfter => "eend",
            Self::ScriptParams => "params",
        }
    }

    /// Look up a suffix (with or without the leading dot), ignoring case
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let suffix = suffix.strip_prefix('.').unwrap_or(suffix);
        Self::ALL
            .into_iter()
            .find(|kind| kind.suffix().eq_ignore_ascii_case(suffix))
    }

    /// Whether this command runs an external script
    pub fn is_script(self) -> bool {
        self.stage().is_some()
    }

    /// Execution stage for script commands, `None` for file commands
    pub fn stage(self) -> Option<ScriptStage> {
        match self {
            Self::ExecuteScriptBefore => Some(ScriptStage::Before),
            Self::ExecuteScript => Some(ScriptStage::During),
            Self::ExecuteScriptAfter => Some(ScriptStage::After),
            _ => None,
        }
    }

    /// Human-readable verb for logs and plans
    pub fn label(self) -> &'static str {
        match self {
            Self::AddFile => "add",
            Self::UpdateFile => "update",
            Self::DeleteFile => "delete",
            Self::MergeDocument => "merge",
            Self::ExecuteScript => "run script",
            Self::ExecuteScriptBefore => "run initial script",
            Self::ExecuteScriptAfter => "run end script",
            Self::ScriptParams => "script params",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".{}", self.suffix())
    }
}

/// Classify a package file by the final extension of its name
///
/// Files without a recognized suffix yield `None` and are ignored.
pub fn classify(path: &Path) -> Option<CommandKind> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(CommandKind::from_suffix)
}
