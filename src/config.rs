//! pakdrop configuration file
//!
//! Everything is optional; a missing file means defaults. Loaded once in
//! `main` and passed down explicitly.

use anyhow::{Context, Result};
use patchkit::{ExternalMergeTool, MergeTransform, ShellScriptRunner, UnsupportedMerge};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PakdropConfig {
    pub deploy: DeployConfig,
    pub service: ServiceConfig,
    pub scripts: ScriptsConfig,
    pub merge: MergeConfig,
}

/// `[deploy]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Installation directory packages are applied to
    pub target: Option<String>,
    /// Parent of the per-run backup directories
    pub backup_root: Option<String>,
    /// Parent of extracted zip packages
    pub staging_root: Option<String>,
    /// Delete the package after a successful deploy
    pub remove_package: bool,
    /// Process names killed after the service stops
    pub kill_processes: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            target: None,
            backup_root: None,
            staging_root: None,
            remove_package: true,
            kill_processes: Vec::new(),
        }
    }
}

/// `[service]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service stopped around a deploy
    pub name: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: None,
            timeout_secs: 30,
        }
    }
}

/// `[scripts]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Interpreter; the platform shell when unset
    pub shell: Option<String>,
    pub args: Vec<String>,
    /// Copy scripts to a temp file with this extension before running
    pub stage_extension: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `[merge]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// External transform tool; `.xmrg` files fail when unset
    pub program: Option<String>,
    pub args: Vec<String>,
}

impl PakdropConfig {
    /// Load from `path`, or defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn target(&self) -> Option<PathBuf> {
        self.deploy.target.as_deref().map(paths::expand)
    }

    pub fn backup_root(&self) -> PathBuf {
        self.deploy
            .backup_root
            .as_deref()
            .map_or_else(paths::default_backup_root, paths::expand)
    }

    pub fn staging_root(&self) -> PathBuf {
        self.deploy
            .staging_root
            .as_deref()
            .map_or_else(paths::default_staging_root, paths::expand)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_secs)
    }

    /// Build the script runner described by `[scripts]`
    pub fn script_runner(&self) -> ShellScriptRunner {
        let mut runner = match &self.scripts.shell {
            Some(shell) => ShellScriptRunner::new(shell).with_args(self.scripts.args.iter()),
            None => ShellScriptRunner::default(),
        };
        if let Some(extension) = &self.scripts.stage_extension {
            runner = runner.with_stage_extension(extension);
        }
        if let Some(secs) = self.scripts.timeout_secs {
            runner = runner.with_timeout(Duration::from_secs(secs));
        }
        runner
    }

    /// Build the merge capability described by `[merge]`
    pub fn merge_tool(&self) -> Box<dyn MergeTransform> {
        match &self.merge.program {
            Some(program) => Box::new(ExternalMergeTool::new(
                paths::expand(program),
                self.merge.args.clone(),
            )),
            None => Box::new(UnsupportedMerge),
        }
    }
}
