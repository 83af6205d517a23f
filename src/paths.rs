//! Path resolution for pakdrop
//!
//! # Environment Variables
//!
//! - `PAKDROP_CONFIG` - Use this config file instead of the default one
//! - `PAKDROP_CONFIG_DIR` - Override config directory
//! - `PAKDROP_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PAKDROP_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/pakdrop` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\pakdrop`
//!    - macOS/Linux: `~/.config/pakdrop`
//!
//! For state_dir():
//! 1. `PAKDROP_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/pakdrop` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\pakdrop`
//!    - macOS/Linux: `~/.local/state/pakdrop`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the config file override
pub const ENV_CONFIG_FILE: &str = "PAKDROP_CONFIG";

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PAKDROP_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "PAKDROP_STATE_DIR";

const APP_DIR: &str = "pakdrop";

/// Get the pakdrop config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the pakdrop state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP_DIR);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Resolve the config file to load
///
/// An explicit `--config` path wins, then `PAKDROP_CONFIG`, then
/// `config.toml` inside [`config_dir`].
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(expand(&path.to_string_lossy()));
    }
    if let Ok(file) = std::env::var(ENV_CONFIG_FILE) {
        let path = expand(&file);
        log::debug!("Using config file from {}: {}", ENV_CONFIG_FILE, path.display());
        return Ok(path);
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Default root for per-run backup directories
pub fn default_backup_root() -> PathBuf {
    std::env::temp_dir().join(APP_DIR).join("backup")
}

/// Default root for extracted zip packages
pub fn default_staging_root() -> PathBuf {
    std::env::temp_dir().join(APP_DIR).join("staging")
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
