//! Service manager collaborator
//!
//! A deploy stops the installed application's service before touching its
//! files and starts it again afterwards.

use std::fmt;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service {0} is not installed")]
    NotFound(String),

    #[error("service {name} did not reach {desired} within {waited:?}")]
    Timeout {
        name: String,
        desired: ServiceStatus,
        waited: Duration,
    },

    #[error("{command} failed for service {name}: {reason}")]
    CommandFailed {
        name: String,
        command: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    Starting,
    Stopping,
    Unknown(String),
}

impl ServiceStatus {
    /// Map `systemctl is-active` output to a status
    pub fn from_systemd(state: &str) -> Self {
        match state.trim() {
            "active" | "reloading" => Self::Running,
            "inactive" | "failed" => Self::Stopped,
            "activating" => Self::Starting,
            "deactivating" => Self::Stopping,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Stopping => write!(f, "stopping"),
            Self::Unknown(state) => write!(f, "unknown ({state})"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Starts and stops the service that owns a deploy target
pub trait ServiceManager {
    /// Start `name` and wait until it runs; no-op if already running or starting
    fn start(&self, name: &str, timeout: Duration) -> Result<()>;

    /// Stop `name` and wait until it is stopped; no-op if already stopped or stopping
    fn stop(&self, name: &str, timeout: Duration) -> Result<()>;

    fn status(&self, name: &str) -> Result<ServiceStatus>;

    /// Kill leftover processes named `process`, returning whether any matched
    fn kill_processes(&self, process: &str) -> Result<bool> {
        kill_by_name(process)
    }
}

/// systemd via `systemctl`
#[derive(Debug, Clone)]
pub struct SystemctlServiceManager {
    program: String,
    poll_interval: Duration,
}

impl Default for SystemctlServiceManager {
    fn default() -> Self {
        Self {
            program: "systemctl".to_string(),
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl SystemctlServiceManager {
    fn command_failed(name: &str, command: &str, reason: impl Into<String>) -> ServiceError {
        ServiceError::CommandFailed {
            name: name.to_string(),
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    fn ensure_installed(&self, name: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .args(["show", "--property=LoadState", "--value", name])
            .output()
            .map_err(|e| Self::command_failed(name, "systemctl show", e.to_string()))?;

        let state = String::from_utf8_lossy(&output.stdout);
        if state.trim() == "not-found" {
            return Err(ServiceError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn control(&self, action: &str, name: &str) -> Result<()> {
        log::info!("systemctl {action} {name}");
        let output = Command::new(&self.program)
            .args([action, name])
            .output()
            .map_err(|e| Self::command_failed(name, &format!("systemctl {action}"), e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Self::command_failed(
                name,
                &format!("systemctl {action}"),
                stderr.trim(),
            ))
        }
    }
}

impl ServiceManager for SystemctlServiceManager {
    fn start(&self, name: &str, timeout: Duration) -> Result<()> {
        self.ensure_installed(name)?;
        if matches!(
            self.status(name)?,
            ServiceStatus::Running | ServiceStatus::Starting
        ) {
            log::debug!("{name} already running");
            return Ok(());
        }
        self.control("start", name)?;
        wait_for(name, &ServiceStatus::Running, timeout, self.poll_interval, || {
            self.status(name)
        })
    }

    fn stop(&self, name: &str, timeout: Duration) -> Result<()> {
        self.ensure_installed(name)?;
        if matches!(
            self.status(name)?,
            ServiceStatus::Stopped | ServiceStatus::Stopping
        ) {
            log::debug!("{name} already stopped");
            return Ok(());
        }
        self.control("stop", name)?;
        wait_for(name, &ServiceStatus::Stopped, timeout, self.poll_interval, || {
            self.status(name)
        })
    }

    fn status(&self, name: &str) -> Result<ServiceStatus> {
        // is-active exits non-zero for anything but "active", stdout is what counts
        let output = Command::new(&self.program)
            .args(["is-active", name])
            .output()
            .map_err(|e| Self::command_failed(name, "systemctl is-active", e.to_string()))?;

        Ok(ServiceStatus::from_systemd(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

/// No service configured: every call succeeds without doing anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServiceManager;

impl ServiceManager for NoServiceManager {
    fn start(&self, _name: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn stop(&self, _name: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn status(&self, _name: &str) -> Result<ServiceStatus> {
        Ok(ServiceStatus::Unknown("no service manager".to_string()))
    }
}

/// Kill every process whose name is exactly `process`
pub fn kill_by_name(process: &str) -> Result<bool> {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("taskkill");
        c.args(["/F", "/IM", process]);
        c
    } else {
        let mut c = Command::new("pkill");
        c.args(["-x", process]);
        c
    };

    let status = command.status().map_err(|e| ServiceError::CommandFailed {
        name: process.to_string(),
        command: "kill".to_string(),
        reason: e.to_string(),
    })?;

    // pkill exits 1 and taskkill 128 when nothing matched
    match status.code() {
        Some(0) => {
            log::info!("Killed running {process} processes");
            Ok(true)
        }
        Some(1 | 128) => Ok(false),
        _ => Err(ServiceError::CommandFailed {
            name: process.to_string(),
            command: "kill".to_string(),
            reason: format!("exited with {status}"),
        }),
    }
}

/// Poll `status` until it reports `desired` or `timeout` passes
fn wait_for<F>(
    name: &str,
    desired: &ServiceStatus,
    timeout: Duration,
    interval: Duration,
    mut status: F,
) -> Result<()>
where
    F: FnMut() -> Result<ServiceStatus>,
{
    let started = Instant::now();
    loop {
        let current = status()?;
        if &current == desired {
            log::debug!("{name} is {current} after {:?}", started.elapsed());
            return Ok(());
        }
        if started.elapsed() >= timeout {
            return Err(ServiceError::Timeout {
                name: name.to_string(),
                desired: desired.clone(),
                waited: started.elapsed(),
            });
        }
        log::trace!("{name} is {current}, waiting for {desired}");
        thread::sleep(interval);
    }
}
