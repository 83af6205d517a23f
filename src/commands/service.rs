use anyhow::Result;
use colored::Colorize;
use std::time::Duration;

use crate::Context;
use crate::cli::ServiceCommand;
use crate::service::{ServiceManager, ServiceStatus, SystemctlServiceManager};
use crate::ui;

pub fn run(ctx: &Context, cmd: ServiceCommand) -> Result<()> {
    let manager = SystemctlServiceManager::default();
    let timeout = |secs: Option<u64>| secs.map_or_else(|| ctx.config.service_timeout(), Duration::from_secs);

    match cmd {
        ServiceCommand::Start { name, timeout: secs } => {
            manager.start(&name, timeout(secs))?;
            ui::success(&format!("{name} is running"));
        }
        ServiceCommand::Stop { name, timeout: secs } => {
            manager.stop(&name, timeout(secs))?;
            ui::success(&format!("{name} is stopped"));
        }
        ServiceCommand::Status { name } => {
            let status = manager.status(&name)?;
            let label = match &status {
                ServiceStatus::Running => status.to_string().green(),
                ServiceStatus::Stopped => status.to_string().red(),
                _ => status.to_string().yellow(),
            };
            println!("{name}: {label}");
        }
    }
    Ok(())
}
