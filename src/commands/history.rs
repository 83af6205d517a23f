use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::state::DeployState;
use crate::ui;

pub fn run(_ctx: &Context, limit: usize) -> Result<()> {
    let state = DeployState::load()?;

    ui::header("Deployments");
    if state.deployments.is_empty() {
        ui::dim("No deployments recorded");
        return Ok(());
    }

    for record in state.deployments.iter().rev().take(limit) {
        let mark = if record.success {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "{} {}  {} → {}",
            mark,
            record.finished_at.format("%Y-%m-%d %H:%M:%S"),
            record.package.display(),
            record.target.display()
        );
        if record.success {
            ui::dim(&format!("{} change(s)", record.changes));
        } else if let Some(error) = &record.error {
            for line in error.lines() {
                ui::dim(line);
            }
        }
        if record.needs_recovery {
            ui::warn("Rollback failed, manual recovery was needed");
            if let Some(backup) = &record.backup {
                ui::kv("Backup kept", &backup.display().to_string());
            }
        }
    }
    Ok(())
}
