use anyhow::{Context as _, Result};
use patchkit::PatchEngine;
use std::path::Path;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, backup: &Path, target: &Path) -> Result<()> {
    let scripts = ctx.config.script_runner();
    let merge = ctx.config.merge_tool();
    let engine = PatchEngine::new(&scripts, merge.as_ref());

    if !ctx.quiet {
        ui::header("Replaying backup");
        ui::kv("Backup", &backup.display().to_string());
        ui::kv("Target", &target.display().to_string());
        println!();
    }

    let report = engine
        .rollback(backup, target)
        .with_context(|| format!("Failed to replay {}", backup.display()))?;

    ui::success(&format!("Restored {}: {}", target.display(), ui::summarize(&report)));
    if report.scripts_skipped > 0 {
        ui::dim(&format!(
            "{} script(s) in the backup were not run",
            report.scripts_skipped
        ));
    }
    Ok(())
}
