use anyhow::{Context as _, Result};
use patchkit::{PatchEngine, RollbackOutcome, UpdateOutcome};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let scripts = ctx.config.script_runner();
    let merge = ctx.config.merge_tool();
    let engine = PatchEngine::new(&scripts, merge.as_ref());

    if !ctx.quiet {
        ui::header("Applying update package");
        ui::kv("Source", &args.source.display().to_string());
        ui::kv("Target", &args.target.display().to_string());
        match &args.backup {
            Some(dir) => ui::kv("Backup", &dir.display().to_string()),
            None => ui::kv("Backup", "disabled (no rollback)"),
        }
        println!();
    }

    let outcome = engine.update_files(&args.source, &args.target, args.backup.as_deref());
    report_rollback(&outcome);

    let report = outcome
        .into_result()
        .with_context(|| format!("Failed to apply {}", args.source.display()))?;

    ui::success(&format!(
        "Applied {}: {}",
        args.source.display(),
        ui::summarize(&report)
    ));
    if ctx.verbose > 0 {
        ui::report(&report);
    }
    Ok(())
}

/// Tell the user what the engine's rollback did after a failure
pub fn report_rollback(outcome: &UpdateOutcome) {
    if let UpdateOutcome::Failed { error, .. } = outcome
        && error.is_script_error()
    {
        ui::dim("Script output is logged at info level, rerun with -v to see it");
    }
    match outcome {
        UpdateOutcome::Failed {
            rollback: RollbackOutcome::Succeeded(report),
            ..
        } => ui::warn(&format!("Rolled back: {}", ui::summarize(report))),
        UpdateOutcome::Failed {
            rollback: RollbackOutcome::Failed(_),
            ..
        } => ui::error("Rollback failed, the target needs manual recovery"),
        UpdateOutcome::Failed {
            rollback: RollbackOutcome::NotAttempted,
            ..
        } => ui::warn("No backup, changes applied before the failure were kept"),
        UpdateOutcome::Applied(_) => {}
    }
}
