use anyhow::{Result, bail};
use patchkit::remove_directory_contents;

use crate::Context;
use crate::cli::CleanArgs;
use crate::ui;

pub fn run(ctx: &Context, args: CleanArgs) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("Not a directory: {}", args.dir.display());
    }

    let report = remove_directory_contents(&args.dir, args.exclude.as_deref(), args.remove_root);

    if report.failures > 0 {
        ui::warn(&format!(
            "Cleaned {}: {}",
            args.dir.display(),
            ui::summarize_cleanup(&report)
        ));
    } else if !ctx.quiet {
        ui::success(&format!(
            "Cleaned {}: {}",
            args.dir.display(),
            ui::summarize_cleanup(&report)
        ));
    }
    if args.remove_root && !report.root_removed {
        ui::dim("Directory kept, it still has subdirectories");
    }
    Ok(())
}
