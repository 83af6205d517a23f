use anyhow::Result;
use patchkit::PackageEntry;
use std::path::Path;

use crate::Context;
use crate::ui;

const PATH_WIDTH: usize = 60;

pub fn run(_ctx: &Context, source: &Path) -> Result<()> {
    let plan = patchkit::plan(source)?;

    ui::header(&format!("Plan for {}", source.display()));
    if plan.is_empty() {
        ui::dim("No recognised package files");
        return Ok(());
    }

    let total = plan.len();
    let mut num = 0;
    for (title, entries) in [
        ("Before (.eini)", &plan.before),
        ("Files", &plan.files),
        ("After (.eend)", &plan.after),
    ] {
        if entries.is_empty() {
            continue;
        }
        ui::section(title);
        for entry in entries {
            num += 1;
            ui::step(num, total, &describe(entry));
        }
    }

    println!();
    ui::info(&format!("{total} entr{}", if total == 1 { "y" } else { "ies" }));
    Ok(())
}

fn describe(entry: &PackageEntry) -> String {
    format!(
        "{:<8} {}",
        entry.kind.label(),
        ui::truncate_path(&entry.display_path(), PATH_WIDTH)
    )
}
