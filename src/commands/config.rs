use anyhow::Result;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn show(ctx: &Context) -> Result<()> {
    ui::header("Configuration");
    ui::kv("Config file", &ctx.config_path.display().to_string());
    if !ctx.config_path.exists() {
        ui::dim("Not found, using defaults");
    }
    ui::kv("State dir", &paths::state_dir()?.display().to_string());
    ui::kv("Backup root", &ctx.config.backup_root().display().to_string());
    ui::kv("Staging root", &ctx.config.staging_root().display().to_string());

    ui::section("Effective settings");
    println!();
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}
