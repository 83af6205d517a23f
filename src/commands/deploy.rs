use anyhow::{Context as _, Result};
use patchkit::PatchEngine;

use crate::Context;
use crate::cli::DeployArgs;
use crate::commands::apply::report_rollback;
use crate::deploy::{DeployRequest, Deployer};
use crate::service::{NoServiceManager, ServiceManager, SystemctlServiceManager};
use crate::state::DeployState;
use crate::ui;

pub fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let request = build_request(ctx, args)?;

    let scripts = ctx.config.script_runner();
    let merge = ctx.config.merge_tool();
    let systemctl = SystemctlServiceManager::default();
    let services: &dyn ServiceManager = if request.service.is_some() {
        &systemctl
    } else {
        &NoServiceManager
    };
    let deployer = Deployer::new(PatchEngine::new(&scripts, merge.as_ref()), services);

    if !ctx.quiet {
        ui::header("Deploying update package");
        ui::kv("Package", &request.package.display().to_string());
        ui::kv("Target", &request.target.display().to_string());
        ui::kv("Service", request.service.as_deref().unwrap_or("none"));
        println!();
    }

    let result = deployer.run(&request)?;

    if let Err(e) = save_record(&result.to_record(&request)) {
        log::warn!("Could not record deployment: {e:#}");
    }
    if let Some(e) = &result.restart_error {
        ui::warn(&format!("Service did not come back: {e}"));
    }
    report_rollback(&result.outcome);
    if result.needs_recovery() {
        ui::kv("Backup kept", &result.backup_dir.display().to_string());
    }

    let report = result
        .outcome
        .into_result()
        .with_context(|| format!("Deploy of {} failed", request.package.display()))?;

    ui::success(&format!(
        "Deployed {}: {}",
        request.package.display(),
        ui::summarize(&report)
    ));
    if ctx.verbose > 0 {
        ui::report(&report);
    }
    Ok(())
}

fn build_request(ctx: &Context, args: DeployArgs) -> Result<DeployRequest> {
    let config = &ctx.config;
    let target = args
        .target
        .or_else(|| config.target())
        .context("No target directory: pass --target or set [deploy] target")?;

    Ok(DeployRequest {
        package: args.package,
        target,
        backup_root: config.backup_root(),
        staging_root: config.staging_root(),
        service: args.service.or_else(|| config.service.name.clone()),
        service_timeout: config.service_timeout(),
        kill_processes: config.deploy.kill_processes.clone(),
        remove_package: config.deploy.remove_package && !args.keep_package,
    })
}

fn save_record(record: &crate::state::DeployRecord) -> Result<()> {
    let mut state = DeployState::load()?;
    state.record(record.clone());
    state.save()
}
