//! Deployment orchestration
//!
//! Wraps a single engine run with the steps around it: stop the owning
//! service, stage the package, allocate a backup directory, apply, clean up
//! and start the service again. The engine's own rollback is the only one;
//! the backup tree is never replayed a second time here.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use patchkit::{PatchEngine, RollbackOutcome, UpdateOutcome, remove_directory_contents};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::package::{self, StagedPackage};
use crate::paths;
use crate::service::{ServiceError, ServiceManager};
use crate::state::DeployRecord;

/// Everything a deploy needs, resolved from config and CLI flags
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub package: PathBuf,
    pub target: PathBuf,
    pub backup_root: PathBuf,
    pub staging_root: PathBuf,
    pub service: Option<String>,
    pub service_timeout: Duration,
    pub kill_processes: Vec<String>,
    /// Delete the package once it has been applied
    pub remove_package: bool,
}

/// Result of a deploy that got as far as running the engine
#[derive(Debug)]
pub struct DeployResult {
    pub outcome: UpdateOutcome,
    pub package: StagedPackage,
    pub backup_dir: PathBuf,
    /// Starting the service afterwards failed
    pub restart_error: Option<ServiceError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeployResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// The rollback failed as well; `backup_dir` was kept for manual recovery
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self.outcome,
            UpdateOutcome::Failed {
                rollback: RollbackOutcome::Failed(_),
                ..
            }
        )
    }

    /// History entry for the state file
    pub fn to_record(&self, request: &DeployRequest) -> DeployRecord {
        let (changes, error) = match &self.outcome {
            UpdateOutcome::Applied(report) => (report.total_changes(), None),
            UpdateOutcome::Failed { .. } => (0, Some(self.outcome.diagnostic())),
        };
        let needs_recovery = self.needs_recovery();
        DeployRecord {
            package: request.package.clone(),
            target: request.target.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            success: self.is_success(),
            changes,
            error,
            needs_recovery,
            backup: needs_recovery.then(|| self.backup_dir.clone()),
        }
    }
}

pub struct Deployer<'a> {
    engine: PatchEngine<'a>,
    services: &'a dyn ServiceManager,
}

impl<'a> Deployer<'a> {
    pub fn new(engine: PatchEngine<'a>, services: &'a dyn ServiceManager) -> Self {
        Self { engine, services }
    }

    /// Run one deploy
    ///
    /// Errors before the engine runs (service stop, staging, backup
    /// allocation) are returned as `Err`. An engine failure is a successful
    /// call with a failed [`DeployResult::outcome`]. Once the service was
    /// stopped it is always started again.
    pub fn run(&self, request: &DeployRequest) -> Result<DeployResult> {
        let started_at = Utc::now();

        if let Some(name) = &request.service {
            self.services
                .stop(name, request.service_timeout)
                .with_context(|| format!("Failed to stop service {name}"))?;
            log::info!("Stopped {name}");
        }

        for process in &request.kill_processes {
            if let Err(e) = self.services.kill_processes(process) {
                log::error!("Could not kill {process}: {e}");
            }
        }

        let applied = self.apply(request);
        let restart_error = self.restart(request);
        let (package, backup_dir, outcome) = applied?;

        Ok(DeployResult {
            outcome,
            package,
            backup_dir,
            restart_error,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn apply(&self, request: &DeployRequest) -> Result<(StagedPackage, PathBuf, UpdateOutcome)> {
        let package = package::stage(&request.package, &request.staging_root)?;
        let backup_dir = match allocate_backup_dir(&request.backup_root) {
            Ok(dir) => dir,
            Err(e) => {
                discard_staging(&package);
                return Err(e);
            }
        };

        log::info!(
            "Deploying {} to {} (backup in {})",
            package.root.display(),
            request.target.display(),
            backup_dir.display()
        );
        let outcome = self
            .engine
            .update_files(&package.root, &request.target, Some(&backup_dir));

        if let UpdateOutcome::Failed {
            rollback: RollbackOutcome::Failed(_),
            ..
        } = &outcome
        {
            log::error!(
                "Rollback failed, keeping backup {} for manual recovery",
                backup_dir.display()
            );
        } else {
            remove_directory_contents(&backup_dir, None, true);
        }
        if outcome.is_success() {
            if request.remove_package {
                remove_package(&package);
            } else {
                discard_staging(&package);
            }
        } else {
            log::error!("{}", outcome.diagnostic());
            log::warn!("Keeping {} for inspection", package.origin.display());
            discard_staging(&package);
        }

        Ok((package, backup_dir, outcome))
    }

    fn restart(&self, request: &DeployRequest) -> Option<ServiceError> {
        let name = request.service.as_ref()?;
        match self.services.start(name, request.service_timeout) {
            Ok(()) => {
                log::info!("Started {name}");
                None
            }
            Err(e) => {
                log::error!("Failed to start {name}: {e}");
                Some(e)
            }
        }
    }
}

/// Create a fresh `<root>/<timestamp>-<pid>` directory
///
/// Falls back to the default backup root under the temp dir when `root`
/// cannot be created.
pub fn allocate_backup_dir(root: &Path) -> Result<PathBuf> {
    let name = format!(
        "{}-{}",
        Local::now().format("%Y%m%d-%H%M%S"),
        std::process::id()
    );

    match create_unique_dir(root, &name) {
        Ok(dir) => Ok(dir),
        Err(e) => {
            let fallback = paths::default_backup_root();
            log::warn!(
                "Cannot use backup root {} ({e}), falling back to {}",
                root.display(),
                fallback.display()
            );
            create_unique_dir(&fallback, &name).with_context(|| {
                format!("Failed to create backup directory under {}", fallback.display())
            })
        }
    }
}

fn create_unique_dir(root: &Path, name: &str) -> std::io::Result<PathBuf> {
    let mut dir = root.join(name);
    let mut attempt = 1;
    while dir.exists() {
        dir = root.join(format!("{name}-{attempt}"));
        attempt += 1;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Delete a consumed package, archive included
fn remove_package(package: &StagedPackage) {
    for path in package.removable_paths() {
        if path.is_dir() {
            remove_directory_contents(path, None, true);
        } else if let Err(e) = fs::remove_file(path) {
            log::warn!("Could not remove {}: {e}", path.display());
        }
    }
}

/// Delete the extraction directory of an archive, leaving the archive
fn discard_staging(package: &StagedPackage) {
    if package.extracted {
        remove_directory_contents(&package.root, None, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceStatus;
    use patchkit::{ScriptOutput, ScriptRunner, UnsupportedMerge};
    use std::cell::RefCell;
    use std::io::Write;
    use tempfile::TempDir;

    /// Scripts exit with a fixed code
    struct StubScripts(i32);

    impl ScriptRunner for StubScripts {
        fn run(&self, _script: &Path, _working_dir: &Path) -> patchkit::Result<ScriptOutput> {
            Ok(ScriptOutput::exited(self.0))
        }
    }

    #[derive(Default)]
    struct MockServices {
        events: RefCell<Vec<String>>,
        fail_stop: bool,
    }

    impl ServiceManager for MockServices {
        fn start(&self, name: &str, _timeout: Duration) -> crate::service::Result<()> {
            self.events.borrow_mut().push(format!("start {name}"));
            Ok(())
        }

        fn stop(&self, name: &str, timeout: Duration) -> crate::service::Result<()> {
            self.events.borrow_mut().push(format!("stop {name}"));
            if self.fail_stop {
                return Err(ServiceError::Timeout {
                    name: name.to_string(),
                    desired: ServiceStatus::Stopped,
                    waited: timeout,
                });
            }
            Ok(())
        }

        fn status(&self, _name: &str) -> crate::service::Result<ServiceStatus> {
            Ok(ServiceStatus::Running)
        }

        fn kill_processes(&self, process: &str) -> crate::service::Result<bool> {
            self.events.borrow_mut().push(format!("kill {process}"));
            Ok(false)
        }
    }

    struct Fixture {
        tmp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            for dir in ["package", "target", "backups", "staging"] {
                fs::create_dir_all(tmp.path().join(dir)).unwrap();
            }
            Self { tmp }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.tmp.path().join(rel)
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn request(&self) -> DeployRequest {
            DeployRequest {
                package: self.path("package"),
                target: self.path("target"),
                backup_root: self.path("backups"),
                staging_root: self.path("staging"),
                service: Some("app".to_string()),
                service_timeout: Duration::from_secs(1),
                kill_processes: vec!["psample".to_string()],
                remove_package: true,
            }
        }

        fn is_empty(&self, rel: &str) -> bool {
            fs::read_dir(self.path(rel)).unwrap().next().is_none()
        }
    }

    fn deploy(request: &DeployRequest, exit_code: i32, services: &MockServices) -> Result<DeployResult> {
        let scripts = StubScripts(exit_code);
        let engine = PatchEngine::new(&scripts, &UnsupportedMerge);
        Deployer::new(engine, services).run(request)
    }

    #[test]
    fn test_successful_deploy() {
        let fx = Fixture::new();
        fx.write("target/app.txt", "v1");
        fx.write("package/app.txt.upd", "v2");
        fx.write("package/bin/tool.add", "tool");
        let services = MockServices::default();

        let request = fx.request();
        let result = deploy(&request, 0, &services).unwrap();

        assert!(result.is_success());
        assert_eq!(fs::read_to_string(fx.path("target/app.txt")).unwrap(), "v2");
        assert!(fx.path("target/bin/tool").exists());
        assert_eq!(
            *services.events.borrow(),
            vec!["stop app", "kill psample", "start app"]
        );
        assert!(!result.backup_dir.exists());
        assert!(fx.is_empty("backups"));
        assert!(!fx.path("package").exists());

        let record = result.to_record(&request);
        assert!(record.success);
        assert_eq!(record.changes, 2);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_failed_deploy_rolls_back_and_keeps_package() {
        let fx = Fixture::new();
        fx.write("target/app.txt", "v1");
        fx.write("package/app.txt.upd", "v2");
        fx.write("package/new.txt.add", "new");
        fx.write("package/migrate.eend", "exit 2");
        let services = MockServices::default();

        let request = fx.request();
        let result = deploy(&request, 2, &services).unwrap();

        assert!(!result.is_success());
        assert_eq!(fs::read_to_string(fx.path("target/app.txt")).unwrap(), "v1");
        assert!(!fx.path("target/new.txt").exists());
        assert!(fx.path("package/migrate.eend").exists());
        assert!(!result.backup_dir.exists());
        assert_eq!(services.events.borrow().last().unwrap(), "start app");

        let record = result.to_record(&request);
        assert!(!record.success);
        assert!(!record.needs_recovery);
        assert!(record.error.unwrap().contains("migrate"));
    }

    /// Turns `data/x` in the target into a directory, so replaying its
    /// `.del` marker fails
    struct BlockingScripts {
        target: PathBuf,
    }

    impl ScriptRunner for BlockingScripts {
        fn run(&self, _script: &Path, _working_dir: &Path) -> patchkit::Result<ScriptOutput> {
            let x = self.target.join("data/x");
            fs::remove_file(&x).unwrap();
            fs::create_dir_all(x.join("inner")).unwrap();
            Ok(ScriptOutput::exited(1))
        }
    }

    #[test]
    fn test_failed_rollback_keeps_backup() {
        let fx = Fixture::new();
        fx.write("target/keep.cfg", "ORIGINAL");
        fx.write("package/keep.cfg.upd", "NEW");
        fx.write("package/data/x.add", "x");
        fx.write("package/zz.exc", "exit 1");
        let services = MockServices::default();
        let request = fx.request();

        let scripts = BlockingScripts {
            target: fx.path("target"),
        };
        let engine = PatchEngine::new(&scripts, &UnsupportedMerge);
        let result = Deployer::new(engine, &services).run(&request).unwrap();

        assert!(!result.is_success());
        assert!(result.needs_recovery());
        assert!(result.backup_dir.is_dir());
        assert_eq!(
            fs::read_to_string(result.backup_dir.join("keep.cfg.upd")).unwrap(),
            "ORIGINAL"
        );
        assert!(fx.path("package/keep.cfg.upd").exists());
        assert_eq!(services.events.borrow().last().unwrap(), "start app");

        let record = result.to_record(&request);
        assert!(record.needs_recovery);
        assert_eq!(record.backup.as_deref(), Some(result.backup_dir.as_path()));
        assert!(record.error.unwrap().contains("Rollback Error =>"));
    }

    #[test]
    fn test_keep_package() {
        let fx = Fixture::new();
        fx.write("package/a.txt.add", "a");
        let mut request = fx.request();
        request.remove_package = false;

        let result = deploy(&request, 0, &MockServices::default()).unwrap();

        assert!(result.is_success());
        assert!(fx.path("package/a.txt.add").exists());
    }

    #[test]
    fn test_stop_failure_aborts_before_changes() {
        let fx = Fixture::new();
        fx.write("package/a.txt.add", "a");
        let services = MockServices {
            fail_stop: true,
            ..Default::default()
        };

        let err = deploy(&fx.request(), 0, &services).unwrap_err();

        assert!(err.to_string().contains("Failed to stop service app"));
        assert!(!fx.path("target/a.txt").exists());
        assert_eq!(*services.events.borrow(), vec!["stop app"]);
    }

    #[test]
    fn test_staging_failure_still_restarts_service() {
        let fx = Fixture::new();
        let mut request = fx.request();
        request.package = fx.path("missing.zip");
        let services = MockServices::default();

        assert!(deploy(&request, 0, &services).is_err());
        assert_eq!(services.events.borrow().last().unwrap(), "start app");
    }

    #[test]
    fn test_without_service() {
        let fx = Fixture::new();
        fx.write("package/a.txt.add", "a");
        let mut request = fx.request();
        request.service = None;
        request.kill_processes.clear();
        let services = MockServices::default();

        let result = deploy(&request, 0, &services).unwrap();

        assert!(result.is_success());
        assert!(result.restart_error.is_none());
        assert!(services.events.borrow().is_empty());
    }

    #[test]
    fn test_zip_package_is_removed_after_deploy() {
        let fx = Fixture::new();
        let archive = fx.path("release.zip");
        {
            let file = fs::File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("conf/app.ini.add", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"[app]").unwrap();
            zip.finish().unwrap();
        }
        let mut request = fx.request();
        request.package = archive.clone();

        let result = deploy(&request, 0, &MockServices::default()).unwrap();

        assert!(result.is_success());
        assert_eq!(
            fs::read_to_string(fx.path("target/conf/app.ini")).unwrap(),
            "[app]"
        );
        assert!(!archive.exists());
        assert!(fx.is_empty("staging"));
    }

    #[test]
    fn test_backup_dirs_are_unique() {
        let fx = Fixture::new();
        let first = allocate_backup_dir(&fx.path("backups")).unwrap();
        let second = allocate_backup_dir(&fx.path("backups")).unwrap();

        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
    }

    #[test]
    fn test_backup_root_falls_back_to_temp() {
        let fx = Fixture::new();
        fx.write("not-a-dir", "x");

        let dir = allocate_backup_dir(&fx.path("not-a-dir/backups")).unwrap();

        assert!(dir.starts_with(paths::default_backup_root()));
        fs::remove_dir_all(dir).unwrap();
    }
}
