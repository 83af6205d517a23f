//! Script runner capability
//!
//! The engine only needs "run this script and tell me how it went". The
//! [`ScriptRunner`] trait keeps process spawning out of the engine so the
//! ordering and backup logic can be tested with a recording double.

use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Poll interval while waiting on a script with a timeout
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for output readers after a timed-out script is killed
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Captured result of a script run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Exit code, `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// The runner killed the process after its timeout elapsed
    pub timed_out: bool,
}

impl ScriptOutput {
    /// Output of a script that exited with `code`
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    /// Check if the script completed with exit code 0
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Executes an operating-system script
///
/// Implementations block until the script exits. A missing script must be
/// reported as [`Error::ScriptMissing`], never skipped. A non-zero exit is
/// not an error at this level; the caller inspects [`ScriptOutput`].
pub trait ScriptRunner {
    /// Run `script` with `working_dir` as the current directory
    fn run(&self, script: &Path, working_dir: &Path) -> Result<ScriptOutput>;
}

/// Runs scripts through the platform shell
///
/// On Unix this is `sh <script>`. On Windows `cmd /C` only executes files
/// with a batch extension, so the script is staged as a temporary `.bat`
/// copy first.
#[derive(Debug, Clone)]
pub struct ShellScriptRunner {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
    stage_extension: Option<String>,
}

impl Default for ShellScriptRunner {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                program: "cmd".into(),
                args: vec!["/C".into()],
                timeout: None,
                stage_extension: Some("bat".to_string()),
            }
        } else {
            Self::new("sh")
        }
    }
}

impl ShellScriptRunner {
    /// Run scripts as `<program> <script>`
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
            stage_extension: None,
        }
    }

    /// Extra arguments placed before the script path
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill scripts that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Copy each script to a temporary file with this extension before running it
    pub fn with_stage_extension(mut self, extension: &str) -> Self {
        self.stage_extension = Some(extension.trim_start_matches('.').to_string());
        self
    }

    fn stage(&self, script: &Path) -> Result<Option<PathBuf>> {
        let Some(extension) = &self.stage_extension else {
            return Ok(None);
        };

        let stem = script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_string());
        let staged = std::env::temp_dir().join(format!(
            "patchkit-{}-{}.{}",
            std::process::id(),
            stem,
            extension
        ));
        fs::copy(script, &staged).map_err(|e| Error::fs("stage script", &staged, e))?;
        Ok(Some(staged))
    }

    fn wait(&self, child: &mut Child, script: &Path) -> Result<(ExitStatus, bool)> {
        let Some(timeout) = self.timeout else {
            let status = child
                .wait()
                .map_err(|e| Error::fs("wait for script", script, e))?;
            return Ok((status, false));
        };

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok((status, false)),
                Ok(None) if started.elapsed() >= timeout => {
                    log::warn!(
                        "Script {} exceeded {:?}, killing it",
                        script.display(),
                        timeout
                    );
                    kill_process_group(child);
                    let status = child
                        .wait()
                        .map_err(|e| Error::fs("wait for script", script, e))?;
                    return Ok((status, true));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(Error::fs("wait for script", script, e)),
            }
        }
    }
}

impl ScriptRunner for ShellScriptRunner {
    fn run(&self, script: &Path, working_dir: &Path) -> Result<ScriptOutput> {
        if !script.is_file() {
            return Err(Error::ScriptMissing(script.to_path_buf()));
        }

        let staged = self.stage(script)?;
        let invoked = staged.as_deref().unwrap_or(script);
        let label = script
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::info!("Running script {}", script.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(invoked)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also reaches whatever the script started
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let spawned = command.spawn();

        let result = match spawned {
            Ok(mut child) => {
                let stdout = child
                    .stdout
                    .take()
                    .map(|out| forward_lines(out, label.clone(), false));
                let stderr = child
                    .stderr
                    .take()
                    .map(|err| forward_lines(err, label.clone(), true));

                self.wait(&mut child, script).map(|(status, timed_out)| {
                    // a killed script may leave descendants holding the pipes
                    let grace = timed_out.then_some(DRAIN_GRACE);
                    ScriptOutput {
                        exit_code: status.code(),
                        stdout: join_lines(stdout, grace),
                        stderr: join_lines(stderr, grace),
                        timed_out,
                    }
                })
            }
            Err(source) => Err(Error::ScriptSpawn {
                script: script.to_path_buf(),
                source,
            }),
        };

        if let Some(staged) = staged {
            if let Err(e) = fs::remove_file(&staged) {
                log::debug!("Could not remove staged script {}: {e}", staged.display());
            }
        }

        result
    }
}

/// Log each line of a child stream and collect it
///
/// The stream is drained to EOF whatever its encoding; invalid UTF-8 is
/// replaced rather than ending the read.
fn forward_lines<R>(stream: R, label: String, is_stderr: bool) -> JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut collected = String::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("[{label}] stopped reading output: {e}");
                    // keep the pipe open and drained so the child never sees SIGPIPE
                    let _ = std::io::copy(&mut reader, &mut std::io::sink());
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            if is_stderr {
                log::error!("[{label} err] {line}");
            } else {
                log::info!("[{label} out] {line}");
            }
            collected.push_str(line);
            collected.push('\n');
        }
        collected
    })
}

/// Collect a reader thread's output
///
/// With a `grace` period the thread is abandoned if it has not finished in
/// time.
fn join_lines(handle: Option<JoinHandle<String>>, grace: Option<Duration>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    if let Some(grace) = grace {
        let started = Instant::now();
        while !handle.is_finished() {
            if started.elapsed() >= grace {
                log::debug!("Output reader still busy after {grace:?}, abandoning it");
                return String::new();
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    handle.join().unwrap_or_default()
}

/// Kill the script and every process in its group
fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = i32::try_from(child.id()) {
            // SAFETY: kill(2) with a negative pid signals the group created at spawn
            let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
            if rc == 0 {
                return;
            }
        }
    }
    // fails if the process exited in the meantime
    let _ = child.kill();
}
