//! Test-runner invocation behind a port interface.
//!
//! The [`TestRunner`] trait decouples the scoring pipeline from the actual
//! test tool (pytest with its JSON report plugin). Pipeline tests use
//! scripted runners that write canned reports without spawning processes.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// The runner itself misbehaving, as opposed to tests failing. A failing
/// test is expected, normal output.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("test run exceeded {timeout_secs}s and was killed")]
    TimedOut { timeout_secs: u64 },
    #[error("failed to spawn test runner: {0}")]
    Spawn(String),
    #[error("test runner crashed: {0}")]
    Crashed(String),
    #[error("test runner exited with unexpected status {exit_code}: {stderr}")]
    UnexpectedExit { exit_code: i32, stderr: String },
    #[error("test runner wrote no report at {0}")]
    MissingReport(PathBuf),
}

/// Limits on one runner invocation.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    /// Maximum wall-clock time before killing the run. Patched test code
    /// may contain infinite loops; hanging forever is not an option.
    pub timeout: Duration,
    /// Maximum bytes of runner output kept for diagnostics.
    pub output_limit_bytes: usize,
}

impl ExecutionLimits {
    pub fn new(timeout_secs: u64, output_limit_bytes: usize) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            output_limit_bytes,
        }
    }
}

/// Port over the external test runner.
pub trait TestRunner {
    /// Run the tests selected by `selector`, writing a machine-parseable
    /// report to `report_path`. Returns Ok whether or not tests passed.
    fn run(&self, selector: &str, report_path: &Path) -> Result<(), ExecutionError>;
}

/// Spawns the configured pytest command with JSON-report output against
/// the reference tree working directory.
pub struct PytestRunner {
    command: Vec<String>,
    workdir: PathBuf,
    limits: ExecutionLimits,
}

impl PytestRunner {
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>, limits: ExecutionLimits) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            limits,
        }
    }
}

impl TestRunner for PytestRunner {
    #[instrument(skip_all, fields(selector, timeout_secs = self.limits.timeout.as_secs()))]
    fn run(&self, selector: &str, report_path: &Path) -> Result<(), ExecutionError> {
        debug!(workdir = %self.workdir.display(), "starting test run");
        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(selector)
            .arg("--json-report")
            .arg(format!("--json-report-file={}", report_path.display()))
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ExecutionError::Spawn(err.to_string()))?;

        let status = match child
            .wait_timeout(self.limits.timeout)
            .map_err(|err| ExecutionError::Crashed(err.to_string()))?
        {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = self.limits.timeout.as_secs(),
                    "test run timed out, killing"
                );
                child.kill().ok();
                child
                    .wait()
                    .map_err(|err| ExecutionError::Crashed(err.to_string()))?;
                return Err(ExecutionError::TimedOut {
                    timeout_secs: self.limits.timeout.as_secs(),
                });
            }
        };

        let stderr = read_limited(child.stderr.take(), self.limits.output_limit_bytes);
        match status.code() {
            // pytest: 0 = all passed, 1 = some tests failed. Both are
            // normal report-producing outcomes.
            Some(0) | Some(1) => {}
            Some(code) => {
                warn!(exit_code = code, "test runner exited abnormally");
                return Err(ExecutionError::UnexpectedExit {
                    exit_code: code,
                    stderr,
                });
            }
            None => {
                return Err(ExecutionError::Crashed(
                    "killed by signal before exiting".to_string(),
                ));
            }
        }

        if !report_path.exists() {
            return Err(ExecutionError::MissingReport(report_path.to_path_buf()));
        }
        debug!(report = %report_path.display(), "test run produced report");
        Ok(())
    }
}

fn read_limited<R: Read>(stream: Option<R>, limit: usize) -> String {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).ok();
    }
    buf.truncate(limit);
    String::from_utf8_lossy(&buf).to_string()
}
