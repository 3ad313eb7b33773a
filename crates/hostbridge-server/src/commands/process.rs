//! Subprocess execution behind a trait, so handlers can be tested without
//! spawning anything.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::CommandError;

/// What to run. Arguments are passed directly, never through a shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory, if not the daemon's.
    pub working_dir: Option<String>,
}

impl ProcessSpec {
    /// Spec for `program` with `args`.
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }
}

/// Output from a completed subprocess.
#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (`-1` when killed by a signal).
    pub exit_code: i32,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Subprocess execution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion and capture output. Dropping the future kills the
    /// child.
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, CommandError>;

    /// Start without waiting. Returns the child's pid when known.
    fn spawn_detached(&self, spec: &ProcessSpec) -> Result<Option<u32>, CommandError>;
}

/// Real subprocess execution backed by `tokio::process::Command`.
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn command(spec: &ProcessSpec) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&spec.program);
        let _ = cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.working_dir {
            let _ = cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, CommandError> {
        let start = Instant::now();
        let mut cmd = Self::command(spec);
        let _ = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %spec.program, args = ?spec.args, "spawning process");
        let output = cmd
            .output()
            .await
            .map_err(|e| CommandError::Failed(format!("failed to run {}: {e}", spec.program)))?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(program = %spec.program, exit_code, duration_ms, "process completed");

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            duration_ms,
        })
    }

    fn spawn_detached(&self, spec: &ProcessSpec) -> Result<Option<u32>, CommandError> {
        let mut cmd = Self::command(spec);
        let _ = cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let mut child = cmd
            .spawn()
            .map_err(|e| CommandError::Failed(format!("failed to start {}: {e}", spec.program)))?;
        let pid = child.id();
        let program = spec.program.clone();
        // Reap the child so it does not linger as a zombie.
        drop(tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    warn!(program, ?status, "detached process exited with failure");
                }
                Ok(_) => debug!(program, "detached process exited"),
                Err(e) => warn!(program, error = %e, "failed to wait for detached process"),
            }
        }));
        Ok(pid)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_echo() {
        let out = TokioProcessRunner
            .run(&ProcessSpec::new("echo", ["hello"]))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn run_reports_exit_code() {
        let out = TokioProcessRunner
            .run(&ProcessSpec::new("sh", ["-c", "exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn run_respects_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = ProcessSpec::new("pwd", Vec::<String>::new());
        spec.working_dir = Some(dir.path().to_string_lossy().into_owned());
        let out = TokioProcessRunner.run(&spec).await.unwrap();
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn missing_program_is_error() {
        let result = TokioProcessRunner
            .run(&ProcessSpec::new("definitely-not-a-real-binary-xyz", Vec::<String>::new()))
            .await;
        assert!(matches!(result, Err(CommandError::Failed(_))));
    }

    #[tokio::test]
    async fn detached_returns_pid() {
        let pid = TokioProcessRunner
            .spawn_detached(&ProcessSpec::new("true", Vec::<String>::new()))
            .unwrap();
        assert!(pid.is_some());
    }
}
