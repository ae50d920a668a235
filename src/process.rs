//! Centralized command execution with consistent error handling.
//!
//! Every external tool (aws, docker) is invoked through [`Cmd`], so all
//! invocations share the same stderr capture, timeout and error format.

use anyhow::{bail, Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Returned (inside `anyhow::Error`) when a command outlives its timeout.
///
/// The child is killed before this is reported.
#[derive(Debug, Error)]
#[error("'{program}' timed out after {}s", .after.as_secs())]
pub struct TimedOut {
    pub program: String,
    pub after: Duration,
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

enum Input {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    stdin: Option<Input>,
    timeout: Option<Duration>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
            allow_fail: false,
            error_prefix: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Feed bytes to the child's stdin. Meant for small inputs such as tokens.
    pub fn stdin_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(Input::Bytes(bytes.into()));
        self
    }

    /// Connect a file directly to the child's stdin.
    pub fn stdin_file(mut self, path: &Path) -> Self {
        self.stdin = Some(Input::File(path.to_path_buf()));
        self
    }

    /// Kill the command and fail with [`TimedOut`] if it runs longer than `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// The command line as it would be typed in a shell. Stdin is never shown.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Wire up stdin. Returns bytes that still need writing to the pipe.
    fn attach_stdin(&mut self, cmd: &mut Command) -> Result<Option<Vec<u8>>> {
        match self.stdin.take() {
            None => {
                cmd.stdin(Stdio::null());
                Ok(None)
            }
            Some(Input::File(path)) => {
                let file = std::fs::File::open(&path)
                    .with_context(|| format!("Failed to open {} for stdin", path.display()))?;
                cmd.stdin(Stdio::from(file));
                Ok(None)
            }
            Some(Input::Bytes(bytes)) => {
                cmd.stdin(Stdio::piped());
                Ok(Some(bytes))
            }
        }
    }

    fn failure_prefix(&self) -> String {
        self.error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.program))
    }

    /// Run the command and capture output.
    pub async fn run(mut self) -> Result<CommandResult> {
        let mut cmd = self.command();
        let pending = self.attach_stdin(&mut cmd)?;
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(command = %self.display(), "exec");
        let mut child = cmd.spawn().with_context(|| {
            format!("Failed to execute '{}'. Is it installed?", self.program)
        })?;

        if let Some(bytes) = pending {
            let mut pipe = child.stdin.take().context("child stdin was not captured")?;
            pipe.write_all(&bytes)
                .await
                .with_context(|| format!("Failed to write stdin of '{}'", self.program))?;
            drop(pipe);
        }

        let output = self.bounded(child.wait_with_output()).await?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self.failure_prefix();
            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            } else {
                bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
            }
        }

        Ok(result)
    }

    /// Run the command with stdout/stderr inherited (streaming).
    ///
    /// Output goes directly to the terminal. Use for long-running commands
    /// where the user should see progress (image builds, pushes).
    pub async fn run_interactive(mut self) -> Result<ExitStatus> {
        let mut cmd = self.command();
        let pending = self.attach_stdin(&mut cmd)?;
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        tracing::debug!(command = %self.display(), "exec (streaming)");
        let mut child = cmd.spawn().with_context(|| {
            format!("Failed to execute '{}'. Is it installed?", self.program)
        })?;

        if let Some(bytes) = pending {
            let mut pipe = child.stdin.take().context("child stdin was not captured")?;
            pipe.write_all(&bytes).await?;
            drop(pipe);
        }

        let status = self.bounded(child.wait()).await?;

        if !self.allow_fail && !status.success() {
            bail!(
                "{} (exit code {})",
                self.failure_prefix(),
                status.code().unwrap_or(-1)
            );
        }

        Ok(status)
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => res,
                // Dropping the future drops the child, and kill_on_drop reaps it.
                Err(_) => {
                    return Err(TimedOut {
                        program: self.program.clone(),
                        after: limit,
                    }
                    .into())
                }
            },
            None => fut.await,
        };
        waited.with_context(|| format!("Failed to wait for '{}'", self.program))
    }
}

// =============================================================================
// Convenience functions
// =============================================================================

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

/// Whether an error chain ends in a command timeout.
pub fn timed_out(err: &anyhow::Error) -> Option<&TimedOut> {
    err.downcast_ref::<TimedOut>()
}

// =============================================================================
// Tests
// =============================================================================
