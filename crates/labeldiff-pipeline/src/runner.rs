//! Bounded execution of external commands.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

/// An external command with its deadline.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    /// Zero disables the deadline.
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn display_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl CommandOutput {
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// The command exceeded its deadline and was killed.
#[derive(Debug, thiserror::Error)]
#[error("{program} timed out after {timeout:?}")]
pub struct CommandTimedOut {
    pub program: String,
    pub timeout: Duration,
}

pub struct CommandRunner;

impl CommandRunner {
    /// Run `spec` to completion, capturing stdout and stderr.
    ///
    /// A timeout is returned as a [`CommandTimedOut`] error; a non-zero exit
    /// is not an error and is reported through [`CommandOutput`].
    pub async fn execute(spec: &CommandSpec) -> anyhow::Result<CommandOutput> {
        let start = Instant::now();
        let name = spec.display_name();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        debug!(program = %name, args = spec.args.len(), "spawning command");
        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn {name}"))?;

        let output = if spec.timeout.is_zero() {
            child.wait_with_output().await?
        } else {
            tokio::time::timeout(spec.timeout, child.wait_with_output())
                .await
                .map_err(|_| CommandTimedOut {
                    program: name.clone(),
                    timeout: spec.timeout,
                })?
                .with_context(|| format!("failed to wait for {name}"))?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let success = output.status.success();
        info!(program = %name, exit_code, duration_ms, "command finished");

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success,
        })
    }
}
