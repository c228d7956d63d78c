//! Runs one job's command in a fresh shell subprocess and classifies the outcome.
//!
//! A non-zero exit is a normal business outcome reported through
//! [`CommandOutput::success`]. Only failures to launch or reap the process are
//! reported as an [`ExecutionFault`].

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use cfg_if::cfg_if;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Bytes of stderr kept by [`CommandOutput::failure_summary`].
const FAILURE_SUMMARY_STDERR_BYTES: usize = 512;

/// Errors raised when the command could not be run at all.
#[derive(Error, Debug)]
pub enum ExecutionFault {
    /// The shell process could not be spawned (missing shell, permission denied, ...)
    #[error("Failed to spawn shell '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },
    /// The process was spawned but waiting for it failed
    #[error("Failed to wait for command termination: {0}")]
    Wait(#[source] std::io::Error),
}

/// Result of a command that ran to termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Process exit code. A process killed by signal `n` reports `128 + n`.
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl CommandOutput {
    /// Short human readable description of a failed run, suitable for `last_error`.
    pub fn failure_summary(&self) -> String {
        let start = self.stderr.len().saturating_sub(FAILURE_SUMMARY_STDERR_BYTES);
        let stderr = String::from_utf8_lossy(&self.stderr[start..]);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            format!("exit code {}: {}", self.exit_code, stderr)
        }
    }
}

/// Something that can execute a job's command.
pub trait CommandRunner: Send + Sync {
    fn execute<'a>(&'a self, command: &'a str)
        -> BoxFuture<'a, Result<CommandOutput, ExecutionFault>>;
}

/// Runs commands through the platform shell (`sh -c` on unix, `cmd /C` on windows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRunner {
    shell: OsString,
    flag: OsString,
}

impl Default for ShellRunner {
    fn default() -> Self {
        cfg_if! {
            if #[cfg(windows)] {
                ShellRunner::new("cmd.exe", "/C")
            } else {
                ShellRunner::new("/bin/sh", "-c")
            }
        }
    }
}

impl ShellRunner {
    pub fn new(shell: impl Into<OsString>, flag: impl Into<OsString>) -> Self {
        ShellRunner {
            shell: shell.into(),
            flag: flag.into(),
        }
    }

    pub async fn run(&self, command: &str) -> Result<CommandOutput, ExecutionFault> {
        let start = Instant::now();

        let child = Command::new(&self.shell)
            .arg(&self.flag)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutionFault::Spawn {
                shell: self.shell.to_string_lossy().into_owned(),
                source,
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(ExecutionFault::Wait)?;

        let exit_code = exit_code(&output.status);
        let duration = start.elapsed();
        debug!(exit_code, duration = duration.as_millis(), "Command terminated");

        Ok(CommandOutput {
            success: exit_code == 0,
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            duration,
        })
    }
}

impl CommandRunner for ShellRunner {
    fn execute<'a>(
        &'a self,
        command: &'a str,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecutionFault>> {
        self.run(command).boxed()
    }
}

cfg_if! {
    if #[cfg(unix)] {
        fn exit_code(status: &ExitStatus) -> i32 {
            use std::os::unix::process::ExitStatusExt;

            status
                .code()
                .or_else(|| status.signal().map(|signal| 128 + signal))
                .unwrap_or(-1)
        }
    } else {
        fn exit_code(status: &ExitStatus) -> i32 {
            status.code().unwrap_or(-1)
        }
    }
}

/// Runs `command` with the default platform shell.
pub async fn execute(command: &str) -> Result<CommandOutput, ExecutionFault> {
    ShellRunner::default().run(command).await
}
