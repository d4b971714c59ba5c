//! Exec Common - Command Execution
//!
//! Parses a configured command line into a [`CommandSpec`] and runs it as a
//! child process, capturing stdout.
//!
//! Commands are spawned directly, never through a shell. The argument list is
//! the whitespace-split remainder of the configured string.
//!
//! # Usage
//!
//! ```no_run
//! use exec_common::{CommandExecutor, CommandSpec, ProcessExecutor};
//!
//! # async fn run() -> Result<(), exec_common::ExecError> {
//! let spec = CommandSpec::parse("echo foo bar cat");
//! let output = ProcessExecutor::new(None).execute(&spec).await?;
//! assert_eq!(output.text(), "foo bar cat\n");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::{fmt, process::Stdio, time::Duration};
use tokio::process::Command;

/// Errors produced while running a command.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The program could not be started (not found, not executable, empty name).
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully.
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The program did not finish within the configured timeout.
    #[error("`{program}` timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// A program name followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Splits a command line on whitespace into program and arguments.
    ///
    /// Nothing is validated here. A blank line produces an empty program
    /// name, which fails when executed.
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured stdout of one command run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    stdout: Vec<u8>,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.stdout
    }

    /// Stdout as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Runs a [`CommandSpec`] and returns what it printed.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;
}

/// Executes commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// `None` waits for the child indefinitely.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Builds a tokio Command from the spec.
    fn build_command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the output future on timeout must not leave the child running.
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let program = spec.program().to_string();
        let mut cmd = Self::build_command(spec);

        tracing::debug!(%program, args = ?spec.args(), "spawning command");

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, cmd.output())
                .await
                .map_err(|_| ExecError::TimedOut {
                    program: program.clone(),
                    timeout,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ExecError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::debug!(%program, bytes = output.stdout.len(), "command finished");

        Ok(CommandOutput::new(output.stdout))
    }
}
