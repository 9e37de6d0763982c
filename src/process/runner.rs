// ABOUTME: ProcessRunner trait and the tokio-backed production implementation.
// ABOUTME: Streams are inherited by default so build output stays live on the terminal.

use std::process::Stdio;

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

use super::command::{CommandOutput, CommandSpec, CommandStatus, StdinSource};
use super::error::{ProcessError, StdinSnafu, WaitSnafu};

/// Narrow capability over external processes.
///
/// Every component receives one of these instead of spawning processes
/// itself, which lets tests substitute a recording fake.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command with stdout and stderr inherited and wait for it.
    async fn run(&self, command: &CommandSpec) -> Result<CommandStatus, ProcessError>;

    /// Run a command capturing stdout (stderr stays inherited) and wait for it.
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError>;

    /// Start a command and return without waiting for it.
    ///
    /// Synchronous so it can be called from `Drop` implementations.
    fn spawn_detached(&self, command: &CommandSpec) -> Result<(), ProcessError>;
}

/// Production runner built on `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn spawn(command: &CommandSpec, stdout: Stdio) -> Result<Child, ProcessError> {
        tracing::debug!(command = %command, "spawning");

        let stdin = match command.get_stdin() {
            StdinSource::Inherit => Stdio::inherit(),
            StdinSource::Null => Stdio::null(),
            StdinSource::Bytes(_) => Stdio::piped(),
        };

        // A caller that stops waiting (a timed-out hook) takes the child down with it.
        Command::new(command.program())
            .args(command.get_args())
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::spawn_failed(command.program(), e))
    }

    /// Write the configured stdin bytes and close the pipe so the child sees EOF.
    async fn feed_stdin(child: &mut Child, command: &CommandSpec) -> Result<(), ProcessError> {
        let StdinSource::Bytes(bytes) = command.get_stdin() else {
            return Ok(());
        };

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(bytes).await {
                Ok(()) => {}
                // The child may legitimately exit before reading everything.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!(program = command.program(), "stdin closed early");
                }
                Err(e) => {
                    return Err(e).context(StdinSnafu {
                        program: command.program(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandStatus, ProcessError> {
        let mut child = Self::spawn(command, Stdio::inherit())?;
        Self::feed_stdin(&mut child, command).await?;

        let status = child.wait().await.context(WaitSnafu {
            program: command.program(),
        })?;

        tracing::debug!(command = %command, status = ?status.code(), "finished");
        Ok(status.into())
    }

    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let mut child = Self::spawn(command, Stdio::piped())?;
        Self::feed_stdin(&mut child, command).await?;

        let output = child.wait_with_output().await.context(WaitSnafu {
            program: command.program(),
        })?;

        tracing::debug!(command = %command, status = ?output.status.code(), "finished");
        Ok(CommandOutput {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn spawn_detached(&self, command: &CommandSpec) -> Result<(), ProcessError> {
        tracing::debug!(command = %command, "spawning detached");

        // std rather than tokio: the child must outlive any runtime, and
        // dropping a std Child neither kills nor waits for it.
        std::process::Command::new(command.program())
            .args(command.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|e| ProcessError::spawn_failed(command.program(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_reports_non_zero_status() {
        let runner = TokioProcessRunner::new();
        let status = runner
            .run(&CommandSpec::new("sh").args(["-c", "exit 3"]))
            .await
            .unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn output_captures_stdout_and_feeds_stdin() {
        let runner = TokioProcessRunner::new();
        let cmd = CommandSpec::new("cat").stdin(StdinSource::Bytes(b"hello\n".to_vec()));
        let output = runner.output(&cmd).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello\n");
    }

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let runner = TokioProcessRunner::new();
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-tool-xyz"))
            .await
            .unwrap_err();
        assert_eq!(
            err.unavailable_program(),
            Some("definitely-not-a-real-tool-xyz")
        );
    }

    #[tokio::test]
    async fn abandoned_command_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 1 && touch {}", marker.display());
        let runner = TokioProcessRunner::new();
        let cmd = CommandSpec::new("sh").args(["-c", script.as_str()]);

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(100), runner.run(&cmd)).await;
        assert!(waited.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn detached_missing_program_is_not_found() {
        let runner = TokioProcessRunner::new();
        let err = runner
            .spawn_detached(&CommandSpec::new("definitely-not-a-real-tool-xyz"))
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
    }
}
