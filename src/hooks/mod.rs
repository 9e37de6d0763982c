// ABOUTME: Hook dispatch for build, release, and deploy lifecycle events.
// ABOUTME: Delegates to the external pluginhook dispatcher and reads back status or stdout.

use std::sync::Arc;
use std::time::Duration;

use crate::process::{
    CommandOutput, CommandSpec, CommandStatus, ProcessError, ProcessRunner, StdinSource,
};

/// Named extension points dispatched to plugin scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    PreBuild,
    PostBuild,
    PreRelease,
    PostRelease,
    PreDeploy,
    /// Health verdict for a candidate. Exit status is the answer.
    CheckDeploy,
    /// Runs after promotion; expected to switch live traffic.
    PostDeploy,
    /// Prints extra `docker run` arguments on stdout.
    DockerArgs,
    Install,
    Dependencies,
    /// Prints plugin help lines on stdout.
    Commands,
}

impl HookEvent {
    /// Event name as understood by the dispatcher.
    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::PreBuild => "pre-build",
            HookEvent::PostBuild => "post-build",
            HookEvent::PreRelease => "pre-release",
            HookEvent::PostRelease => "post-release",
            HookEvent::PreDeploy => "pre-deploy",
            HookEvent::CheckDeploy => "check-deploy",
            HookEvent::PostDeploy => "post-deploy",
            HookEvent::DockerArgs => "docker-args",
            HookEvent::Install => "install",
            HookEvent::Dependencies => "dependencies",
            HookEvent::Commands => "commands",
        }
    }

    /// Whether a non-zero exit at this event halts the current stage.
    ///
    /// Everything before promotion can still be abandoned safely. Once
    /// routing state points at the new instance, `post-deploy` failures
    /// are only reported.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HookEvent::PostDeploy)
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from dispatching a hook event.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{event} hook failed: {status}")]
    Failed {
        event: HookEvent,
        status: CommandStatus,
    },

    #[error("{event} hook did not finish within {}s", .after.as_secs())]
    Timeout { event: HookEvent, after: Duration },
}

impl HookError {
    pub fn unavailable_program(&self) -> Option<&str> {
        match self {
            HookError::Process(e) => e.unavailable_program(),
            _ => None,
        }
    }
}

/// Dispatches hook events through the `pluginhook` binary.
#[derive(Clone)]
pub struct HookRunner {
    program: String,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for HookRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRunner")
            .field("program", &self.program)
            .finish()
    }
}

impl HookRunner {
    pub fn new(program: impl Into<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn command(&self, event: HookEvent, args: &[&str]) -> CommandSpec {
        CommandSpec::new(&self.program).arg(event.name()).args(args)
    }

    /// Run all scripts for `event` with output streamed to the terminal.
    ///
    /// Returns the dispatcher's exit status whatever it is.
    pub async fn run(&self, event: HookEvent, args: &[&str]) -> Result<CommandStatus, HookError> {
        tracing::info!("Running {} hook", event);
        let status = self.runner.run(&self.command(event, args)).await?;

        if status.success() {
            tracing::debug!("{} hook completed successfully", event);
        } else {
            tracing::warn!("{} hook failed with {}", event, status);
        }
        Ok(status)
    }

    /// Like [`run`](Self::run) but a non-zero status of a fatal event is an error.
    ///
    /// Non-fatal events hand their status back for the caller to report.
    pub async fn run_checked(
        &self,
        event: HookEvent,
        args: &[&str],
    ) -> Result<CommandStatus, HookError> {
        let status = self.run(event, args).await?;
        if status.success() || !event.is_fatal() {
            Ok(status)
        } else {
            Err(HookError::Failed { event, status })
        }
    }

    /// Like [`run`](Self::run) with an optional deadline.
    pub async fn run_with_timeout(
        &self,
        event: HookEvent,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CommandStatus, HookError> {
        match timeout {
            None => self.run(event, args).await,
            Some(after) => tokio::time::timeout(after, self.run(event, args))
                .await
                .map_err(|_| HookError::Timeout { event, after })?,
        }
    }

    /// Run `event` and capture what the scripts print.
    pub async fn capture(
        &self,
        event: HookEvent,
        args: &[&str],
        stdin: StdinSource,
    ) -> Result<CommandOutput, HookError> {
        let cmd = self.command(event, args).stdin(stdin);
        Ok(self.runner.output(&cmd).await?)
    }

    /// Extra `docker run` arguments contributed by plugins for `app`.
    pub async fn docker_args(&self, app: &str) -> Result<Vec<String>, HookError> {
        let output = self
            .capture(HookEvent::DockerArgs, &[app], StdinSource::Null)
            .await?;
        if !output.success() {
            return Err(HookError::Failed {
                event: HookEvent::DockerArgs,
                status: output.status,
            });
        }
        Ok(output
            .stdout
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }
}
