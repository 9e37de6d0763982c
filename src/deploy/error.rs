// ABOUTME: Error types for deployment operations.
// ABOUTME: Covers hooks, runtime failures, failed health verdicts, signals, and the deploy lock.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::hooks::HookError;
use crate::process::CommandStatus;
use crate::registry::RegistryError;
use crate::runtime::DockerError;
use crate::types::ContainerId;

/// Errors that can occur during deployment state transitions.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Hook(#[from] HookError),

    /// `check-deploy` rejected the candidate.
    #[error("health check failed for {container}: {status}")]
    CheckFailed {
        container: ContainerId,
        status: CommandStatus,
    },

    /// `check-deploy` overran the configured deadline.
    #[error("health check for {container} timed out after {}s", .after.as_secs())]
    CheckTimeout {
        container: ContainerId,
        after: Duration,
    },

    /// SIGINT or SIGTERM arrived while the candidate was running.
    #[error("deploy interrupted, candidate {0} killed")]
    Interrupted(ContainerId),

    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    /// Another deploy of the same app holds the lock.
    #[error("deploy of {app} in progress by {holder} (pid {pid}) since {started_at}")]
    LockHeld {
        app: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("deploy lock error: {0}")]
    Lock(String),
}

impl DeployError {
    pub fn lock_error(message: impl Into<String>) -> Self {
        DeployError::Lock(message.into())
    }

    pub fn lock_held(app: &str, holder: String, pid: u32, started_at: DateTime<Utc>) -> Self {
        DeployError::LockHeld {
            app: app.to_string(),
            holder,
            pid,
            started_at,
        }
    }

    /// The external program that could not be run, if that caused this error.
    pub fn unavailable_program(&self) -> Option<&str> {
        match self {
            DeployError::Docker(e) => e.unavailable_program(),
            DeployError::Hook(e) => e.unavailable_program(),
            _ => None,
        }
    }
}

impl From<crate::process::ProcessError> for DeployError {
    fn from(err: crate::process::ProcessError) -> Self {
        DeployError::Docker(DockerError::Process(err))
    }
}
