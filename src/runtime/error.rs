// ABOUTME: Errors from container runtime CLI invocations.
// ABOUTME: Distinguishes a failing docker verb from a docker binary that could not run.

use crate::process::{CommandStatus, ProcessError};

/// Errors from container runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("docker {verb} failed: {status}")]
    Failed {
        verb: &'static str,
        status: CommandStatus,
    },

    #[error("docker {verb} produced unexpected output: {output:?}")]
    UnexpectedOutput { verb: &'static str, output: String },
}

impl DockerError {
    /// The runtime binary, when it could not be executed at all.
    pub fn unavailable_program(&self) -> Option<&str> {
        match self {
            DockerError::Process(e) => e.unavailable_program(),
            _ => None,
        }
    }
}
