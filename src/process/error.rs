// ABOUTME: Process error types with SNAFU pattern.
// ABOUTME: Separates "tool unavailable" (always fatal) from I/O trouble while a command runs.

use snafu::Snafu;

/// Failure to run an external command at all.
///
/// A command that ran and exited non-zero is not an error at this layer;
/// it comes back as a [`CommandStatus`](super::CommandStatus).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProcessError {
    #[snafu(display("command not found: {program}"))]
    NotFound { program: String },

    #[snafu(display("failed to execute {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("failed to feed stdin to {program}: {source}"))]
    Stdin {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("failed while waiting for {program}: {source}"))]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Classify a spawn failure.
    pub fn spawn_failed(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ProcessError::NotFound {
                program: program.to_string(),
            }
        } else {
            ProcessError::Spawn {
                program: program.to_string(),
                source,
            }
        }
    }

    /// The program that could not be located or executed, if that is what happened.
    ///
    /// Such failures terminate the whole invocation: nothing downstream can
    /// work without the tool.
    pub fn unavailable_program(&self) -> Option<&str> {
        match self {
            ProcessError::NotFound { program } | ProcessError::Spawn { program, .. } => {
                Some(program)
            }
            ProcessError::Stdin { .. } | ProcessError::Wait { .. } => None,
        }
    }
}
