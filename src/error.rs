// ABOUTME: Application-wide error type for the dokku CLI.
// ABOUTME: Uses thiserror and maps every failure to a process exit code.

use thiserror::Error;

use crate::build::BuildError;
use crate::deploy::DeployError;
use crate::hooks::HookError;
use crate::process::{CommandStatus, ProcessError};
use crate::registry::RegistryError;
use crate::release::ReleaseError;

/// Exit code for a stage failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when a required external tool is missing, as shells report it.
pub const EXIT_TOOL_MISSING: i32 = 127;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("release failed: {0}")]
    Release(#[from] ReleaseError),

    #[error("deploy failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("app {0} has not been deployed")]
    NotDeployed(String),

    #[error("`{0}` is not a dokku command and no plugin provides it")]
    UnknownCommand(String),

    #[error("plugin command {script} failed: {status}")]
    PluginCommand {
        script: String,
        status: CommandStatus,
    },

    #[error("deploy failed for: {}", .0.join(", "))]
    DeployAll(Vec<String>),
}

impl Error {
    /// The external program that could not be run, if that caused this error.
    pub fn unavailable_program(&self) -> Option<&str> {
        match self {
            Error::Process(e) => e.unavailable_program(),
            Error::Hook(e) => e.unavailable_program(),
            Error::Build(e) => e.unavailable_program(),
            Error::Release(e) => e.unavailable_program(),
            Error::Deploy(e) => e.unavailable_program(),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        if self.unavailable_program().is_some() {
            EXIT_TOOL_MISSING
        } else {
            EXIT_FAILURE
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
