// ABOUTME: External process abstraction underlying every orchestration step.
// ABOUTME: Exposes the ProcessRunner trait, the tokio-backed runner, and command types.

mod command;
mod error;
mod runner;

pub use command::{CommandOutput, CommandSpec, CommandStatus, StdinSource};
pub use error::ProcessError;
pub use runner::{ProcessRunner, TokioProcessRunner};
