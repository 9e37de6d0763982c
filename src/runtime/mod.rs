// ABOUTME: Container runtime access through the docker CLI.
// ABOUTME: Wraps run/wait/commit/port/inspect/kill on top of ProcessRunner.

mod docker;
mod error;

pub use docker::{DockerCli, KillOutcome};
pub use error::DockerError;
