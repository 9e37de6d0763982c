// ABOUTME: Fire-and-forget reclamation of exited containers and dangling images.
// ABOUTME: Both sweeps are detached shell pipelines that are never waited on.

use std::sync::Arc;

use crate::config::Settings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::process::ProcessRunner;
use crate::runtime::DockerCli;

/// One of the two independent sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    /// Containers in the `exited` state.
    ExitedContainers,
    /// Images with no tag left pointing at them.
    DanglingImages,
}

impl Sweep {
    pub const ALL: [Sweep; 2] = [Sweep::ExitedContainers, Sweep::DanglingImages];

    /// Shell pipeline that performs this sweep with `docker`.
    ///
    /// `xargs -r` makes an empty listing a no-op.
    pub fn script(&self, docker: &str) -> String {
        match self {
            Sweep::ExitedContainers => {
                format!("{docker} ps -a -q -f status=exited | xargs -r {docker} rm")
            }
            Sweep::DanglingImages => {
                format!("{docker} images -q -f dangling=true | xargs -r {docker} rmi")
            }
        }
    }
}

impl std::fmt::Display for Sweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sweep::ExitedContainers => f.write_str("exited containers"),
            Sweep::DanglingImages => f.write_str("dangling images"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanupSweeper {
    docker: DockerCli,
}

impl CleanupSweeper {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            docker: DockerCli::new(&settings.docker, runner),
        }
    }

    /// Start both sweeps and return immediately.
    ///
    /// Returns how many sweeps were started. A sweep that cannot be
    /// started is a warning, never an error.
    pub fn sweep(&self, diag: &mut Diagnostics) -> usize {
        let mut started = 0;
        for sweep in Sweep::ALL {
            match self
                .docker
                .spawn_shell_detached(&sweep.script(self.docker.program()))
            {
                Ok(()) => {
                    tracing::debug!("started sweep of {}", sweep);
                    started += 1;
                }
                Err(e) => diag.warn(Warning::cleanup_spawn(format!(
                    "Failed to start sweep of {}: {}",
                    sweep, e
                ))),
            }
        }
        started
    }
}
