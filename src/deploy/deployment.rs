// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: State types carry their own data so a candidate id exists exactly when it should.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::hooks::HookRunner;
use crate::process::ProcessRunner;
use crate::registry::AppRegistry;
use crate::runtime::DockerCli;
use crate::types::{AppName, ContainerId, ImageName};

use super::state::{Abortable, Idle};

/// Collaborators shared by every transition.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub(crate) docker: DockerCli,
    pub(crate) hooks: HookRunner,
    pub(crate) registry: AppRegistry,
    pub(crate) app_port: u16,
    pub(crate) check_timeout: Option<Duration>,
}

impl DeployContext {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            docker: DockerCli::new(&settings.docker, runner.clone()),
            hooks: HookRunner::new(&settings.pluginhook, runner),
            registry: AppRegistry::new(settings),
            app_port: settings.app_port,
            check_timeout: settings.check_timeout,
        }
    }
}

/// A deployment in progress, parameterized by its current state.
///
/// The state type parameter `S` carries state-specific data (the candidate,
/// its port, the armed guard) directly in the state type.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) app: AppName,
    pub(crate) image: ImageName,
    pub(crate) state: S,
}

impl Deployment<Idle> {
    pub fn new(app: AppName, image: ImageName) -> Self {
        Deployment {
            app,
            image,
            state: Idle,
        }
    }
}

impl<S: Abortable> Deployment<S> {
    pub fn candidate(&self) -> &ContainerId {
        &self.state.window().candidate
    }

    /// Host port the candidate is published on.
    pub fn port(&self) -> u16 {
        self.state.window().port
    }

    /// Instance serving the app before this deploy (None on first deploy).
    pub fn incumbent(&self) -> Option<&ContainerId> {
        self.state.window().incumbent.as_ref()
    }
}
