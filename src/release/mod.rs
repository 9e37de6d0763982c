// ABOUTME: Release stager injecting the app's ENV record into its image.
// ABOUTME: Writes a profile script through a one-shot container and commits the result.

use std::sync::Arc;

use crate::config::Settings;
use crate::hooks::{HookError, HookEvent, HookRunner};
use crate::process::{ProcessRunner, StdinSource};
use crate::registry::{AppRegistry, RegistryError};
use crate::runtime::{DockerCli, DockerError};
use crate::types::{AppName, ContainerId, ImageName};

/// Writes stdin to the profile script sourced at container start.
pub const PROFILE_SCRIPT: &str =
    "mkdir -p /app/.profile.d && cat > /app/.profile.d/app-env.sh";

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("environment injection container {container} exited with status {code}")]
    ContainerExit { container: ContainerId, code: i64 },
}

impl ReleaseError {
    pub fn unavailable_program(&self) -> Option<&str> {
        match self {
            ReleaseError::Docker(e) => e.unavailable_program(),
            ReleaseError::Hook(e) => e.unavailable_program(),
            _ => None,
        }
    }
}

/// Whether the image was touched by a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    EnvInjected,
    NoEnv,
}

#[derive(Debug, Clone)]
pub struct ReleaseStager {
    docker: DockerCli,
    hooks: HookRunner,
    registry: AppRegistry,
    namespace: String,
}

impl ReleaseStager {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            docker: DockerCli::new(&settings.docker, runner.clone()),
            hooks: HookRunner::new(&settings.pluginhook, runner),
            registry: AppRegistry::new(settings),
            namespace: settings.image_namespace.clone(),
        }
    }

    /// Run the release hooks around environment injection.
    ///
    /// A missing ENV record skips injection. There is no image rollback:
    /// a failure after commit leaves the committed image in place.
    pub async fn release(&self, app: &AppName) -> Result<ReleaseOutcome, ReleaseError> {
        self.registry.require(app)?;
        self.hooks
            .run_checked(HookEvent::PreRelease, &[app.as_str()])
            .await?;

        let outcome = match self.registry.env_record(app)? {
            Some(env) => {
                self.inject(app, env).await?;
                ReleaseOutcome::EnvInjected
            }
            None => {
                tracing::debug!(app = %app, "no ENV record, skipping injection");
                ReleaseOutcome::NoEnv
            }
        };

        self.hooks
            .run_checked(HookEvent::PostRelease, &[app.as_str()])
            .await?;
        Ok(outcome)
    }

    async fn inject(&self, app: &AppName, env: Vec<u8>) -> Result<(), ReleaseError> {
        let image = ImageName::new(&self.namespace, app);
        let id = self
            .docker
            .run_with_stdin(&image.to_string(), PROFILE_SCRIPT, StdinSource::Bytes(env))
            .await?;

        let code = self.docker.wait(&id).await?;
        if code != 0 {
            return Err(ReleaseError::ContainerExit { container: id, code });
        }
        self.docker.commit(&id, &image).await?;
        tracing::info!(app = %app, image = %image, "environment injected");
        Ok(())
    }
}
