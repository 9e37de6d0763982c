// ABOUTME: Image builder turning a source tarball into the app's committed image.
// ABOUTME: Unpacks into a build container, commits, runs the builder with a cache mount, commits again.

use std::sync::Arc;

use crate::config::Settings;
use crate::hooks::{HookError, HookEvent, HookRunner};
use crate::process::{ProcessRunner, StdinSource};
use crate::registry::{AppRegistry, RegistryError};
use crate::runtime::{DockerCli, DockerError};
use crate::types::{AppName, ContainerId, ImageName};

/// Unpacks the archive arriving on our stdin into `/app`.
pub const UNPACK_SCRIPT: &str = "mkdir -p /app && tar -xC /app";
/// Build procedure baked into the build image.
pub const BUILDER_COMMAND: &str = "/build/builder";
/// Mount point of the app's cache directory inside the builder container.
pub const CACHE_MOUNT: &str = "/cache";

/// Which container a failed exit code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Unpack,
    Compile,
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStep::Unpack => f.write_str("source unpack"),
            BuildStep::Compile => f.write_str("builder"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("{step} container {container} exited with status {code}")]
    ContainerExit {
        step: BuildStep,
        container: ContainerId,
        code: i64,
    },
}

impl BuildError {
    pub fn unavailable_program(&self) -> Option<&str> {
        match self {
            BuildError::Docker(e) => e.unavailable_program(),
            BuildError::Hook(e) => e.unavailable_program(),
            _ => None,
        }
    }
}

/// Builds the single current image of an application.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    docker: DockerCli,
    hooks: HookRunner,
    registry: AppRegistry,
    build_image: String,
    namespace: String,
}

impl ImageBuilder {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            docker: DockerCli::new(&settings.docker, runner.clone()),
            hooks: HookRunner::new(&settings.pluginhook, runner),
            registry: AppRegistry::new(settings),
            build_image: settings.build_image.clone(),
            namespace: settings.image_namespace.clone(),
        }
    }

    /// Build `app` from the tar stream on this process's stdin.
    ///
    /// Intermediate containers are left behind on failure so they can be
    /// inspected; the cleanup sweep reclaims them.
    pub async fn build(&self, app: &AppName) -> Result<ImageName, BuildError> {
        self.registry.require(app)?;
        let image = ImageName::new(&self.namespace, app);

        let unpack = self
            .docker
            .run_with_stdin(&self.build_image, UNPACK_SCRIPT, StdinSource::Inherit)
            .await?;
        self.wait_success(&unpack, BuildStep::Unpack).await?;
        self.docker.commit(&unpack, &image).await?;
        tracing::debug!(app = %app, container = %unpack, "sources unpacked");

        let cache = self.registry.ensure_cache_dir(app)?;
        self.hooks
            .run_checked(HookEvent::PreBuild, &[app.as_str()])
            .await?;

        let volume = format!("{}:{}", cache.display(), CACHE_MOUNT);
        let image_ref = image.to_string();
        let builder = self
            .docker
            .run_detached(["-v", volume.as_str(), image_ref.as_str(), BUILDER_COMMAND])
            .await?;

        let attached = self.docker.attach(&builder).await?;
        if !attached.success() {
            // Detaching early is fine; the wait below is authoritative.
            tracing::debug!(container = %builder, status = %attached, "attach ended");
        }
        self.wait_success(&builder, BuildStep::Compile).await?;
        self.docker.commit(&builder, &image).await?;

        self.hooks
            .run_checked(HookEvent::PostBuild, &[app.as_str()])
            .await?;

        tracing::info!(app = %app, image = %image, "build complete");
        Ok(image)
    }

    async fn wait_success(&self, id: &ContainerId, step: BuildStep) -> Result<(), BuildError> {
        let code = self.docker.wait(id).await?;
        if code == 0 {
            Ok(())
        } else {
            Err(BuildError::ContainerExit {
                step,
                container: id.clone(),
                code,
            })
        }
    }
}
