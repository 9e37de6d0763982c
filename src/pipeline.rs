// ABOUTME: The receive pipeline (cleanup, build, release, deploy) and deploy:all fan-out.
// ABOUTME: Stages run strictly in order; the first failing stage halts the rest.

use std::path::Path;
use std::sync::Arc;

use crate::build::ImageBuilder;
use crate::cleanup::CleanupSweeper;
use crate::config::Settings;
use crate::deploy::{Cancellation, Deployer};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::output::{Output, OutputMode};
use crate::process::{CommandSpec, ProcessRunner, StdinSource};
use crate::registry::{AppRegistry, RoutingState};
use crate::release::ReleaseStager;
use crate::types::AppName;

#[derive(Clone)]
pub struct Pipeline {
    registry: AppRegistry,
    cleanup: CleanupSweeper,
    builder: ImageBuilder,
    stager: ReleaseStager,
    deployer: Deployer,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("root", &self.registry.root())
            .finish()
    }
}

impl Pipeline {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            registry: AppRegistry::new(settings),
            cleanup: CleanupSweeper::new(settings, runner.clone()),
            builder: ImageBuilder::new(settings, runner.clone()),
            stager: ReleaseStager::new(settings, runner.clone()),
            deployer: Deployer::new(settings, runner.clone()),
            runner,
        }
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn cleanup(&self) -> &CleanupSweeper {
        &self.cleanup
    }

    pub fn builder(&self) -> &ImageBuilder {
        &self.builder
    }

    pub fn stager(&self) -> &ReleaseStager {
        &self.stager
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    /// Build, release and deploy `app` from the tar stream on stdin.
    pub async fn receive(
        &self,
        app: &AppName,
        cancellation: Cancellation,
        output: &Output,
        diag: &mut Diagnostics,
    ) -> Result<RoutingState> {
        self.registry.require(app)?;

        output.progress("Cleaning up ...");
        self.cleanup.sweep(diag);

        output.progress(&format!("Building {app} ..."));
        self.builder.build(app).await?;

        output.progress(&format!("Releasing {app} ..."));
        self.stager.release(app).await?;

        output.progress(&format!("Deploying {app} ..."));
        let routing = self
            .deployer
            .deploy(app, cancellation, output, diag)
            .await?;

        output.success("Application deployed:");
        output.result(&routing.url);
        Ok(routing)
    }

    /// Redeploy every app, one child process of `exe` per app.
    ///
    /// Keeps going past failures and reports all failed apps at the end.
    pub async fn deploy_all(&self, exe: &Path, output: &Output) -> Result<Vec<AppName>> {
        let apps = self.registry.list_apps()?;
        let mut failed = Vec::new();

        for app in &apps {
            output.progress(&format!("Deploying {app} ..."));
            let mut command = CommandSpec::for_path(exe).stdin(StdinSource::Null);
            match output.mode() {
                OutputMode::Normal => {}
                OutputMode::Quiet => command = command.arg("--quiet"),
                OutputMode::Json => command = command.arg("--json"),
            }
            let command = command.arg("deploy").arg(app.as_str());

            let status = self.runner.run(&command).await?;
            if !status.success() {
                output.warning(&format!("Deploy of {app} failed: {status}"));
                failed.push(app.to_string());
            }
        }

        if failed.is_empty() {
            Ok(apps)
        } else {
            Err(Error::DeployAll(failed))
        }
    }
}
