// ABOUTME: Zero-downtime deploy orchestration using the type state pattern.
// ABOUTME: Starts a candidate, health-checks it, promotes it, and retires the incumbent.

mod deployment;
mod error;
mod guard;
mod lock;
mod state;
mod transitions;

use std::sync::Arc;
use std::time::Duration;

pub use deployment::{DeployContext, Deployment};
pub use error::DeployError;
pub use guard::{Cancellation, CancellationGuard, Terminator, Trigger};
pub use lock::{DeployLock, LOCK_FILENAME, LockInfo};
pub use state::{
    Abortable, CandidateStarted, CandidateWindow, Completed, HealthChecked, Idle, PostDeployed,
    PreDeployed, Promoted,
};
pub use transitions::{START_COMMAND, TransitionResult};

use crate::config::Settings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::output::Output;
use crate::process::ProcessRunner;
use crate::registry::RoutingState;
use crate::types::{AppName, ImageName};

/// Runs the deploy state machine for one app at a time.
#[derive(Debug, Clone)]
pub struct Deployer {
    ctx: DeployContext,
    namespace: String,
    deploy_lock: bool,
    lock_stale_after: Duration,
}

impl Deployer {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            ctx: DeployContext::new(settings, runner),
            namespace: settings.image_namespace.clone(),
            deploy_lock: settings.deploy_lock,
            lock_stale_after: settings.lock_stale_after,
        }
    }

    /// Deploy the current image of `app`.
    ///
    /// On failure after the candidate started, the candidate is killed and
    /// the incumbent and routing records are left as they were.
    pub async fn deploy(
        &self,
        app: &AppName,
        cancellation: Cancellation,
        output: &Output,
        diag: &mut Diagnostics,
    ) -> Result<RoutingState, DeployError> {
        let app_dir = self.ctx.registry.require(app)?;

        let lock = if self.deploy_lock {
            Some(DeployLock::acquire(
                &app_dir,
                app,
                self.lock_stale_after,
                diag,
            )?)
        } else {
            None
        };

        let result = self.run(app, cancellation, output, diag).await;

        if let Some(lock) = lock
            && let Err(e) = lock.release()
        {
            diag.warn(Warning::lock_release(format!(
                "Failed to release deploy lock: {}",
                e
            )));
        }
        result
    }

    async fn run(
        &self,
        app: &AppName,
        cancellation: Cancellation,
        output: &Output,
        diag: &mut Diagnostics,
    ) -> Result<RoutingState, DeployError> {
        let ctx = &self.ctx;
        let deployment = Deployment::new(app.clone(), ImageName::new(&self.namespace, app));

        let deployment = deployment.pre_deploy(ctx, diag).await?;
        let deployment = deployment.start_candidate(ctx, cancellation, diag).await?;
        output.detail(&format!(
            "Started {} on port {}",
            deployment.candidate(),
            deployment.port()
        ));

        output.progress("Running pre-flight checks");
        let deployment = match deployment.health_check(ctx).await {
            Ok(d) => d,
            Err((failed, e)) => return Err(failed.abort(ctx, e, diag).await),
        };

        let deployment = match deployment.promote(ctx) {
            Ok(d) => d,
            Err((failed, e)) => return Err(failed.abort(ctx, e, diag).await),
        };

        output.progress("Running post-deploy");
        let deployment = match deployment.post_deploy(ctx, diag).await {
            Ok(d) => d,
            Err((failed, e)) => return Err(failed.abort(ctx, e, diag).await),
        };

        if let Some(old) = deployment.incumbent() {
            output.detail(&format!("Shutting down old instance {}", old));
        }
        let deployment = deployment.retire_incumbent(ctx, diag).await?;
        Ok(deployment.finish())
    }
}
