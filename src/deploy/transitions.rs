// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use crate::diagnostics::{Diagnostics, Warning};
use crate::hooks::{HookError, HookEvent};
use crate::registry::{RegistryError, RoutingState};
use crate::runtime::KillOutcome;
use crate::types::ContainerId;

use super::Deployment;
use super::deployment::DeployContext;
use super::error::DeployError;
use super::guard::{Cancellation, CancellationGuard};
use super::state::{
    Abortable, CandidateStarted, CandidateWindow, Completed, HealthChecked, Idle, PostDeployed,
    PreDeployed, Promoted,
};

/// Result type for transitions that may need an abort on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

/// Command the candidate runs inside its container.
pub const START_COMMAND: &str = "/start web";

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    fn map_state<T>(self, f: impl FnOnce(S) -> T) -> Deployment<T> {
        Deployment {
            app: self.app,
            image: self.image,
            state: f(self.state),
        }
    }
}

/// Inspect-then-kill, recording anything short of success as a warning.
async fn kill_best_effort(
    ctx: &DeployContext,
    container: &ContainerId,
    role: &str,
    diag: &mut Diagnostics,
) {
    match ctx.docker.kill_if_exists(container).await {
        Ok(KillOutcome::Killed) => tracing::debug!("killed {} {}", role, container),
        Ok(KillOutcome::AlreadyGone) => tracing::debug!("{} {} already gone", role, container),
        Ok(KillOutcome::Failed(status)) => diag.warn(Warning::kill_failed(format!(
            "Failed to kill {} {}: {}",
            role, container, status
        ))),
        Err(e) => diag.warn(Warning::kill_failed(format!(
            "Failed to kill {} {}: {}",
            role, container, e
        ))),
    }
}

/// Throw the candidate away and close the window.
async fn discard(
    ctx: &DeployContext,
    candidate: &ContainerId,
    guard: CancellationGuard,
    cause: DeployError,
    diag: &mut Diagnostics,
) -> DeployError {
    tracing::info!("Aborting deploy, discarding candidate {}: {}", candidate, cause);
    kill_best_effort(ctx, candidate, "candidate", diag).await;

    if let Some(Err(e)) = guard.restore_routing() {
        diag.warn(Warning::routing_restore(format!(
            "Failed to restore routing state: {}",
            e
        )));
    }

    match guard.disarm().await {
        Ok(()) => cause,
        Err(interrupted) => interrupted,
    }
}

// =============================================================================
// Idle -> PreDeployed
// =============================================================================

impl Deployment<Idle> {
    /// Run `pre-deploy` and note which instance currently serves the app.
    ///
    /// Unreadable routing records are not fatal: the deploy goes ahead and an
    /// abort after promotion clears them instead of writing them back.
    #[must_use = "deployment state must be used"]
    pub async fn pre_deploy(
        self,
        ctx: &DeployContext,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<PreDeployed>, DeployError> {
        ctx.hooks
            .run_checked(HookEvent::PreDeploy, &[self.app.as_str()])
            .await?;

        let incumbent = ctx.registry.incumbent(&self.app)?;
        let previous = match ctx.registry.routing_state(&self.app) {
            Ok(previous) => previous,
            Err(e @ RegistryError::InvalidPort { .. }) => {
                diag.warn(Warning::routing_snapshot(format!(
                    "Ignoring routing records of {}: {}",
                    self.app, e
                )));
                None
            }
            Err(e) => return Err(e.into()),
        };
        match &incumbent {
            Some(id) => tracing::debug!(app = %self.app, incumbent = %id, "found incumbent"),
            None => tracing::debug!(app = %self.app, "no incumbent (first deploy)"),
        }

        Ok(self.map_state(|_| PreDeployed {
            incumbent,
            previous,
        }))
    }
}

// =============================================================================
// PreDeployed -> CandidateStarted
// =============================================================================

impl Deployment<PreDeployed> {
    /// Start the candidate and arm the cancellation guard around it.
    ///
    /// If the published port cannot be resolved the candidate is discarded.
    #[must_use = "deployment state must be used"]
    pub async fn start_candidate(
        self,
        ctx: &DeployContext,
        cancellation: Cancellation,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<CandidateStarted>, DeployError> {
        let extra = ctx.hooks.docker_args(self.app.as_str()).await?;

        let port = ctx.app_port.to_string();
        let port_env = format!("PORT={}", ctx.app_port);
        let image = self.image.to_string();
        let mut args = vec!["-p", port.as_str(), "-e", port_env.as_str()];
        args.extend(extra.iter().map(String::as_str));
        args.extend([image.as_str(), "/bin/bash", "-c", START_COMMAND]);

        // Listen before the candidate exists so an early signal still reaches the guard.
        let trigger = cancellation.install()?;
        let candidate = match ctx.docker.run_detached(args).await {
            Ok(candidate) => candidate,
            Err(e) => {
                trigger.release();
                return Err(e.into());
            }
        };
        tracing::debug!(app = %self.app, candidate = %candidate, "candidate started");

        let guard = CancellationGuard::arm(
            trigger,
            ctx.docker.clone(),
            ctx.registry.clone(),
            self.app.clone(),
            candidate.clone(),
        );

        let host_port = match ctx.docker.port(&candidate, ctx.app_port).await {
            Ok(port) => port,
            Err(e) => return Err(discard(ctx, &candidate, guard, e.into(), diag).await),
        };

        let PreDeployed {
            incumbent,
            previous,
        } = self.state;
        let window = CandidateWindow {
            incumbent,
            previous,
            candidate,
            port: host_port,
            guard,
        };
        Ok(Deployment {
            app: self.app,
            image: self.image,
            state: CandidateStarted { window },
        })
    }
}

// =============================================================================
// CandidateStarted -> HealthChecked
// =============================================================================

impl Deployment<CandidateStarted> {
    /// Ask `check-deploy <id> <app> <port>` for a verdict.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on a failed or timed-out verdict so the caller can abort.
    #[must_use = "deployment state must be used"]
    pub async fn health_check(
        self,
        ctx: &DeployContext,
    ) -> TransitionResult<HealthChecked, CandidateStarted> {
        let candidate = self.candidate().clone();
        let port = self.port().to_string();
        let args = [candidate.as_str(), self.app.as_str(), port.as_str()];

        let verdict = ctx
            .hooks
            .run_with_timeout(HookEvent::CheckDeploy, &args, ctx.check_timeout)
            .await;

        match verdict {
            Ok(status) if status.success() => Ok(self.map_state(|s| HealthChecked {
                window: s.window,
            })),
            Ok(status) => Err((
                self,
                DeployError::CheckFailed {
                    container: candidate,
                    status,
                },
            )),
            Err(HookError::Timeout { after, .. }) => Err((
                self,
                DeployError::CheckTimeout {
                    container: candidate,
                    after,
                },
            )),
            Err(e) => Err((self, e.into())),
        }
    }
}

// =============================================================================
// HealthChecked -> Promoted
// =============================================================================

impl Deployment<HealthChecked> {
    /// Point `CONTAINER`, `PORT` and `URL` at the candidate.
    #[must_use = "deployment state must be used"]
    pub fn promote(self, ctx: &DeployContext) -> TransitionResult<Promoted, HealthChecked> {
        let window = &self.state.window;
        let routing = RoutingState::new(
            window.candidate.clone(),
            window.port,
            &ctx.registry.hostname(),
        );

        if let Err(e) = window.guard.promote(&routing, window.previous.clone()) {
            return Err((self, e));
        }

        Ok(self.map_state(|s| Promoted {
            window: s.window,
            routing,
        }))
    }
}

// =============================================================================
// Promoted -> PostDeployed
// =============================================================================

impl Deployment<Promoted> {
    /// Run `post-deploy <app> <port>`. A non-zero status is only a warning.
    #[must_use = "deployment state must be used"]
    pub async fn post_deploy(
        self,
        ctx: &DeployContext,
        diag: &mut Diagnostics,
    ) -> TransitionResult<PostDeployed, Promoted> {
        let port = self.port().to_string();
        let dispatched = ctx
            .hooks
            .run_checked(HookEvent::PostDeploy, &[self.app.as_str(), port.as_str()])
            .await;
        let status = match dispatched {
            Ok(status) => status,
            Err(e) => return Err((self, e.into())),
        };

        if !status.success() {
            diag.warn(Warning::post_deploy_hook(format!(
                "post-deploy hook for {} failed: {}",
                self.app, status
            )));
        }

        Ok(self.map_state(|s| PostDeployed {
            window: s.window,
            routing: s.routing,
        }))
    }
}

// =============================================================================
// PostDeployed -> Completed
// =============================================================================

impl Deployment<PostDeployed> {
    /// Close the signal window and kill the previous instance.
    ///
    /// From here on the deploy cannot be undone.
    #[must_use = "deployment state must be used"]
    pub async fn retire_incumbent(
        self,
        ctx: &DeployContext,
        diag: &mut Diagnostics,
    ) -> Result<Deployment<Completed>, DeployError> {
        let PostDeployed { window, routing } = self.state;
        let CandidateWindow {
            incumbent,
            candidate,
            guard,
            ..
        } = window;

        guard.disarm().await?;

        match incumbent {
            Some(old) if old != candidate => {
                tracing::debug!(app = %self.app, incumbent = %old, "retiring incumbent");
                match ctx.docker.kill_if_exists(&old).await? {
                    KillOutcome::Killed | KillOutcome::AlreadyGone => {}
                    KillOutcome::Failed(status) => diag.warn(Warning::kill_failed(format!(
                        "Failed to kill previous instance {}: {}",
                        old, status
                    ))),
                }
            }
            _ => {}
        }

        Ok(Deployment {
            app: self.app,
            image: self.image,
            state: Completed { routing },
        })
    }
}

// =============================================================================
// Aborting
// =============================================================================

impl<S: Abortable> Deployment<S> {
    /// Kill the candidate, undo any promotion and close the window.
    ///
    /// Returns the error to report: `cause`, or [`DeployError::Interrupted`]
    /// if a signal got there first.
    pub async fn abort(
        self,
        ctx: &DeployContext,
        cause: DeployError,
        diag: &mut Diagnostics,
    ) -> DeployError {
        let CandidateWindow {
            candidate, guard, ..
        } = self.state.into_window();
        discard(ctx, &candidate, guard, cause, diag).await
    }
}

// =============================================================================
// Completed - Terminal State
// =============================================================================

impl Deployment<Completed> {
    /// Consume the deployment and return the live routing state.
    pub fn finish(self) -> RoutingState {
        self.state.routing
    }
}
