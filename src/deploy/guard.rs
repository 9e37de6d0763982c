// ABOUTME: Signal window around a running deploy candidate.
// ABOUTME: On SIGINT/SIGTERM or an armed drop, kills the candidate and puts routing records back.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use nix::sys::signal::{self, SigHandler, Signal};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::registry::{AppRegistry, RegistryError, RoutingState};
use crate::runtime::DockerCli;
use crate::types::{AppName, ContainerId};

use super::DeployError;

/// Runs once the candidate has been dealt with after a trigger.
pub type Terminator = Box<dyn FnOnce() + Send + 'static>;

/// What ends a deploy early.
pub enum Cancellation {
    /// SIGINT or SIGTERM, followed by `terminator`.
    Signals { terminator: Terminator },
    /// An arbitrary future and terminator, for embedding and tests.
    Manual {
        trigger: BoxFuture<'static, ()>,
        terminator: Terminator,
    },
}

impl Cancellation {
    /// SIGINT or SIGTERM, then SIGKILL of our own process group.
    pub fn signals() -> Self {
        Self::signals_then(terminate_process_group)
    }

    /// SIGINT or SIGTERM, then a caller-supplied terminator.
    pub fn signals_then<T>(terminator: T) -> Self
    where
        T: FnOnce() + Send + 'static,
    {
        Cancellation::Signals {
            terminator: Box::new(terminator),
        }
    }

    pub fn manual<F, T>(trigger: F, terminator: T) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
        T: FnOnce() + Send + 'static,
    {
        Cancellation::Manual {
            trigger: Box::pin(trigger),
            terminator: Box::new(terminator),
        }
    }

    /// Start listening. Signals delivered from here on are not lost, even
    /// before a guard is armed with the result.
    pub fn install(self) -> Result<Trigger, DeployError> {
        match self {
            Cancellation::Signals { terminator } => {
                use tokio::signal::unix::{SignalKind, signal};

                let mut interrupt = signal(SignalKind::interrupt()).map_err(DeployError::Signal)?;
                let mut terminate = signal(SignalKind::terminate()).map_err(DeployError::Signal)?;
                let fired = async move {
                    tokio::select! {
                        _ = interrupt.recv() => tracing::debug!("received SIGINT"),
                        _ = terminate.recv() => tracing::debug!("received SIGTERM"),
                    }
                };
                Ok(Trigger {
                    fired: Box::pin(fired),
                    terminator,
                    resets_signals: true,
                })
            }
            Cancellation::Manual {
                trigger,
                terminator,
            } => Ok(Trigger {
                fired: trigger,
                terminator,
                resets_signals: false,
            }),
        }
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cancellation::Signals { .. } => f.write_str("Cancellation::Signals"),
            Cancellation::Manual { .. } => f.write_str("Cancellation::Manual"),
        }
    }
}

/// An installed [`Cancellation`] waiting for a candidate to guard.
pub struct Trigger {
    fired: BoxFuture<'static, ()>,
    terminator: Terminator,
    resets_signals: bool,
}

impl Trigger {
    /// Stop listening without arming, when no candidate came up.
    pub fn release(self) {
        if self.resets_signals {
            restore_default_dispositions();
        }
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("resets_signals", &self.resets_signals)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Routing {
    Untouched,
    Promoted { previous: Option<RoutingState> },
}

#[derive(Debug)]
enum Window {
    Armed(Routing),
    Fired,
    Disarmed,
}

/// Kills the candidate if the deploy is cut short while it runs.
///
/// Armed exactly once per deploy, as soon as the candidate id is known,
/// and disarmed exactly once after `post-deploy`.
pub struct CancellationGuard {
    window: Arc<Mutex<Window>>,
    docker: DockerCli,
    registry: AppRegistry,
    app: AppName,
    candidate: ContainerId,
    listener: Option<JoinHandle<()>>,
    resets_signals: bool,
}

impl std::fmt::Debug for CancellationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationGuard")
            .field("app", &self.app)
            .field("candidate", &self.candidate)
            .field("window", &*self.window.lock())
            .finish()
    }
}

impl CancellationGuard {
    pub fn arm(
        trigger: Trigger,
        docker: DockerCli,
        registry: AppRegistry,
        app: AppName,
        candidate: ContainerId,
    ) -> Self {
        let Trigger {
            fired,
            terminator,
            resets_signals,
        } = trigger;
        let window = Arc::new(Mutex::new(Window::Armed(Routing::Untouched)));

        let listener = tokio::spawn(on_trigger(
            fired,
            terminator,
            window.clone(),
            docker.clone(),
            registry.clone(),
            app.clone(),
            candidate.clone(),
        ));
        tracing::debug!(app = %app, candidate = %candidate, "cancellation guard armed");

        Self {
            window,
            docker,
            registry,
            app,
            candidate,
            listener: Some(listener),
            resets_signals,
        }
    }

    /// Write the candidate's routing state while the window is still armed.
    ///
    /// Once attempted, a later trigger or abort puts `previous` back, even if
    /// the write itself failed half way.
    pub fn promote(
        &self,
        routing: &RoutingState,
        previous: Option<RoutingState>,
    ) -> Result<(), DeployError> {
        let mut window = self.window.lock();
        if !matches!(*window, Window::Armed(_)) {
            return Err(DeployError::Interrupted(self.candidate.clone()));
        }
        *window = Window::Armed(Routing::Promoted { previous });
        self.registry.promote(&self.app, routing)?;
        Ok(())
    }

    /// Undo a promotion made through this guard, if any.
    pub fn restore_routing(&self) -> Option<Result<(), RegistryError>> {
        let mut window = self.window.lock();
        let Window::Armed(routing) = &mut *window else {
            return None;
        };
        match std::mem::replace(routing, Routing::Untouched) {
            Routing::Untouched => None,
            Routing::Promoted { previous } => {
                Some(self.registry.restore(&self.app, previous.as_ref()))
            }
        }
    }

    /// Close the window. Fails if a trigger already fired.
    ///
    /// After a trigger this only returns once the candidate has been dealt
    /// with and the routing records are back, so callers may exit right away.
    pub async fn disarm(mut self) -> Result<(), DeployError> {
        let fired = {
            let mut window = self.window.lock();
            match *window {
                Window::Fired => true,
                _ => {
                    *window = Window::Disarmed;
                    false
                }
            }
        };

        if fired {
            if let Some(listener) = self.listener.take()
                && let Err(e) = listener.await
            {
                tracing::warn!("Cancellation listener for {} failed: {}", self.candidate, e);
            }
            return Err(DeployError::Interrupted(self.candidate.clone()));
        }

        self.stop_listening();
        tracing::debug!(app = %self.app, candidate = %self.candidate, "cancellation guard disarmed");
        Ok(())
    }

    fn stop_listening(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if self.resets_signals {
            restore_default_dispositions();
        }
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        let routing = {
            let mut window = self.window.lock();
            match std::mem::replace(&mut *window, Window::Disarmed) {
                Window::Armed(routing) => routing,
                other => {
                    *window = other;
                    return;
                }
            }
        };

        tracing::warn!(candidate = %self.candidate, "deploy abandoned, killing candidate");
        if let Err(e) = self.docker.kill_detached(&self.candidate) {
            tracing::warn!("Failed to kill candidate {}: {}", self.candidate, e);
        }
        if let Routing::Promoted { previous } = routing
            && let Err(e) = self.registry.restore(&self.app, previous.as_ref())
        {
            tracing::warn!("Failed to restore routing state for {}: {}", self.app, e);
        }
        self.stop_listening();
    }
}

async fn on_trigger(
    trigger: BoxFuture<'static, ()>,
    terminator: Terminator,
    window: Arc<Mutex<Window>>,
    docker: DockerCli,
    registry: AppRegistry,
    app: AppName,
    candidate: ContainerId,
) {
    trigger.await;

    let routing = {
        let mut window = window.lock();
        match std::mem::replace(&mut *window, Window::Fired) {
            Window::Armed(routing) => routing,
            other => {
                *window = other;
                return;
            }
        }
    };

    tracing::warn!(app = %app, candidate = %candidate, "deploy interrupted, killing candidate");
    if let Err(e) = docker.kill_if_exists(&candidate).await {
        tracing::warn!("Failed to kill candidate {}: {}", candidate, e);
    }
    if let Routing::Promoted { previous } = routing
        && let Err(e) = registry.restore(&app, previous.as_ref())
    {
        tracing::warn!("Failed to restore routing state for {}: {}", app, e);
    }

    terminator();
}

fn restore_default_dispositions() {
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: SIG_DFL installs no handler code of ours.
        if let Err(e) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
            tracing::warn!("Failed to reset {} disposition: {}", sig, e);
        }
    }
}

/// Take the whole process group down, including whatever docker client
/// children are still attached to the terminal.
fn terminate_process_group() {
    restore_default_dispositions();
    let group = nix::unistd::getpgrp();
    if let Err(e) = signal::killpg(group, Signal::SIGKILL) {
        tracing::warn!("Failed to kill process group {}: {}", group, e);
        std::process::exit(130);
    }
}
