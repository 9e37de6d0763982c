// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: States past candidate start carry the candidate and its cancellation guard.

use crate::registry::RoutingState;
use crate::types::ContainerId;

use super::guard::CancellationGuard;

/// Initial state: nothing has run yet.
/// Available actions: `pre_deploy()`
#[derive(Debug, Default)]
pub struct Idle;

/// Pre-deploy hook ran and the incumbent is known.
/// Available actions: `start_candidate()`
#[derive(Debug)]
pub struct PreDeployed {
    pub(crate) incumbent: Option<ContainerId>,
    pub(crate) previous: Option<RoutingState>,
}

/// Candidate running with a published port; signal guard armed.
/// Available actions: `health_check()`, `abort()`
#[derive(Debug)]
pub struct CandidateStarted {
    pub(crate) window: CandidateWindow,
}

/// `check-deploy` accepted the candidate.
/// Available actions: `promote()`, `abort()`
#[derive(Debug)]
pub struct HealthChecked {
    pub(crate) window: CandidateWindow,
}

/// Routing records point at the candidate.
/// Available actions: `post_deploy()`, `abort()`
#[derive(Debug)]
pub struct Promoted {
    pub(crate) window: CandidateWindow,
    pub(crate) routing: RoutingState,
}

/// Post-deploy hook ran; still inside the signal window.
/// Available actions: `retire_incumbent()`, `abort()`
#[derive(Debug)]
pub struct PostDeployed {
    pub(crate) window: CandidateWindow,
    pub(crate) routing: RoutingState,
}

/// Guard disarmed and incumbent retired.
/// Available actions: `finish()`
#[derive(Debug)]
pub struct Completed {
    pub(crate) routing: RoutingState,
}

/// Everything that exists only while a candidate may still be thrown away.
#[derive(Debug)]
pub struct CandidateWindow {
    pub(crate) incumbent: Option<ContainerId>,
    pub(crate) previous: Option<RoutingState>,
    pub(crate) candidate: ContainerId,
    pub(crate) port: u16,
    pub(crate) guard: CancellationGuard,
}

/// States from which a deploy can still be abandoned.
pub trait Abortable: sealed::Sealed {
    #[doc(hidden)]
    fn into_window(self) -> CandidateWindow;
    #[doc(hidden)]
    fn window(&self) -> &CandidateWindow;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::CandidateStarted {}
    impl Sealed for super::HealthChecked {}
    impl Sealed for super::Promoted {}
    impl Sealed for super::PostDeployed {}
}

impl Abortable for CandidateStarted {
    fn into_window(self) -> CandidateWindow {
        self.window
    }

    fn window(&self) -> &CandidateWindow {
        &self.window
    }
}

impl Abortable for HealthChecked {
    fn into_window(self) -> CandidateWindow {
        self.window
    }

    fn window(&self) -> &CandidateWindow {
        &self.window
    }
}

impl Abortable for Promoted {
    fn into_window(self) -> CandidateWindow {
        self.window
    }

    fn window(&self) -> &CandidateWindow {
        &self.window
    }
}

impl Abortable for PostDeployed {
    fn into_window(self) -> CandidateWindow {
        self.window
    }

    fn window(&self) -> &CandidateWindow {
        &self.window
    }
}
