// ABOUTME: Diagnostics accumulator for non-fatal warnings during a pipeline run.
// ABOUTME: Best-effort failures land here instead of failing the stage.

/// Collects non-fatal warnings.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Warnings recorded so far, oldest first.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// True once anything has been recorded.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_kind(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A cleanup sweep could not be started.
    pub fn cleanup_spawn(message: impl Into<String>) -> Self {
        Self::new(WarningKind::CleanupSpawn, message)
    }

    /// An instance could not be killed.
    pub fn kill_failed(message: impl Into<String>) -> Self {
        Self::new(WarningKind::KillFailed, message)
    }

    pub fn post_deploy_hook(message: impl Into<String>) -> Self {
        Self::new(WarningKind::PostDeployHook, message)
    }

    /// Previous routing records could not be put back after an abort.
    pub fn routing_restore(message: impl Into<String>) -> Self {
        Self::new(WarningKind::RoutingRestore, message)
    }

    /// Recorded routing state was unreadable and will not be restored.
    pub fn routing_snapshot(message: impl Into<String>) -> Self {
        Self::new(WarningKind::RoutingSnapshot, message)
    }

    /// The deploy lock could not be removed.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn stale_lock(message: impl Into<String>) -> Self {
        Self::new(WarningKind::StaleLock, message)
    }
}

/// Categories of warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    CleanupSpawn,
    KillFailed,
    /// The post-deploy hook exited non-zero after promotion.
    PostDeployHook,
    RoutingRestore,
    /// Routing records were unreadable when a deploy started.
    RoutingSnapshot,
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// A stale lock left by another deploy was broken.
    StaleLock,
}
