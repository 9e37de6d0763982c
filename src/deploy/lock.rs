// ABOUTME: Opt-in deploy lock to serialize deployments of the same app.
// ABOUTME: Atomic create-new of <app>/.deploy.lock holding JSON lock info.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostics, Warning};
use crate::types::AppName;

use super::DeployError;

pub const LOCK_FILENAME: &str = ".deploy.lock";

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// App being deployed.
    pub app: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(app: &AppName) -> Self {
        Self {
            holder: this_host(),
            pid: std::process::id(),
            started_at: Utc::now(),
            app: app.to_string(),
        }
    }

    /// Whether the lock has been held for at least `stale_after`.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        (Utc::now() - self.started_at)
            .to_std()
            .is_ok_and(|age| age >= stale_after)
    }

    /// Whether the holding process could still be running.
    ///
    /// Only checkable for holders on this host; others are assumed alive.
    pub fn holder_alive(&self) -> bool {
        if self.holder != this_host() {
            return true;
        }
        let Ok(pid) = i32::try_from(self.pid) else {
            return false;
        };
        !matches!(
            nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None),
            Err(nix::errno::Errno::ESRCH)
        )
    }

    pub fn lock_path(app_dir: &Path) -> PathBuf {
        app_dir.join(LOCK_FILENAME)
    }
}

fn this_host() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// A held deploy lock. Removed on release or drop.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    released: bool,
}

impl DeployLock {
    /// Acquire the deploy lock in `app_dir`.
    ///
    /// Breaks locks that are stale, unreadable, or held by a dead process
    /// on this host, recording a warning.
    pub fn acquire(
        app_dir: &Path,
        app: &AppName,
        stale_after: Duration,
        diag: &mut Diagnostics,
    ) -> Result<Self, DeployError> {
        let path = LockInfo::lock_path(app_dir);
        let lock_json = serde_json::to_string(&LockInfo::new(app))
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {}", e)))?;

        if Self::try_create(&path, &lock_json)? {
            return Ok(Self::held(path));
        }

        match Self::read_existing(&path) {
            Some(existing) if !existing.is_stale(stale_after) && existing.holder_alive() => {
                return Err(DeployError::lock_held(
                    app.as_str(),
                    existing.holder,
                    existing.pid,
                    existing.started_at,
                ));
            }
            Some(existing) => diag.warn(Warning::stale_lock(format!(
                "Breaking stale lock held by {} (pid {}) since {}",
                existing.holder, existing.pid, existing.started_at
            ))),
            None => diag.warn(Warning::stale_lock("Lock info unreadable, breaking lock")),
        }

        tracing::debug!("Removing stale lock at {}", path.display());
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DeployError::lock_error(format!(
                    "failed to break lock {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        if Self::try_create(&path, &lock_json)? {
            Ok(Self::held(path))
        } else {
            Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ))
        }
    }

    fn held(path: PathBuf) -> Self {
        tracing::debug!("Acquired deploy lock {}", path.display());
        Self {
            path,
            released: false,
        }
    }

    /// `Ok(false)` when the file already exists.
    fn try_create(path: &Path, contents: &str) -> Result<bool, DeployError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(DeployError::lock_error(format!(
                    "failed to create {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        file.write_all(contents.as_bytes())
            .map_err(|e| DeployError::lock_error(format!("failed to write lock info: {}", e)))?;
        Ok(true)
    }

    fn read_existing(path: &Path) -> Option<LockInfo> {
        let contents = fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DeployError::lock_error(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}
