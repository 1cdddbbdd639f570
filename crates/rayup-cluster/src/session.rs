//! Cluster session state and the starter lock.
//!
//! The session records what this invocation owns: the container name,
//! whether the session already existed when we arrived (pre-existing
//! sessions are never torn down on exit), and the lifecycle state.
//!
//! The lock serializes concurrent *starters* of the same container name
//! on one machine. It is a PID file: a live holder refuses the new
//! starter, a dead holder's lock is reclaimed. Detecting sessions
//! started elsewhere remains the idempotency probe's job.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ClusterError, ClusterResult};

/// Lifecycle state of the launch orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// One invocation's view of a cluster session.
#[derive(Debug)]
pub struct Session {
    pub container: String,
    /// The session was already running when `start` was invoked.
    pub preexisting: bool,
    pub state: SessionState,
    /// Held for the lifetime of a session we started ourselves.
    lock: Option<SessionLock>,
}

impl Session {
    /// A session we started and own.
    pub fn owned(container: impl Into<String>, lock: SessionLock) -> Self {
        Self {
            container: container.into(),
            preexisting: false,
            state: SessionState::Running,
            lock: Some(lock),
        }
    }

    /// A session that was already live when we arrived.
    pub fn preexisting(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            preexisting: true,
            state: SessionState::Running,
            lock: None,
        }
    }

    /// Whether exit-time teardown applies to this session.
    pub fn teardown_on_exit(&self) -> bool {
        !self.preexisting
    }

    /// Whether this invocation still holds the starter lock.
    pub fn holds_lock(&self) -> bool {
        self.lock.is_some()
    }

    pub fn mark(&mut self, state: SessionState) {
        self.state = state;
        if matches!(state, SessionState::Idle | SessionState::Failed) {
            self.lock = None; // Release.
        }
    }
}

/// PID-file lock guarding session startup.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    /// Acquire the lock for `container`, storing it under `state_dir`.
    pub fn acquire(state_dir: &Path, container: &str) -> ClusterResult<Self> {
        let dir = state_dir.join(".rayup");
        std::fs::create_dir_all(&dir).map_err(ClusterError::Lock)?;
        let path = dir.join(format!("{container}.lock"));

        if let Ok(content) = std::fs::read_to_string(&path) {
            if let Ok(pid) = content.trim().parse::<u32>() {
                if pid_alive(pid) {
                    return Err(ClusterError::SessionLocked {
                        container: container.to_string(),
                        pid,
                        path: path.display().to_string(),
                    });
                }
                warn!(%pid, path = %path.display(), "reclaiming stale session lock");
            }
        }

        std::fs::write(&path, std::process::id().to_string()).map_err(ClusterError::Lock)?;
        debug!(path = %path.display(), "session lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove session lock");
            }
        }
    }
}

/// Whether a process with this PID exists.
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}
