//! Error types for cluster orchestration.

use thiserror::Error;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while orchestrating a cluster session.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("session for container '{container}' is locked by pid {pid} ({path})")]
    SessionLocked {
        container: String,
        pid: u32,
        path: String,
    },

    #[error("failed to manage session lock: {0}")]
    Lock(#[source] std::io::Error),

    #[error("mod bundle not found: {path}")]
    ModNotFound { path: String },

    #[error("mod bundle {path} is missing its entry-point script '{entrypoint}'")]
    ModMissingEntrypoint { path: String, entrypoint: &'static str },

    #[error("failed to stage mod '{name}' on {node}: {detail}")]
    ModStageFailed {
        name: String,
        node: String,
        detail: String,
    },

    #[error("mod '{name}' failed on {node} with status {status}: {detail}")]
    ModFailed {
        name: String,
        node: String,
        status: i32,
        detail: String,
    },

    #[error("failed to write mod barrier marker on {node}: {detail}")]
    BarrierSignalFailed { node: String, detail: String },

    #[error("failed to start container on {node}: {detail}")]
    ContainerStartFailed { node: String, detail: String },

    #[error("runtime cluster not ready after {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    #[error(transparent)]
    Exec(#[from] rayup_exec::ExecError),
}
