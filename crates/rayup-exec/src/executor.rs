//! The [`Executor`] trait and its local/SSH implementation.
//!
//! Commands are shell strings. A non-zero exit status is data, not an
//! error — callers inspect [`CommandOutput`]; [`ExecError`] is reserved
//! for failures to execute at all (spawn errors, transport problems).

use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

/// Result type alias for executor operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors raised by command execution itself.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("copy to {host} failed: {detail}")]
    Copy { host: String, detail: String },
}

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    /// This machine; no network hop.
    Local,
    /// A remote machine reached over SSH.
    Ssh(String),
}

impl Host {
    /// Pick the host for a node address given the machine's own addresses.
    pub fn for_node(addr: &str, local_addrs: &[String]) -> Self {
        if local_addrs.iter().any(|l| l == addr) {
            Host::Local
        } else {
            Host::Ssh(addr.to_string())
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Host::Local)
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Host::Local => write!(f, "local"),
            Host::Ssh(addr) => write!(f, "{addr}"),
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// A successful empty output, for fakes and defaults.
    pub fn ok() -> Self {
        Self {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Executes shell commands on named hosts.
pub trait Executor: Send + Sync + 'static {
    /// Run a command, capturing its output.
    fn run(
        &self,
        host: &Host,
        command: &str,
    ) -> impl Future<Output = ExecResult<CommandOutput>> + Send;

    /// Run a command with stdio inherited from the caller.
    ///
    /// Used for interactive exec, log attachment, and collaborator
    /// invocations whose progress the user should see. Returns the exit
    /// status.
    fn run_inherited(&self, host: &Host, command: &str)
    -> impl Future<Output = ExecResult<i32>> + Send;

    /// Copy a local path (recursively) to a path on the host.
    fn copy(
        &self,
        host: &Host,
        local: &Path,
        remote: &Path,
    ) -> impl Future<Output = ExecResult<()>> + Send;
}

/// Quote a string for inclusion in a shell command.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// SSH options applied to every remote hop.
const SSH_OPTS: [&str; 4] = ["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=no"];

/// The real executor: `sh -c` locally, `ssh`/`scp` remotely.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn command_for(host: &Host, command: &str) -> Command {
        match host {
            Host::Local => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                cmd
            }
            Host::Ssh(addr) => {
                let mut cmd = Command::new("ssh");
                cmd.args(SSH_OPTS).arg(addr).arg(command);
                cmd
            }
        }
    }
}

impl Executor for ShellExecutor {
    async fn run(&self, host: &Host, command: &str) -> ExecResult<CommandOutput> {
        trace!(%host, %command, "run");
        let output = Self::command_for(host, command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: if host.is_local() { "sh" } else { "ssh" }.to_string(),
                source,
            })?;

        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(%host, status = result.status, "command finished");
        Ok(result)
    }

    async fn run_inherited(&self, host: &Host, command: &str) -> ExecResult<i32> {
        trace!(%host, %command, "run (inherited stdio)");
        let status = Self::command_for(host, command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| ExecError::Spawn {
                program: if host.is_local() { "sh" } else { "ssh" }.to_string(),
                source,
            })?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn copy(&self, host: &Host, local: &Path, remote: &Path) -> ExecResult<()> {
        match host {
            Host::Local => {
                // Staging uses local paths in place; nothing to transfer.
                debug!(local = %local.display(), "local copy skipped");
                Ok(())
            }
            Host::Ssh(addr) => {
                let output = Command::new("scp")
                    .arg("-r")
                    .args(SSH_OPTS)
                    .arg(local)
                    .arg(format!("{addr}:{}", remote.display()))
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|source| ExecError::Spawn {
                        program: "scp".to_string(),
                        source,
                    })?;

                if !output.status.success() {
                    return Err(ExecError::Copy {
                        host: addr.clone(),
                        detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    });
                }
                debug!(host = %addr, local = %local.display(), remote = %remote.display(), "copied");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sh_quote_wraps_and_escapes() {
        assert_eq!(sh_quote("plain"), "'plain'");
        assert_eq!(sh_quote("a b"), "'a b'");
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn host_for_node_matches_local() {
        let local = vec!["10.0.0.1".to_string()];
        assert_eq!(Host::for_node("10.0.0.1", &local), Host::Local);
        assert_eq!(
            Host::for_node("10.0.0.2", &local),
            Host::Ssh("10.0.0.2".to_string())
        );
    }

    #[tokio::test]
    async fn local_run_captures_output() {
        let exec = ShellExecutor::new();
        let out = exec.run(&Host::Local, "echo hello").await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn local_run_reports_nonzero_status() {
        let exec = ShellExecutor::new();
        let out = exec.run(&Host::Local, "exit 3").await.unwrap();
        assert!(!out.success());
        assert_eq!(out.status, 3);
    }

    #[tokio::test]
    async fn local_copy_is_noop() {
        let exec = ShellExecutor::new();
        exec.copy(&Host::Local, Path::new("/tmp/a"), Path::new("/tmp/b"))
            .await
            .unwrap();
    }
}
