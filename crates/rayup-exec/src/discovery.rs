//! Topology discovery collaborator.
//!
//! Autodiscovery heuristics (interface scanning, peer probing) live in an
//! external command that prints `KEY=value` lines. Its output is purely
//! advisory — explicit CLI flags always win.

use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::debug;

use crate::executor::{Executor, Host, sh_quote};

/// What the discovery command reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// Candidate cluster nodes, in the order reported.
    pub nodes: Vec<String>,
    /// This machine's primary address.
    pub local_ip: Option<String>,
    /// Ethernet interface name.
    pub eth_if: Option<String>,
    /// InfiniBand interface name, when present.
    pub ib_if: Option<String>,
}

/// Wraps the external discovery command.
#[derive(Debug, Clone)]
pub struct Discovery {
    command: PathBuf,
}

/// Addresses bound on this machine.
///
/// Uses `hostname -I`; loopback names are appended so single-machine
/// node sets written as `127.0.0.1` or `localhost` still resolve.
pub async fn local_addresses<E: Executor>(exec: &E) -> Result<Vec<String>> {
    let out = exec.run(&Host::Local, "hostname -I").await?;
    let mut addrs: Vec<String> = out
        .stdout
        .split_whitespace()
        .map(str::to_string)
        .collect();
    addrs.push("127.0.0.1".to_string());
    addrs.push("localhost".to_string());
    debug!(count = addrs.len(), "local addresses resolved");
    Ok(addrs)
}

impl Discovery {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into() }
    }

    /// Run the discovery command and parse its `KEY=value` report.
    pub async fn discover<E: Executor>(&self, exec: &E) -> Result<Discovered> {
        if !self.command.exists() {
            bail!(
                "discovery command not found: {} (set --discover-command or pass -n explicitly)",
                self.command.display()
            );
        }

        let out = exec
            .run(&Host::Local, &sh_quote(&self.command.display().to_string()))
            .await?;
        if !out.success() {
            bail!(
                "discovery failed with status {}: {}",
                out.status,
                out.stderr.trim()
            );
        }

        let mut found = Discovered::default();
        for line in out.stdout.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "CLUSTER_NODES" => {
                    found.nodes = value
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "LOCAL_IP" => found.local_ip = Some(value.to_string()),
                "ETH_IF" => found.eth_if = Some(value.to_string()),
                "IB_IF" => found.ib_if = Some(value.to_string()),
                _ => {}
            }
        }

        debug!(nodes = found.nodes.len(), local_ip = ?found.local_ip, "discovery finished");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedExecutor;

    #[tokio::test]
    async fn local_addresses_include_loopback() {
        let exec = ScriptedExecutor::new();
        exec.stdout_on("hostname -I", "10.0.0.1 192.168.1.5\n");

        let addrs = local_addresses(&exec).await.unwrap();
        assert!(addrs.contains(&"10.0.0.1".to_string()));
        assert!(addrs.contains(&"192.168.1.5".to_string()));
        assert!(addrs.contains(&"127.0.0.1".to_string()));
    }

    #[tokio::test]
    async fn discover_parses_report() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("autodiscover.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();

        let exec = ScriptedExecutor::new();
        exec.stdout_on(
            "autodiscover.sh",
            "scanning interfaces...\nCLUSTER_NODES=10.0.0.1, 10.0.0.2\nLOCAL_IP=10.0.0.1\nETH_IF=eth0\nIB_IF=\n",
        );

        let found = Discovery::new(&script).discover(&exec).await.unwrap();
        assert_eq!(found.nodes, ["10.0.0.1", "10.0.0.2"]);
        assert_eq!(found.local_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(found.eth_if.as_deref(), Some("eth0"));
        assert_eq!(found.ib_if, None);
    }

    #[tokio::test]
    async fn discover_missing_command_is_actionable() {
        let exec = ScriptedExecutor::new();
        let err = Discovery::new("/nonexistent/autodiscover.sh")
            .discover(&exec)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("discovery command not found"));
    }
}
