//! Subcommand implementations and shared helpers.

pub mod cluster;
pub mod discover;
pub mod list;
pub mod run;

use std::path::PathBuf;

use anyhow::Result;
use rayup_core::{ExecMode, Topology};
use rayup_exec::{Executor, local_addresses};

/// Paths every subcommand shares.
pub struct Context {
    pub recipes_dir: PathBuf,
    pub env_file: PathBuf,
    pub state_dir: PathBuf,
}

/// Parse a `KEY=VALUE` environment injection.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

/// Resolve the topology and this machine's addresses for a mode.
///
/// Explicit node lists use legacy addressing (first entry is the head);
/// persisted lists derive the head by matching local addresses.
pub async fn topology_for<E: Executor>(
    exec: &E,
    mode: &ExecMode,
    explicit_nodes: bool,
) -> Result<(Topology, Vec<String>)> {
    match mode {
        ExecMode::Solo => {
            let local = vec!["127.0.0.1".to_string(), "localhost".to_string()];
            Ok((
                Topology {
                    head: "127.0.0.1".to_string(),
                    peers: Vec::new(),
                    is_head: true,
                },
                local,
            ))
        }
        ExecMode::Cluster(nodes) => {
            let local = local_addresses(exec).await?;
            let topology = if explicit_nodes {
                Topology::legacy(nodes, &local)
            } else {
                Topology::resolve(nodes, &local)?
            };
            Ok((topology, local))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pair_parses() {
        assert_eq!(
            parse_env_pair("HF_TOKEN=abc").unwrap(),
            ("HF_TOKEN".to_string(), "abc".to_string())
        );
        assert!(parse_env_pair("no-equals").is_err());
    }
}
