//! Persisted cluster configuration — a flat `KEY=value` file.
//!
//! `rayup discover` writes the topology it finds here so later runs can
//! resolve cluster mode without flags. The format is a plain env file:
//! comments start with `#`, values may be single- or double-quoted.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Comma-separated node addresses discovered for the cluster.
pub const KEY_CLUSTER_NODES: &str = "CLUSTER_NODES";
/// This machine's primary address.
pub const KEY_LOCAL_IP: &str = "LOCAL_IP";
/// Ethernet interface name.
pub const KEY_ETH_IF: &str = "ETH_IF";
/// InfiniBand interface name, when present.
pub const KEY_IB_IF: &str = "IB_IF";

/// A loaded env file plus the path it came from.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl EnvFile {
    /// Load an env file. A missing file yields an empty set of values.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut values = BTreeMap::new();

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                for line in content.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let Some((key, value)) = line.split_once('=') else {
                        continue;
                    };
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    values.insert(key.trim().to_string(), value.to_string());
                }
                debug!(path = %path.display(), entries = values.len(), "env file loaded");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no env file");
            }
            Err(e) => return Err(e),
        }

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Write the file back, quoting values that contain spaces or commas.
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut lines = vec!["# Auto-generated by rayup discover".to_string(), String::new()];
        for (key, value) in &self.values {
            if value.contains(' ') || value.contains(',') {
                lines.push(format!("{key}=\"{value}\""));
            } else {
                lines.push(format!("{key}={value}"));
            }
        }
        lines.push(String::new());

        std::fs::write(&self.path, lines.join("\n"))?;
        debug!(path = %self.path.display(), entries = self.values.len(), "env file saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::load(dir.path().join(".env")).unwrap();
        assert!(env.is_empty());
    }

    #[test]
    fn parses_comments_quotes_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# header\n\nCLUSTER_NODES=\"10.0.0.1,10.0.0.2\"\nLOCAL_IP=10.0.0.1\nETH_IF='eth0'\nnot a pair\n",
        )
        .unwrap();

        let env = EnvFile::load(&path).unwrap();
        assert_eq!(env.get(KEY_CLUSTER_NODES), Some("10.0.0.1,10.0.0.2"));
        assert_eq!(env.get(KEY_LOCAL_IP), Some("10.0.0.1"));
        assert_eq!(env.get(KEY_ETH_IF), Some("eth0"));
        assert_eq!(env.values().len(), 3);
    }

    #[test]
    fn round_trip_quotes_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        let mut env = EnvFile::load(&path).unwrap();
        env.set(KEY_CLUSTER_NODES, "10.0.0.1,10.0.0.2");
        env.set(KEY_LOCAL_IP, "10.0.0.1");
        env.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("CLUSTER_NODES=\"10.0.0.1,10.0.0.2\""));
        assert!(content.contains("LOCAL_IP=10.0.0.1"));

        let reloaded = EnvFile::load(&path).unwrap();
        assert_eq!(reloaded.get(KEY_CLUSTER_NODES), Some("10.0.0.1,10.0.0.2"));
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join(".env");

        let mut env = EnvFile::load(&path).unwrap();
        env.set(KEY_LOCAL_IP, "10.0.0.1");
        env.save().unwrap();
        assert!(path.is_file());
    }
}
