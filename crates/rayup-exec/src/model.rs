//! Model weight collaborator — cache probe and download delegation.
//!
//! Download mechanics (authentication, resumption, rsync to workers) are
//! an external command's business. The control-plane only checks the
//! local HuggingFace cache and invokes the command when needed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::executor::{Executor, Host, sh_quote};

/// Root of the HuggingFace cache, honoring `HF_HOME`.
fn hf_cache_root() -> Option<PathBuf> {
    if let Ok(hf_home) = std::env::var("HF_HOME") {
        return Some(PathBuf::from(hf_home));
    }
    dirs::home_dir().map(|h| h.join(".cache").join("huggingface"))
}

/// Whether `model` (e.g. `org/model-name`) looks fully downloaded.
///
/// A completed download has a non-empty `snapshots` directory under
/// `hub/models--org--model-name`.
pub fn model_in_cache(model: &str) -> bool {
    model_in_cache_at(hf_cache_root().as_deref(), model)
}

fn model_in_cache_at(root: Option<&Path>, model: &str) -> bool {
    let Some(root) = root else { return false };
    let cache_name = format!("models--{}", model.replace('/', "--"));
    let snapshots = root.join("hub").join(cache_name).join("snapshots");
    match std::fs::read_dir(&snapshots) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

/// Delegates model downloads to an external fetch command.
#[derive(Debug, Clone)]
pub struct ModelFetcher {
    command: PathBuf,
}

impl ModelFetcher {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into() }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Download `model` and sync it to `copy_to` workers.
    pub async fn fetch<E: Executor>(
        &self,
        exec: &E,
        model: &str,
        copy_to: &[String],
    ) -> Result<()> {
        if !self.command.exists() {
            bail!(
                "download command not found: {} (set --download-command)",
                self.command.display()
            );
        }

        let mut cmd = format!(
            "{} {}",
            sh_quote(&self.command.display().to_string()),
            sh_quote(model)
        );
        if !copy_to.is_empty() {
            cmd.push_str(" --copy-to ");
            cmd.push_str(&sh_quote(&copy_to.join(",")));
        }

        info!(%model, workers = copy_to.len(), "downloading model");
        let status = exec
            .run_inherited(&Host::Local, &cmd)
            .await
            .context("failed to invoke download command")?;
        if status != 0 {
            bail!("model download failed with status {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_miss_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!model_in_cache_at(Some(dir.path()), "org/model"));
    }

    #[test]
    fn cache_hit_needs_nonempty_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = dir
            .path()
            .join("hub")
            .join("models--org--model")
            .join("snapshots");
        std::fs::create_dir_all(&snapshots).unwrap();
        assert!(!model_in_cache_at(Some(dir.path()), "org/model"));

        std::fs::create_dir(snapshots.join("abc123")).unwrap();
        assert!(model_in_cache_at(Some(dir.path()), "org/model"));
    }

    #[test]
    fn cache_name_replaces_slashes() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = dir
            .path()
            .join("hub")
            .join("models--Salyut1--GLM-4.7-NVFP4")
            .join("snapshots");
        std::fs::create_dir_all(snapshots.join("rev")).unwrap();
        assert!(model_in_cache_at(Some(dir.path()), "Salyut1/GLM-4.7-NVFP4"));
    }

    #[tokio::test]
    async fn fetch_requires_existing_command() {
        let exec = crate::scripted::ScriptedExecutor::new();
        let fetcher = ModelFetcher::new("/nonexistent/hf-download.sh");
        let err = fetcher.fetch(&exec, "org/model", &[]).await.unwrap_err();
        assert!(err.to_string().contains("download command not found"));
    }
}
