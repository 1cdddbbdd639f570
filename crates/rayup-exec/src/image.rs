//! Container image collaborator — existence probe and build delegation.
//!
//! Building is not this control-plane's business: it is delegated to an
//! external build command that takes an image tag, opaque build flags,
//! and a worker copy-list. Only the invocation shape is specified here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::executor::{Executor, Host, sh_quote};

/// Whether `image` is present in the docker daemon on `host`.
pub async fn image_exists<E: Executor>(exec: &E, host: &Host, image: &str) -> Result<bool> {
    let out = exec
        .run(host, &format!("docker image inspect {} >/dev/null 2>&1", sh_quote(image)))
        .await?;
    Ok(out.success())
}

/// Delegates image builds to an external build-and-copy command.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    command: PathBuf,
}

impl ImageBuilder {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into() }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Build `image`, passing the recipe's opaque build flags, and copy
    /// the result to `copy_to` workers. Streams output to the user.
    pub async fn build<E: Executor>(
        &self,
        exec: &E,
        image: &str,
        build_args: &[String],
        copy_to: &[String],
    ) -> Result<()> {
        if !self.command.exists() {
            bail!(
                "build command not found: {} (set --build-command or place it next to the recipes)",
                self.command.display()
            );
        }

        let mut cmd = format!("{} -t {}", sh_quote(&self.command.display().to_string()), sh_quote(image));
        for arg in build_args {
            cmd.push(' ');
            cmd.push_str(&sh_quote(arg));
        }
        if !copy_to.is_empty() {
            cmd.push_str(" --copy-to ");
            cmd.push_str(&sh_quote(&copy_to.join(",")));
        }

        info!(%image, workers = copy_to.len(), "building container image");
        let status = exec
            .run_inherited(&Host::Local, &cmd)
            .await
            .context("failed to invoke build command")?;
        if status != 0 {
            bail!("image build failed with status {status}");
        }
        Ok(())
    }
}
