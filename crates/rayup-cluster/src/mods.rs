//! Mod distribution protocol.
//!
//! A mod is a bundle (directory or tarball) carrying an `apply.sh`
//! entry-point, applied inside every running container before the
//! workload starts. Per node the protocol is stage → inject → execute →
//! signal: the staged copy is released no matter what, a non-zero
//! entry-point is fatal for the whole launch, and the barrier marker is
//! only written once every mod on that node has succeeded.
//!
//! The coordinator is patched fully before any peer; peers go
//! sequentially in node-set order.

use std::path::{Path, PathBuf};

use rayup_core::Topology;
use rayup_exec::executor::sh_quote;
use rayup_exec::{Executor, Host};
use tracing::{debug, info};

use crate::docker;
use crate::error::{ClusterError, ClusterResult};

/// Fixed entry-point script every mod bundle must carry at its root.
pub const MOD_ENTRYPOINT: &str = "apply.sh";
/// Workspace inside the container where mods are materialized.
pub const MOD_WORKSPACE: &str = "/workspace/mods";
/// Barrier marker the container's startup command waits on.
pub const MOD_BARRIER_MARKER: &str = "/tmp/.rayup-mods-applied";

/// A validated mod bundle.
#[derive(Debug, Clone)]
pub struct ModBundle {
    pub name: String,
    pub path: PathBuf,
    pub archive: bool,
}

impl ModBundle {
    /// Validate a caller-supplied bundle path.
    ///
    /// Directory bundles must contain the entry-point; archives are
    /// checked in [`preflight_all`] (listing a tarball needs a command,
    /// but still happens before any node is contacted).
    pub fn load(path: impl Into<PathBuf>) -> ClusterResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(ClusterError::ModNotFound {
                path: path.display().to_string(),
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive = file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz");

        if !archive && !path.join(MOD_ENTRYPOINT).is_file() {
            return Err(ClusterError::ModMissingEntrypoint {
                path: path.display().to_string(),
                entrypoint: MOD_ENTRYPOINT,
            });
        }

        let name = file_name
            .trim_end_matches(".tar.gz")
            .trim_end_matches(".tgz")
            .to_string();
        Ok(Self { name, path, archive })
    }
}

/// Verify every archive bundle carries the entry-point, locally, before
/// any node is contacted.
pub async fn preflight_all<E: Executor>(exec: &E, mods: &[ModBundle]) -> ClusterResult<()> {
    for bundle in mods.iter().filter(|m| m.archive) {
        let cmd = format!(
            "tar -tzf {} | grep -q -x -e {MOD_ENTRYPOINT} -e ./{MOD_ENTRYPOINT}",
            sh_quote(&bundle.path.display().to_string())
        );
        let out = exec.run(&Host::Local, &cmd).await?;
        if !out.success() {
            return Err(ClusterError::ModMissingEntrypoint {
                path: bundle.path.display().to_string(),
                entrypoint: MOD_ENTRYPOINT,
            });
        }
    }
    Ok(())
}

/// Apply every mod on every node: coordinator first, then peers in
/// node-set order.
pub async fn apply_all<E: Executor>(
    exec: &E,
    mods: &[ModBundle],
    topology: &Topology,
    local_addrs: &[String],
    container: &str,
) -> ClusterResult<()> {
    for node in topology.all_nodes() {
        apply_node(exec, mods, node, local_addrs, container).await?;
    }
    Ok(())
}

async fn apply_node<E: Executor>(
    exec: &E,
    mods: &[ModBundle],
    node: &str,
    local_addrs: &[String],
    container: &str,
) -> ClusterResult<()> {
    let host = Host::for_node(node, local_addrs);

    for bundle in mods {
        apply_one(exec, bundle, node, &host, container).await?;
    }

    // Signal: the container's startup wait-loop unblocks once this
    // marker exists.
    let out = exec
        .run(&host, &docker::exec_in(container, &format!("touch {MOD_BARRIER_MARKER}")))
        .await?;
    if !out.success() {
        return Err(ClusterError::BarrierSignalFailed {
            node: node.to_string(),
            detail: out.stderr.trim().to_string(),
        });
    }

    info!(%node, mods = mods.len(), "mods applied and barrier signalled");
    Ok(())
}

async fn apply_one<E: Executor>(
    exec: &E,
    bundle: &ModBundle,
    node: &str,
    host: &Host,
    container: &str,
) -> ClusterResult<()> {
    // Stage: local nodes use the source path as-is; remote nodes get a
    // unique temp copy, released regardless of outcome.
    let (staged, remote_tmp) = if host.is_local() {
        (bundle.path.clone(), None)
    } else {
        let tmp = PathBuf::from(format!(
            "/tmp/rayup-stage-{}-{}",
            std::process::id(),
            bundle.name
        ));
        exec.copy(host, &bundle.path, &tmp)
            .await
            .map_err(|e| ClusterError::ModStageFailed {
                name: bundle.name.clone(),
                node: node.to_string(),
                detail: e.to_string(),
            })?;
        (tmp.clone(), Some(tmp))
    };

    let result = inject_and_execute(exec, bundle, &staged, node, host, container).await;

    if let Some(tmp) = remote_tmp {
        // Guaranteed release of the staged copy, success or not.
        let _ = exec
            .run(host, &format!("rm -rf {}", sh_quote(&tmp.display().to_string())))
            .await;
    }

    result
}

async fn inject_and_execute<E: Executor>(
    exec: &E,
    bundle: &ModBundle,
    staged: &Path,
    node: &str,
    host: &Host,
    container: &str,
) -> ClusterResult<()> {
    let target = format!("{MOD_WORKSPACE}/{}", bundle.name);

    // Inject into the running container. Archives extract inside the
    // container, not on the host.
    let inject = if bundle.archive {
        let in_container = format!("/tmp/{}.tgz", bundle.name);
        let cp = exec
            .run(host, &docker::cp_into(container, staged, &in_container))
            .await?;
        if !cp.success() {
            return Err(stage_err(bundle, node, &cp.stderr));
        }
        exec.run(
            host,
            &docker::exec_in(
                container,
                &format!(
                    "mkdir -p {target} && tar -xzf {in_container} -C {target} && rm -f {in_container}"
                ),
            ),
        )
        .await?
    } else {
        let mkdir = exec
            .run(host, &docker::exec_in(container, &format!("mkdir -p {MOD_WORKSPACE}")))
            .await?;
        if !mkdir.success() {
            return Err(stage_err(bundle, node, &mkdir.stderr));
        }
        exec.run(host, &docker::cp_into(container, staged, &target))
            .await?
    };
    if !inject.success() {
        return Err(stage_err(bundle, node, &inject.stderr));
    }

    // Execute the entry-point with the injected path as working dir.
    debug!(mod_name = %bundle.name, %node, "running mod entry-point");
    let run = exec
        .run(host, &docker::exec_in_at(container, &target, &format!("bash {MOD_ENTRYPOINT}")))
        .await?;
    if !run.success() {
        return Err(ClusterError::ModFailed {
            name: bundle.name.clone(),
            node: node.to_string(),
            status: run.status,
            detail: run.stderr.trim().to_string(),
        });
    }

    Ok(())
}

fn stage_err(bundle: &ModBundle, node: &str, stderr: &str) -> ClusterError {
    ClusterError::ModStageFailed {
        name: bundle.name.clone(),
        node: node.to_string(),
        detail: stderr.trim().to_string(),
    }
}
