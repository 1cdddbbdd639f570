//! The cluster launch orchestrator.
//!
//! Owns the start/stop/status/exec actions over one container name
//! across a node set. Start is idempotent against live sessions, guarded
//! by the starter lock, and transactional: any failure mid-launch
//! triggers compensating stops on every node already started — the
//! coordinator included.

use std::path::PathBuf;
use std::sync::Arc;

use rayup_core::Topology;
use rayup_exec::{CommandOutput, Executor, Host};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::docker::{self, ContainerSpec, NodeRole};
use crate::error::{ClusterError, ClusterResult};
use crate::mods::{self, ModBundle};
use crate::readiness::ReadinessProbe;
use crate::session::{Session, SessionLock};

/// Non-privileged resource limits applied to every container.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimits {
    pub memory: Option<String>,
    pub memory_swap: Option<String>,
    pub pids_limit: Option<u64>,
    pub shm_size: Option<String>,
}

/// Everything `start` needs, assembled by the caller.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub image: String,
    pub container: String,
    /// Host path of the generated launch script.
    pub launch_script: Option<String>,
    pub mods: Vec<ModBundle>,
    pub env: Vec<(String, String)>,
    pub limits: ResourceLimits,
    pub nccl_debug: Option<String>,
    pub eth_if: Option<String>,
    pub ib_if: Option<String>,
    /// Launch peer containers concurrently instead of sequentially.
    pub parallel_fanout: bool,
    /// Where the session lock lives.
    pub state_dir: PathBuf,
}

/// Per-node view returned by `status`.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub node: String,
    pub running: bool,
}

/// Result of a `status` action.
#[derive(Debug, Clone)]
pub struct ClusterStatus {
    pub nodes: Vec<NodeStatus>,
    /// The runtime's own status output, when the head container is up.
    pub runtime: Option<String>,
}

/// Drives container lifecycle across the node set.
pub struct Orchestrator<E: Executor> {
    exec: Arc<E>,
    probe: ReadinessProbe,
}

impl<E: Executor> Orchestrator<E> {
    pub fn new(exec: Arc<E>) -> Self {
        Self {
            exec,
            probe: ReadinessProbe::default(),
        }
    }

    /// Replace the readiness probe (tests use tighter timings).
    pub fn with_probe(mut self, probe: ReadinessProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Start the session on every node.
    ///
    /// A session already live on any node short-circuits to `Running`
    /// without touching containers; the returned session then suppresses
    /// teardown-on-exit.
    pub async fn start(
        &self,
        plan: &LaunchPlan,
        topology: &Topology,
        local_addrs: &[String],
    ) -> ClusterResult<Session> {
        // Validate mod bundles before any node is contacted — the
        // idempotency probe below already reaches out to peers.
        mods::preflight_all(self.exec.as_ref(), &plan.mods).await?;

        // Idempotency probe across head + peers.
        for node in topology.all_nodes() {
            let host = Host::for_node(node, local_addrs);
            if self.node_running(&host, &plan.container).await? {
                info!(%node, container = %plan.container, "session already running; reusing it");
                return Ok(Session::preexisting(&plan.container));
            }
        }

        let lock = SessionLock::acquire(&plan.state_dir, &plan.container)?;

        let solo = topology.peers.is_empty();
        let head_role = if solo { NodeRole::Solo } else { NodeRole::Head };
        let wait_for_mods = !plan.mods.is_empty();

        let mut started: Vec<(String, Host)> = Vec::new();

        // Head container first.
        let head_host = Host::for_node(&topology.head, local_addrs);
        let head_cmd = docker::run_container(
            &self.spec_for(plan, head_role, wait_for_mods),
            head_role,
            &topology.head,
        );
        if let Err(e) = self
            .launch_node(&head_host, &topology.head, &head_cmd)
            .await
        {
            started.push((topology.head.clone(), head_host));
            self.rollback(&plan.container, &started).await;
            return Err(e);
        }
        started.push((topology.head.clone(), head_host));
        info!(node = %topology.head, "head container started");

        // Peers, in node-set order (or concurrently when requested).
        if let Err(e) = self
            .launch_peers(plan, topology, local_addrs, wait_for_mods, &mut started)
            .await
        {
            self.rollback(&plan.container, &started).await;
            return Err(e);
        }

        // Mods before the workload: every container's startup command is
        // blocked on the barrier marker until its node is fully patched.
        if wait_for_mods {
            if let Err(e) = mods::apply_all(
                self.exec.as_ref(),
                &plan.mods,
                topology,
                local_addrs,
                &plan.container,
            )
            .await
            {
                self.rollback(&plan.container, &started).await;
                return Err(e);
            }
        }

        // Runtime readiness, unless running solo.
        if !solo {
            let head_host = Host::for_node(&topology.head, local_addrs);
            if let Err(e) = self
                .probe
                .wait_ready(self.exec.as_ref(), &head_host, &plan.container)
                .await
            {
                self.rollback(&plan.container, &started).await;
                return Err(e);
            }
        }

        Ok(Session::owned(&plan.container, lock))
    }

    /// Best-effort stop on every node. Per-node failures are warnings;
    /// stop never requires full connectivity.
    pub async fn stop(&self, container: &str, topology: &Topology, local_addrs: &[String]) {
        for node in topology.all_nodes() {
            let host = Host::for_node(node, local_addrs);
            match self.exec.run(&host, &docker::remove_container(container)).await {
                Ok(out) if out.success() => info!(%node, "container stopped"),
                Ok(out) => warn!(%node, stderr = %out.stderr.trim(), "container stop failed"),
                Err(e) => warn!(%node, error = %e, "node unreachable during stop"),
            }
        }
    }

    /// Best-effort per-node inspection.
    pub async fn status(
        &self,
        container: &str,
        topology: &Topology,
        local_addrs: &[String],
    ) -> ClusterStatus {
        let mut nodes = Vec::new();
        for node in topology.all_nodes() {
            let host = Host::for_node(node, local_addrs);
            let running = match self.node_running(&host, container).await {
                Ok(running) => running,
                Err(e) => {
                    warn!(%node, error = %e, "node unreachable during status");
                    false
                }
            };
            nodes.push(NodeStatus {
                node: node.clone(),
                running,
            });
        }

        let head_up = nodes.first().is_some_and(|n| n.running);
        let runtime = if head_up {
            let host = Host::for_node(&topology.head, local_addrs);
            match self.exec.run(&host, &docker::runtime_status(container)).await {
                Ok(out) if out.success() => Some(out.stdout),
                _ => None,
            }
        } else {
            None
        };

        ClusterStatus { nodes, runtime }
    }

    /// Run a command inside the head container, starting the session
    /// first if none exists.
    pub async fn exec_command(
        &self,
        plan: &LaunchPlan,
        topology: &Topology,
        local_addrs: &[String],
        command: &str,
        interactive: bool,
    ) -> ClusterResult<(Session, i32)> {
        let session = self.start(plan, topology, local_addrs).await?;

        let host = Host::for_node(&topology.head, local_addrs);
        let status = self
            .exec
            .run_inherited(&host, &docker::exec_user(&plan.container, command, interactive))
            .await?;
        Ok((session, status))
    }

    /// Attach to the head container's log stream; blocks until the
    /// stream ends or the process is interrupted.
    pub async fn attach_logs(
        &self,
        container: &str,
        topology: &Topology,
        local_addrs: &[String],
    ) -> ClusterResult<i32> {
        let host = Host::for_node(&topology.head, local_addrs);
        Ok(self
            .exec
            .run_inherited(&host, &docker::follow_logs(container))
            .await?)
    }

    fn spec_for(&self, plan: &LaunchPlan, role: NodeRole, wait_for_mods: bool) -> ContainerSpec {
        ContainerSpec {
            image: plan.image.clone(),
            name: plan.container.clone(),
            env: plan.env.clone(),
            limits: plan.limits.clone(),
            nccl_debug: plan.nccl_debug.clone(),
            eth_if: plan.eth_if.clone(),
            ib_if: plan.ib_if.clone(),
            launch_script: if role == NodeRole::Worker {
                None
            } else {
                plan.launch_script.clone()
            },
            wait_for_mods,
        }
    }

    async fn launch_peers(
        &self,
        plan: &LaunchPlan,
        topology: &Topology,
        local_addrs: &[String],
        wait_for_mods: bool,
        started: &mut Vec<(String, Host)>,
    ) -> ClusterResult<()> {
        if topology.peers.is_empty() {
            return Ok(());
        }

        let spec = self.spec_for(plan, NodeRole::Worker, wait_for_mods);
        let cmd = docker::run_container(&spec, NodeRole::Worker, &topology.head);

        if plan.parallel_fanout {
            // Fan out one task per peer; the whole fan-out fails if any
            // task fails, and nothing proceeds until all have reported.
            let mut set: JoinSet<(String, Host, ClusterResult<CommandOutput>)> = JoinSet::new();
            for peer in &topology.peers {
                let exec = Arc::clone(&self.exec);
                let host = Host::for_node(peer, local_addrs);
                let node = peer.clone();
                let cmd = cmd.clone();
                set.spawn(async move {
                    let result = exec.run(&host, &cmd).await.map_err(ClusterError::from);
                    (node, host, result)
                });
            }

            let mut first_failure: Option<ClusterError> = None;
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((node, host, Ok(out))) if out.success() => {
                        info!(%node, "peer container started");
                        started.push((node, host));
                    }
                    Ok((node, host, Ok(out))) => {
                        started.push((node.clone(), host));
                        first_failure.get_or_insert(ClusterError::ContainerStartFailed {
                            node,
                            detail: out.stderr.trim().to_string(),
                        });
                    }
                    Ok((node, host, Err(e))) => {
                        started.push((node, host));
                        first_failure.get_or_insert(e);
                    }
                    Err(join_err) => {
                        first_failure.get_or_insert(ClusterError::ContainerStartFailed {
                            node: "unknown".to_string(),
                            detail: join_err.to_string(),
                        });
                    }
                }
            }
            if let Some(e) = first_failure {
                return Err(e);
            }
        } else {
            for peer in &topology.peers {
                let host = Host::for_node(peer, local_addrs);
                let result = self.launch_node(&host, peer, &cmd).await;
                started.push((peer.clone(), host));
                result?;
                info!(%peer, "peer container started");
            }
        }

        Ok(())
    }

    async fn launch_node(&self, host: &Host, node: &str, cmd: &str) -> ClusterResult<()> {
        debug!(%node, "starting container");
        let out = self.exec.run(host, cmd).await?;
        if !out.success() {
            return Err(ClusterError::ContainerStartFailed {
                node: node.to_string(),
                detail: out.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn node_running(&self, host: &Host, container: &str) -> ClusterResult<bool> {
        let out = self
            .exec
            .run(host, &docker::container_running(container))
            .await?;
        Ok(!out.stdout.trim().is_empty())
    }

    /// Compensating stop of everything this attempt started, in reverse
    /// launch order. Best-effort: the launch already failed, this only
    /// limits the damage.
    async fn rollback(&self, container: &str, started: &[(String, Host)]) {
        if started.is_empty() {
            return;
        }
        warn!(
            nodes = started.len(),
            "launch failed; rolling back started containers"
        );
        for (node, host) in started.iter().rev() {
            match self.exec.run(host, &docker::remove_container(container)).await {
                Ok(out) if out.success() => info!(%node, "rolled back"),
                Ok(out) => warn!(%node, stderr = %out.stderr.trim(), "rollback failed"),
                Err(e) => warn!(%node, error = %e, "rollback unreachable"),
            }
        }
    }
}
