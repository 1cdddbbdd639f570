//! Cluster lifecycle subcommands: start, stop, status, exec.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use rayup_cluster::{
    LaunchPlan, ModBundle, Orchestrator, ResourceLimits, Session, SessionState,
};
use rayup_core::{EnvFile, Topology};
use rayup_exec::{Executor, ShellExecutor};
use rayup_recipe::resolve_nodes;
use tracing::{info, warn};

use super::{Context, parse_env_pair, topology_for};

#[derive(Args)]
pub struct StartArgs {
    /// Run on this machine only.
    #[arg(long)]
    pub solo: bool,

    /// Comma-separated node list; the first entry is the head.
    #[arg(short = 'n', long)]
    pub nodes: Option<String>,

    /// Container image to run.
    #[arg(short = 't', long, default_value = "vllm-node")]
    pub image: String,

    /// Container name for the session.
    #[arg(long, default_value = "rayup")]
    pub name: String,

    /// Environment to inject into the containers (repeatable).
    #[arg(short = 'e', long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Mod bundle to apply before the workload starts (repeatable).
    #[arg(long = "apply-mod")]
    pub apply_mod: Vec<PathBuf>,

    /// Launch script to run inside the head container.
    #[arg(long)]
    pub launch_script: Option<PathBuf>,

    /// Don't attach to container logs after starting.
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Container memory limit (e.g. 512g).
    #[arg(long)]
    pub memory: Option<String>,

    /// Container memory+swap limit.
    #[arg(long)]
    pub memory_swap: Option<String>,

    /// Container PID limit.
    #[arg(long)]
    pub pids_limit: Option<u64>,

    /// Shared memory size (e.g. 64g).
    #[arg(long)]
    pub shm_size: Option<String>,

    /// NCCL debug level.
    #[arg(long, value_parser = ["VERSION", "WARN", "INFO", "TRACE"])]
    pub nccl_debug: Option<String>,

    /// Ethernet interface for NCCL/GLOO socket binding.
    #[arg(long)]
    pub eth_if: Option<String>,

    /// InfiniBand HCA name.
    #[arg(long)]
    pub ib_if: Option<String>,

    /// Launch peer containers concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Validate the configuration and print the plan without executing.
    #[arg(long)]
    pub check_config: bool,
}

#[derive(Args)]
pub struct TargetArgs {
    /// Container name of the session.
    #[arg(long, default_value = "rayup")]
    pub name: String,

    /// Comma-separated node list.
    #[arg(short = 'n', long)]
    pub nodes: Option<String>,

    /// This machine only.
    #[arg(long)]
    pub solo: bool,
}

/// Assemble a launch plan from the start flags.
fn plan_from(ctx: &Context, args: &StartArgs) -> Result<LaunchPlan> {
    let mods = args
        .apply_mod
        .iter()
        .map(ModBundle::load)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LaunchPlan {
        image: args.image.clone(),
        container: args.name.clone(),
        launch_script: args.launch_script.as_ref().map(|p| p.display().to_string()),
        mods,
        env: args.env.clone(),
        limits: ResourceLimits {
            memory: args.memory.clone(),
            memory_swap: args.memory_swap.clone(),
            pids_limit: args.pids_limit,
            shm_size: args.shm_size.clone(),
        },
        nccl_debug: args.nccl_debug.clone(),
        eth_if: args.eth_if.clone(),
        ib_if: args.ib_if.clone(),
        parallel_fanout: args.parallel,
        state_dir: ctx.state_dir.clone(),
    })
}

async fn target_topology(
    ctx: &Context,
    solo: bool,
    nodes: Option<&str>,
    exec: &ShellExecutor,
) -> Result<(Topology, Vec<String>)> {
    let env_file = EnvFile::load(&ctx.env_file)?;
    let resolved = resolve_nodes(solo, nodes, &env_file)?;
    topology_for(exec, &resolved.mode, nodes.is_some()).await
}

pub async fn start(ctx: &Context, args: StartArgs) -> Result<()> {
    let exec = Arc::new(ShellExecutor::new());
    let (topology, local_addrs) =
        target_topology(ctx, args.solo, args.nodes.as_deref(), exec.as_ref()).await?;
    let plan = plan_from(ctx, &args)?;

    if args.check_config {
        print_plan(&plan, &topology);
        return Ok(());
    }

    let orch = Orchestrator::new(Arc::clone(&exec));
    let session = orch.start(&plan, &topology, &local_addrs).await?;
    info!(container = %plan.container, "session started");

    attach_or_daemonize(&orch, &plan, &topology, &local_addrs, session, args.daemon).await
}

pub async fn stop(ctx: &Context, target: TargetArgs) -> Result<()> {
    let exec = Arc::new(ShellExecutor::new());
    let (topology, local_addrs) =
        target_topology(ctx, target.solo, target.nodes.as_deref(), exec.as_ref()).await?;

    let orch = Orchestrator::new(exec);
    orch.stop(&target.name, &topology, &local_addrs).await;
    Ok(())
}

pub async fn status(ctx: &Context, target: TargetArgs, json: bool) -> Result<()> {
    let exec = Arc::new(ShellExecutor::new());
    let (topology, local_addrs) =
        target_topology(ctx, target.solo, target.nodes.as_deref(), exec.as_ref()).await?;

    let orch = Orchestrator::new(exec);
    let status = orch.status(&target.name, &topology, &local_addrs).await;

    if json {
        let value = serde_json::json!({
            "container": target.name,
            "nodes": status
                .nodes
                .iter()
                .map(|n| serde_json::json!({ "node": n.node, "running": n.running }))
                .collect::<Vec<_>>(),
            "runtime": status.runtime,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Container '{}':", target.name);
        for node in &status.nodes {
            println!(
                "  {}: {}",
                node.node,
                if node.running { "running" } else { "not running" }
            );
        }
        if let Some(runtime) = &status.runtime {
            println!();
            println!("{}", runtime.trim_end());
        }
    }
    Ok(())
}

pub async fn exec(ctx: &Context, args: StartArgs, command: Vec<String>) -> Result<()> {
    let exec = Arc::new(ShellExecutor::new());
    let (topology, local_addrs) =
        target_topology(ctx, args.solo, args.nodes.as_deref(), exec.as_ref()).await?;
    let plan = plan_from(ctx, &args)?;

    let interactive = std::io::stdin().is_terminal();
    let command = command.join(" ");

    let orch = Orchestrator::new(Arc::clone(&exec));
    let (mut session, status) = orch
        .exec_command(&plan, &topology, &local_addrs, &command, interactive)
        .await?;

    if session.teardown_on_exit() {
        session.mark(SessionState::Stopping);
        orch.stop(&plan.container, &topology, &local_addrs).await;
        session.mark(SessionState::Idle);
    }

    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}

/// After a successful start: return immediately in daemon mode,
/// otherwise attach to the head logs and tear the session down on exit —
/// unless it pre-existed this invocation.
pub async fn attach_or_daemonize<E: Executor>(
    orch: &Orchestrator<E>,
    plan: &LaunchPlan,
    topology: &Topology,
    local_addrs: &[String],
    mut session: Session,
    daemon: bool,
) -> Result<()> {
    if session.preexisting {
        println!("Session already running; reusing it (teardown on exit disabled).");
    }

    if daemon {
        info!(container = %plan.container, "daemon mode; not attaching to logs");
        return Ok(());
    }

    tokio::select! {
        res = orch.attach_logs(&plan.container, topology, local_addrs) => {
            if let Err(e) = res {
                warn!(error = %e, "log attachment ended with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
        }
    }

    if session.teardown_on_exit() {
        info!(container = %plan.container, "tearing down session");
        session.mark(SessionState::Stopping);
        orch.stop(&plan.container, topology, local_addrs).await;
        session.mark(SessionState::Idle);
    } else {
        info!("session was pre-existing; leaving it running");
    }
    Ok(())
}

fn print_plan(plan: &LaunchPlan, topology: &Topology) {
    println!("=== Configuration ===");
    println!("Image: {}", plan.image);
    println!("Container: {}", plan.container);
    println!("Head: {}", topology.head);
    if !topology.peers.is_empty() {
        println!("Workers: {}", topology.peers.join(", "));
    }
    if let Some(script) = &plan.launch_script {
        println!("Launch script: {script}");
    }
    if !plan.mods.is_empty() {
        let names: Vec<&str> = plan.mods.iter().map(|m| m.name.as_str()).collect();
        println!("Mods: {}", names.join(", "));
    }
    if !plan.env.is_empty() {
        println!("Env: {} entries", plan.env.len());
    }
    println!("Parallel fan-out: {}", plan.parallel_fanout);
    println!("Configuration OK.");
}
