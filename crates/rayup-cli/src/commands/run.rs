//! `rayup run` — the recipe runner pipeline.
//!
//! Load recipe → resolve mode → layer parameters → render the launch
//! script → optional build/download phases → start the session. All
//! configuration errors surface before any side effect.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use rayup_cluster::{LaunchPlan, ModBundle, Orchestrator, ResourceLimits};
use rayup_core::EnvFile;
use rayup_core::envfile::{KEY_ETH_IF, KEY_IB_IF};
use rayup_exec::{Host, ImageBuilder, ModelFetcher, ShellExecutor, image, model};
use rayup_recipe::{Overrides, ParamTable, RecipeStore, render, resolve_mode};
use tracing::info;

use super::{Context, cluster, topology_for};

#[derive(Args)]
pub struct RunArgs {
    /// Recipe name or path (bare names resolve in the recipes directory).
    pub recipe: String,

    /// Run on this machine only, without the distributed backend.
    #[arg(long)]
    pub solo: bool,

    /// Comma-separated node list; the first entry is the head.
    #[arg(short = 'n', long)]
    pub nodes: Option<String>,

    // ── Recipe overrides ─────────────────────────────────────────
    /// Override the API server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the API server bind address.
    #[arg(long)]
    pub host: Option<String>,

    /// Override tensor parallelism.
    #[arg(long = "tensor-parallel", visible_alias = "tp")]
    pub tensor_parallel: Option<u32>,

    /// Override the GPU memory fraction.
    #[arg(long = "gpu-memory-utilization", visible_alias = "gpu-mem")]
    pub gpu_memory_utilization: Option<f64>,

    /// Override the maximum sequence length.
    #[arg(long = "max-model-len")]
    pub max_model_len: Option<u64>,

    // ── Setup phases ─────────────────────────────────────────────
    /// Full setup: build the image and download the model if missing.
    #[arg(long)]
    pub setup: bool,

    /// Only build/copy the container image, don't run.
    #[arg(long)]
    pub build_only: bool,

    /// Only download/copy the model, don't run.
    #[arg(long)]
    pub download_only: bool,

    /// Rebuild even if the image exists.
    #[arg(long)]
    pub force_build: bool,

    /// Re-download even if the model is cached.
    #[arg(long)]
    pub force_download: bool,

    // ── Launch options ───────────────────────────────────────────
    /// Show the resolved plan and rendered script without executing.
    #[arg(long)]
    pub dry_run: bool,

    /// Don't attach to container logs after starting.
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Override the container image from the recipe.
    #[arg(short = 't', long = "container")]
    pub container_override: Option<String>,

    /// Container name for the session.
    #[arg(long, default_value = "rayup")]
    pub name: String,

    /// NCCL debug level.
    #[arg(long, value_parser = ["VERSION", "WARN", "INFO", "TRACE"])]
    pub nccl_debug: Option<String>,

    /// External build command.
    #[arg(long, default_value = "./build-and-copy.sh")]
    pub build_command: PathBuf,

    /// External model download command.
    #[arg(long, default_value = "./hf-download.sh")]
    pub download_command: PathBuf,

    /// Extra engine arguments, appended verbatim (after `--`).
    #[arg(last = true)]
    pub passthrough: Vec<String>,
}

pub async fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let store = RecipeStore::new(&ctx.recipes_dir);
    let recipe = store.load(&args.recipe)?;

    println!("Recipe: {}", recipe.name);
    if let Some(desc) = &recipe.description {
        println!("  {desc}");
    }
    println!();

    let env_file = EnvFile::load(&ctx.env_file)?;
    let resolved = resolve_mode(args.solo, args.nodes.as_deref(), &recipe, &env_file)?;
    let mode = resolved.mode;

    let image_tag = args
        .container_override
        .clone()
        .unwrap_or_else(|| recipe.container.clone());

    let exec = Arc::new(ShellExecutor::new());
    let (topology, local_addrs) = topology_for(exec.as_ref(), &mode, args.nodes.is_some()).await?;
    let workers = topology.peers.clone();

    // Configuration work first — parameters, rendering, mod validation
    // all fail before anything touches a node.
    let overrides = Overrides {
        port: args.port,
        host: args.host.clone(),
        tensor_parallel: args.tensor_parallel,
        gpu_memory_utilization: args.gpu_memory_utilization,
        max_model_len: args.max_model_len,
    };
    let params = ParamTable::layered(&recipe, &overrides, &mode);
    let launch = render(&recipe, &params, &overrides, &args.passthrough, &mode)?;

    let mods = recipe
        .mods
        .iter()
        .map(ModBundle::load)
        .collect::<Result<Vec<_>, _>>()?;

    if args.dry_run {
        print_dry_run(&args, &recipe, &image_tag, &mode.to_string(), &topology, &launch.script, &mods);
        return Ok(());
    }

    // ── Build phase ──────────────────────────────────────────────
    if args.build_only || args.setup || args.force_build {
        let builder = ImageBuilder::new(&args.build_command);
        let exists = image::image_exists(exec.as_ref(), &Host::Local, &image_tag).await?;

        if args.force_build || !exists {
            builder
                .build(exec.as_ref(), &image_tag, &recipe.build_args, &workers)
                .await?;
        } else {
            println!("Container image '{image_tag}' already exists locally.");
            let mut missing = Vec::new();
            for worker in &workers {
                if !image::image_exists(exec.as_ref(), &Host::Ssh(worker.clone()), &image_tag)
                    .await?
                {
                    missing.push(worker.clone());
                }
            }
            if !missing.is_empty() {
                println!("Image missing on workers: {}", missing.join(", "));
                builder
                    .build(exec.as_ref(), &image_tag, &recipe.build_args, &missing)
                    .await?;
            }
        }

        if args.build_only {
            println!("Build complete.");
            return Ok(());
        }
    }

    // ── Download phase ───────────────────────────────────────────
    if let Some(model_id) = &recipe.model {
        if args.download_only || args.setup || args.force_download {
            if args.force_download || !model::model_in_cache(model_id) {
                ModelFetcher::new(&args.download_command)
                    .fetch(exec.as_ref(), model_id, &workers)
                    .await?;
            } else {
                println!("Model '{model_id}' already exists in cache.");
            }
        }
    }
    if args.download_only {
        println!("Download complete.");
        return Ok(());
    }

    // ── Run phase ────────────────────────────────────────────────
    if !args.setup && !image::image_exists(exec.as_ref(), &Host::Local, &image_tag).await? {
        bail!(
            "container image '{image_tag}' not found locally; \
             run with --setup, or build it with: {} -t {image_tag}",
            args.build_command.display()
        );
    }

    // The generated script lives in a temp file for the lifetime of the
    // session; the container mounts it read-only.
    let mut script_file = tempfile::NamedTempFile::new()
        .context("failed to create temporary launch script")?;
    script_file.write_all(launch.script.as_bytes())?;
    script_file.flush()?;

    let plan = LaunchPlan {
        image: image_tag.clone(),
        container: args.name.clone(),
        launch_script: Some(script_file.path().display().to_string()),
        mods,
        env: Vec::new(),
        limits: ResourceLimits::default(),
        nccl_debug: args.nccl_debug.clone(),
        eth_if: env_file.get(KEY_ETH_IF).map(str::to_string),
        ib_if: env_file.get(KEY_IB_IF).map(str::to_string),
        parallel_fanout: false,
        state_dir: ctx.state_dir.clone(),
    };

    println!("=== Launching ===");
    println!("Container: {image_tag}");
    if !recipe.mods.is_empty() {
        println!("Mods: {}", recipe.mods.join(", "));
    }
    match &mode {
        rayup_core::ExecMode::Solo => println!("Mode: Solo"),
        rayup_core::ExecMode::Cluster(nodes) => println!("Cluster: {} nodes", nodes.len()),
    }
    println!();

    let orch = Orchestrator::new(Arc::clone(&exec));
    let session = orch.start(&plan, &topology, &local_addrs).await?;
    info!(container = %plan.container, "session started");

    cluster::attach_or_daemonize(&orch, &plan, &topology, &local_addrs, session, args.daemon)
        .await
}

fn print_dry_run(
    args: &RunArgs,
    recipe: &rayup_recipe::Recipe,
    image_tag: &str,
    mode: &str,
    topology: &rayup_core::Topology,
    script: &str,
    mods: &[ModBundle],
) {
    println!("=== Dry Run ===");
    println!("Recipe: {}", recipe.name);
    println!("Container image: {image_tag}");
    if !recipe.build_args.is_empty() {
        println!("Build args: {}", recipe.build_args.join(" "));
    }
    if let Some(model_id) = recipe.model.as_deref() {
        println!("Model: {model_id}");
        if args.setup || args.download_only || args.force_download {
            let cached = model::model_in_cache(model_id);
            println!(
                "  Would {}",
                if cached && !args.force_download { "skip download (cached)" } else { "download" }
            );
        }
    }
    println!("Mode: {mode}");
    println!("  Head: {}", topology.head);
    if !topology.peers.is_empty() {
        println!("  Workers: {}", topology.peers.join(", "));
    }
    if args.setup || args.build_only || args.force_build {
        println!("Would build image if missing{}", if args.force_build { " (forced)" } else { "" });
    }
    if !mods.is_empty() {
        let names: Vec<&str> = mods.iter().map(|m| m.name.as_str()).collect();
        println!("Mods: {}", names.join(", "));
    }
    println!();
    println!("=== Generated launch script ===");
    println!("{script}");
    println!("=== What would run ===");
    println!(
        "container '{}' on every node, script mounted at /rayup/launch.sh{}",
        args.name,
        if args.daemon { ", daemon mode" } else { "" }
    );
}
