use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::cluster::{StartArgs, TargetArgs};
use commands::run::RunArgs;

#[derive(Parser)]
#[command(
    name = "rayup",
    about = "rayup — recipe-driven vLLM cluster launcher",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Directory holding recipe definitions.
    #[arg(long, global = true, default_value = "recipes")]
    recipes_dir: PathBuf,

    /// Persisted cluster configuration file.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Directory for session state (starter locks).
    #[arg(long, global = true, default_value = ".")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload from a recipe.
    ///
    /// Loads the recipe, resolves solo vs. cluster mode, renders the
    /// launch command, and starts the container session. Pass extra
    /// engine arguments after `--`.
    Run(RunArgs),
    /// Start the container session across the node set.
    Start(StartArgs),
    /// Stop the session on every node (best-effort).
    Stop(TargetArgs),
    /// Report per-node container state and the runtime's own status.
    Status {
        #[command(flatten)]
        target: TargetArgs,
        /// Emit machine-readable JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Run a command inside the head container, starting the session
    /// first if none exists.
    Exec {
        #[command(flatten)]
        start: StartArgs,
        /// The command to run.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// List available recipes.
    List,
    /// Detect cluster nodes and persist them to the env file.
    Discover {
        /// External discovery command to invoke.
        #[arg(long, default_value = "./autodiscover.sh")]
        discover_command: PathBuf,
    },
    /// Print the persisted cluster configuration.
    ShowEnv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rayup_cli=debug,rayup_cluster=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context {
        recipes_dir: cli.recipes_dir,
        env_file: cli.env_file,
        state_dir: cli.state_dir,
    };

    match cli.command {
        Commands::Run(args) => commands::run::run(&ctx, args).await,
        Commands::Start(args) => commands::cluster::start(&ctx, args).await,
        Commands::Stop(target) => commands::cluster::stop(&ctx, target).await,
        Commands::Status { target, json } => commands::cluster::status(&ctx, target, json).await,
        Commands::Exec { start, command } => {
            commands::cluster::exec(&ctx, start, command).await
        }
        Commands::List => commands::list::list(&ctx),
        Commands::Discover { discover_command } => {
            commands::discover::discover(&ctx, &discover_command).await
        }
        Commands::ShowEnv => commands::discover::show_env(&ctx),
    }
}
