//! End-to-end recipe → mode → parameters → render scenarios.
//!
//! One recipe, both execution modes, exercised through the same public
//! API the CLI uses.

use rayup_core::{EnvFile, ExecMode, NodeSet};
use rayup_recipe::{Overrides, ParamTable, Recipe, RecipeStore, render, resolve_mode};

const RECIPE: &str = r#"
schema_version = "1"
name = "glm-e2e"
container = "vllm-node"
command = "vllm serve model -tp {tensor_parallel} --port {port} --distributed-executor-backend ray"

[defaults]
port = 8000
tensor_parallel = 2
"#;

fn recipe() -> Recipe {
    Recipe::from_toml_str(RECIPE, "e2e").unwrap()
}

fn empty_env() -> EnvFile {
    EnvFile::load("/nonexistent/.env").unwrap()
}

fn render_in(mode: &ExecMode, passthrough: &[&str]) -> rayup_recipe::LaunchScript {
    let r = recipe();
    let overrides = Overrides::default();
    let params = ParamTable::layered(&r, &overrides, mode);
    let passthrough: Vec<String> = passthrough.iter().map(|s| s.to_string()).collect();
    render(&r, &params, &overrides, &passthrough, mode).unwrap()
}

#[test]
fn solo_run_pins_tp_and_drops_distributed_backend() {
    let r = recipe();
    let resolved = resolve_mode(true, None, &r, &empty_env()).unwrap();
    assert!(resolved.mode.is_solo());

    let out = render_in(&resolved.mode, &[]);
    assert!(out.command.contains("-tp 1"));
    assert!(out.command.contains("--port 8000"));
    assert!(!out.command.contains("--distributed-executor-backend"));
}

#[test]
fn two_node_run_preserves_tp_and_backend() {
    let r = recipe();
    let resolved =
        resolve_mode(false, Some("192.168.1.10,192.168.1.11"), &r, &empty_env()).unwrap();
    assert_eq!(
        resolved.mode.nodes().unwrap().addresses(),
        ["192.168.1.10", "192.168.1.11"]
    );

    let out = render_in(&resolved.mode, &[]);
    assert!(out.command.contains("-tp 2"));
    assert!(out.command.contains("--distributed-executor-backend ray"));
}

#[test]
fn persisted_nodes_feed_the_resolver() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join(".env");

    // What `rayup discover` would persist.
    let mut env = EnvFile::load(&env_path).unwrap();
    env.set("CLUSTER_NODES", "10.0.0.1,10.0.0.2");
    env.set("LOCAL_IP", "10.0.0.1");
    env.save().unwrap();

    let env = EnvFile::load(&env_path).unwrap();
    let resolved = resolve_mode(false, None, &recipe(), &env).unwrap();
    assert!(resolved.nodes_from_env);
    assert_eq!(resolved.mode.nodes().unwrap().len(), 2);
}

#[test]
fn passthrough_survives_both_modes_in_order() {
    let cluster = ExecMode::Cluster(NodeSet::parse("10.0.0.1,10.0.0.2").unwrap());
    for mode in [ExecMode::Solo, cluster] {
        let out = render_in(&mode, &["--served-model-name", "api", "--enforce-eager"]);
        assert!(
            out.command
                .ends_with("--served-model-name api --enforce-eager"),
            "unexpected tail in {} mode: {}",
            mode,
            out.command
        );
    }
}

#[test]
fn duplicate_overrides_warn_across_the_pipeline() {
    let r = recipe();
    let overrides = Overrides {
        port: Some(9000),
        tensor_parallel: Some(4),
        gpu_memory_utilization: Some(0.9),
        ..Default::default()
    };
    let mode = ExecMode::Cluster(NodeSet::parse("10.0.0.1,10.0.0.2").unwrap());
    let params = ParamTable::layered(&r, &overrides, &mode);
    let passthrough = vec![
        "--port=8080".to_string(),
        "--tensor-parallel-size".to_string(),
        "8".to_string(),
        "--gpu-memory-utilization=0.5".to_string(),
    ];

    let out = render(&r, &params, &overrides, &passthrough, &mode).unwrap();
    assert_eq!(out.warnings.len(), 3);
}

#[test]
fn store_round_trip_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("glm-e2e.toml"), RECIPE).unwrap();

    let store = RecipeStore::new(dir.path());
    let recipe = store.load("glm-e2e").unwrap();
    assert_eq!(
        recipe.defaults.get("port").and_then(|v| v.as_integer()),
        Some(8000)
    );

    let listed = store.list();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].recipe.is_ok());
}
