//! Launch lifecycle integration tests.
//!
//! Full start/stop scenarios against a scripted executor — no real
//! docker or SSH. Covers idempotent reuse, the mod barrier sequencing
//! across a cluster, and transactional rollback.

use std::sync::Arc;
use std::time::Duration;

use rayup_cluster::{LaunchPlan, ModBundle, Orchestrator, ReadinessProbe, ResourceLimits};
use rayup_core::{NodeSet, Topology};
use rayup_exec::ScriptedExecutor;

fn fast_probe() -> ReadinessProbe {
    ReadinessProbe::new()
        .with_max_attempts(3)
        .with_interval(Duration::from_millis(1))
        .with_join_grace(Duration::ZERO)
}

fn plan(state_dir: &std::path::Path, mods: Vec<ModBundle>) -> LaunchPlan {
    LaunchPlan {
        image: "vllm-node".to_string(),
        container: "rayup".to_string(),
        launch_script: Some("/tmp/launch.sh".to_string()),
        mods,
        env: vec![("HF_TOKEN".to_string(), "x".to_string())],
        limits: ResourceLimits::default(),
        nccl_debug: None,
        eth_if: Some("eth0".to_string()),
        ib_if: None,
        parallel_fanout: false,
        state_dir: state_dir.to_path_buf(),
    }
}

fn three_node_topology() -> (Topology, Vec<String>) {
    let set = NodeSet::parse("10.0.0.1,10.0.0.2,10.0.0.3").unwrap();
    let local = vec!["10.0.0.1".to_string()];
    (Topology::resolve(&set, &local).unwrap(), local)
}

fn mod_bundle(dir: &std::path::Path, name: &str) -> ModBundle {
    let path = dir.join(name);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("apply.sh"), "#!/bin/bash\nexit 0\n").unwrap();
    ModBundle::load(path).unwrap()
}

#[tokio::test]
async fn full_cluster_launch_with_mods_sequences_correctly() {
    let state = tempfile::tempdir().unwrap();
    let mods_dir = tempfile::tempdir().unwrap();
    let bundle = mod_bundle(mods_dir.path(), "fix-glm");

    let exec = Arc::new(ScriptedExecutor::new());
    let (topo, local) = three_node_topology();

    let session = Orchestrator::new(Arc::clone(&exec))
        .with_probe(fast_probe())
        .start(&plan(state.path(), vec![bundle]), &topo, &local)
        .await
        .unwrap();
    assert!(!session.preexisting);
    assert!(session.teardown_on_exit());

    let log = exec.run_log();

    // Containers first: head, then peers in set order.
    let runs: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, l)| l.contains("docker run"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(runs.len(), 3);
    assert!(log[runs[0]].starts_with("local:"));
    assert!(log[runs[1]].starts_with("10.0.0.2:"));
    assert!(log[runs[2]].starts_with("10.0.0.3:"));

    // Every container start is gated on the barrier marker.
    for i in &runs {
        assert!(log[*i].contains("while [ ! -f /tmp/.rayup-mods-applied ]"));
    }

    // Mods happen after all containers are up, coordinator first, and
    // each node gets its barrier marker.
    let first_apply = log.iter().position(|l| l.contains("apply.sh")).unwrap();
    assert!(first_apply > runs[2]);
    let markers: Vec<&String> = log
        .iter()
        .filter(|l| l.contains("touch /tmp/.rayup-mods-applied"))
        .collect();
    assert_eq!(markers.len(), 3);

    // Readiness polled last.
    let poll = log.iter().position(|l| l.contains("ray status")).unwrap();
    assert!(poll > first_apply);
}

#[tokio::test]
async fn start_is_idempotent_and_stop_honors_preexisting_flag() {
    let state = tempfile::tempdir().unwrap();
    let exec = Arc::new(ScriptedExecutor::new());
    // A session is already live somewhere in the cluster.
    exec.stdout_on("docker ps -q", "f00dfeed\n");

    let (topo, local) = three_node_topology();
    let orch = Orchestrator::new(Arc::clone(&exec)).with_probe(fast_probe());
    let session = orch
        .start(&plan(state.path(), Vec::new()), &topo, &local)
        .await
        .unwrap();

    // No relaunch, state reported as pre-existing.
    assert!(session.preexisting);
    assert!(!exec.run_log().iter().any(|l| l.contains("docker run")));

    // The caller consults the flag captured at start: a pre-existing
    // session is not torn down on exit.
    assert!(!session.teardown_on_exit());

    // An explicit stop is still allowed and reaches every node.
    orch.stop("rayup", &topo, &local).await;
    let stops = exec
        .run_log()
        .iter()
        .filter(|l| l.contains("docker rm -f"))
        .count();
    assert_eq!(stops, 3);
}

#[tokio::test]
async fn mid_launch_failure_leaves_no_node_running() {
    let state = tempfile::tempdir().unwrap();
    let exec = Arc::new(ScriptedExecutor::new());
    // Second peer fails to start; worker startup commands carry --address.
    exec.on_sequence(
        "--address",
        vec![
            rayup_exec::CommandOutput::ok(),
            rayup_exec::CommandOutput {
                status: 125,
                stdout: String::new(),
                stderr: "driver error".to_string(),
            },
        ],
    );

    let (topo, local) = three_node_topology();
    let err = Orchestrator::new(Arc::clone(&exec))
        .with_probe(fast_probe())
        .start(&plan(state.path(), Vec::new()), &topo, &local)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("10.0.0.3"));

    // Compensating stops on every started node, head included.
    let log = exec.run_log();
    for node in ["local:", "10.0.0.2:", "10.0.0.3:"] {
        assert!(
            log.iter()
                .any(|l| l.starts_with(node) && l.contains("docker rm -f")),
            "missing rollback for {node} in {log:?}"
        );
    }
}

#[tokio::test]
async fn lock_released_after_failed_launch_allows_retry() {
    let state = tempfile::tempdir().unwrap();
    let exec = Arc::new(ScriptedExecutor::new());
    exec.fail_on("ray status", 1);

    let (topo, local) = three_node_topology();
    let orch = Orchestrator::new(Arc::clone(&exec)).with_probe(fast_probe());
    let p = plan(state.path(), Vec::new());

    // First attempt times out on readiness and fails.
    assert!(orch.start(&p, &topo, &local).await.is_err());

    // The lock must not leak — a retry gets past acquisition (and fails
    // on readiness again, not on the lock).
    let err = orch.start(&p, &topo, &local).await.unwrap_err();
    assert!(err.to_string().contains("not ready"), "unexpected: {err}");
}
