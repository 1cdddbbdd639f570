//! Docker command construction.
//!
//! Pure builders — every function returns the shell command string that
//! the [`Executor`](rayup_exec::Executor) runs on the target node. The
//! head container starts the runtime head process and then the launch
//! script; workers join the head and block.

use std::path::Path;

use rayup_exec::executor::sh_quote;

use crate::mods::MOD_BARRIER_MARKER;
use crate::orchestrator::ResourceLimits;

/// Where the generated launch script is mounted inside the container.
pub const LAUNCH_SCRIPT_PATH: &str = "/rayup/launch.sh";
/// Port the runtime head listens on.
pub const RAY_PORT: u16 = 6379;

/// A node's role in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Single machine, no runtime cluster.
    Solo,
    /// Coordinator: runtime head plus the workload.
    Head,
    /// Peer: joins the head and blocks.
    Worker,
}

/// What a `docker run` on one node needs.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    /// Extra environment injected with `-e`.
    pub env: Vec<(String, String)>,
    pub limits: ResourceLimits,
    pub nccl_debug: Option<String>,
    pub eth_if: Option<String>,
    pub ib_if: Option<String>,
    /// Host path of the generated launch script (head and solo only).
    pub launch_script: Option<String>,
    /// Block the workload until the mod barrier marker appears.
    pub wait_for_mods: bool,
}

/// The command executed as the container's PID 1.
///
/// When mods are requested, the workload is gated behind the barrier
/// marker: the container is up immediately, but nothing serves until
/// every mod on this node has been applied and signalled. Without a
/// launch script the head just keeps the runtime alive.
pub fn startup_command(role: NodeRole, head_addr: &str, wait_for_mods: bool, has_script: bool) -> String {
    let mut parts: Vec<String> = Vec::new();
    if wait_for_mods {
        parts.push(format!(
            "while [ ! -f {MOD_BARRIER_MARKER} ]; do sleep 1; done"
        ));
    }
    let workload = if has_script {
        format!("exec bash {LAUNCH_SCRIPT_PATH}")
    } else {
        "exec tail -f /dev/null".to_string()
    };
    match role {
        NodeRole::Solo => parts.push(workload),
        NodeRole::Head => {
            parts.push(format!(
                "ray start --head --node-ip-address {head_addr} --port {RAY_PORT}"
            ));
            parts.push(workload);
        }
        NodeRole::Worker => {
            parts.push(format!("exec ray start --address {head_addr}:{RAY_PORT} --block"));
        }
    }
    parts.join(" && ")
}

/// Build the `docker run` command for one node.
pub fn run_container(spec: &ContainerSpec, role: NodeRole, head_addr: &str) -> String {
    let mut cmd = format!(
        "docker run -d --name {} --gpus all --network host --ipc host",
        sh_quote(&spec.name)
    );

    if let Some(memory) = &spec.limits.memory {
        cmd.push_str(&format!(" --memory {}", sh_quote(memory)));
    }
    if let Some(swap) = &spec.limits.memory_swap {
        cmd.push_str(&format!(" --memory-swap {}", sh_quote(swap)));
    }
    if let Some(pids) = spec.limits.pids_limit {
        cmd.push_str(&format!(" --pids-limit {pids}"));
    }
    if let Some(shm) = &spec.limits.shm_size {
        cmd.push_str(&format!(" --shm-size {}", sh_quote(shm)));
    }

    for (key, value) in &spec.env {
        cmd.push_str(&format!(" -e {}", sh_quote(&format!("{key}={value}"))));
    }
    if let Some(level) = &spec.nccl_debug {
        cmd.push_str(&format!(" -e {}", sh_quote(&format!("NCCL_DEBUG={level}"))));
    }
    if let Some(eth) = &spec.eth_if {
        cmd.push_str(&format!(
            " -e {} -e {}",
            sh_quote(&format!("NCCL_SOCKET_IFNAME={eth}")),
            sh_quote(&format!("GLOO_SOCKET_IFNAME={eth}"))
        ));
    }
    if let Some(ib) = &spec.ib_if {
        cmd.push_str(&format!(" -e {}", sh_quote(&format!("NCCL_IB_HCA={ib}"))));
    }

    if role != NodeRole::Worker {
        if let Some(script) = &spec.launch_script {
            cmd.push_str(&format!(
                " -v {}:{LAUNCH_SCRIPT_PATH}:ro",
                sh_quote(script)
            ));
        }
    }

    let has_script = role != NodeRole::Worker && spec.launch_script.is_some();
    cmd.push_str(&format!(
        " {} bash -c {}",
        sh_quote(&spec.image),
        sh_quote(&startup_command(role, head_addr, spec.wait_for_mods, has_script))
    ));
    cmd
}

/// Whether the named container is running (non-empty stdout means yes).
pub fn container_running(name: &str) -> String {
    format!("docker ps -q --filter name=^{name}$")
}

/// Best-effort stop and removal of the named container.
pub fn remove_container(name: &str) -> String {
    format!("docker rm -f {}", sh_quote(name))
}

/// Run a command inside the container.
pub fn exec_in(name: &str, command: &str) -> String {
    format!("docker exec {} bash -c {}", sh_quote(name), sh_quote(command))
}

/// Run a command inside the container with a working directory.
pub fn exec_in_at(name: &str, workdir: &str, command: &str) -> String {
    format!(
        "docker exec -w {} {} bash -c {}",
        sh_quote(workdir),
        sh_quote(name),
        sh_quote(command)
    )
}

/// Interactive or plain exec for user-supplied commands.
pub fn exec_user(name: &str, command: &str, interactive: bool) -> String {
    let flags = if interactive { "-it" } else { "-i" };
    format!("docker exec {flags} {} bash -c {}", sh_quote(name), sh_quote(command))
}

/// Copy a host path into the container.
pub fn cp_into(name: &str, src: &Path, dst: &str) -> String {
    format!(
        "docker cp {} {}",
        sh_quote(&src.display().to_string()),
        sh_quote(&format!("{name}:{dst}"))
    )
}

/// Follow the container's log stream.
pub fn follow_logs(name: &str) -> String {
    format!("docker logs -f {}", sh_quote(name))
}

/// The runtime's own status command, inside the container.
pub fn runtime_status(name: &str) -> String {
    exec_in(name, "ray status")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            image: "vllm-node".to_string(),
            name: "rayup".to_string(),
            env: vec![],
            limits: ResourceLimits::default(),
            nccl_debug: None,
            eth_if: None,
            ib_if: None,
            launch_script: Some("/tmp/launch.sh".to_string()),
            wait_for_mods: false,
        }
    }

    #[test]
    fn solo_startup_runs_launch_script_directly() {
        let cmd = startup_command(NodeRole::Solo, "10.0.0.1", false, true);
        assert_eq!(cmd, "exec bash /rayup/launch.sh");
    }

    #[test]
    fn head_startup_starts_ray_then_workload() {
        let cmd = startup_command(NodeRole::Head, "10.0.0.1", false, true);
        assert!(cmd.starts_with("ray start --head --node-ip-address 10.0.0.1 --port 6379"));
        assert!(cmd.ends_with("exec bash /rayup/launch.sh"));
    }

    #[test]
    fn head_without_script_keeps_the_runtime_alive() {
        let cmd = startup_command(NodeRole::Head, "10.0.0.1", false, false);
        assert!(cmd.ends_with("exec tail -f /dev/null"));
    }

    #[test]
    fn worker_startup_joins_and_blocks() {
        let cmd = startup_command(NodeRole::Worker, "10.0.0.1", false, true);
        assert_eq!(cmd, "exec ray start --address 10.0.0.1:6379 --block");
    }

    #[test]
    fn mods_gate_the_workload_behind_the_barrier() {
        let cmd = startup_command(NodeRole::Head, "10.0.0.1", true, true);
        assert!(cmd.starts_with("while [ ! -f /tmp/.rayup-mods-applied ]"));
        let gate = cmd.find("while").unwrap();
        let ray = cmd.find("ray start").unwrap();
        assert!(gate < ray);
    }

    #[test]
    fn run_container_includes_limits_and_env() {
        let mut s = spec();
        s.env.push(("HF_TOKEN".to_string(), "secret".to_string()));
        s.limits.memory = Some("512g".to_string());
        s.limits.pids_limit = Some(4096);
        s.limits.shm_size = Some("64g".to_string());
        s.nccl_debug = Some("INFO".to_string());
        s.eth_if = Some("eth0".to_string());

        let cmd = run_container(&s, NodeRole::Head, "10.0.0.1");
        assert!(cmd.contains("--memory '512g'"));
        assert!(cmd.contains("--pids-limit 4096"));
        assert!(cmd.contains("--shm-size '64g'"));
        assert!(cmd.contains("-e 'HF_TOKEN=secret'"));
        assert!(cmd.contains("-e 'NCCL_DEBUG=INFO'"));
        assert!(cmd.contains("-e 'NCCL_SOCKET_IFNAME=eth0'"));
        assert!(cmd.contains("-v '/tmp/launch.sh':/rayup/launch.sh:ro"));
        assert!(cmd.contains("--network host"));
    }

    #[test]
    fn worker_container_has_no_script_mount() {
        let cmd = run_container(&spec(), NodeRole::Worker, "10.0.0.1");
        assert!(!cmd.contains("/rayup/launch.sh:ro"));
        assert!(cmd.contains("--address 10.0.0.1:6379"));
    }

    #[test]
    fn exec_builders_quote_the_command() {
        assert_eq!(
            exec_in("rayup", "touch /tmp/x"),
            "docker exec 'rayup' bash -c 'touch /tmp/x'"
        );
        assert_eq!(
            exec_in_at("rayup", "/workspace/mods/fix", "bash apply.sh"),
            "docker exec -w '/workspace/mods/fix' 'rayup' bash -c 'bash apply.sh'"
        );
        assert!(exec_user("rayup", "nvidia-smi", true).contains("-it"));
        assert!(!exec_user("rayup", "nvidia-smi", false).contains("-it"));
    }

    #[test]
    fn status_and_lifecycle_commands() {
        assert_eq!(container_running("rayup"), "docker ps -q --filter name=^rayup$");
        assert_eq!(remove_container("rayup"), "docker rm -f 'rayup'");
        assert_eq!(follow_logs("rayup"), "docker logs -f 'rayup'");
        assert!(runtime_status("rayup").contains("ray status"));
    }
}
