//! Mode resolution — solo or cluster, decided once.
//!
//! Precedence: explicit flags, then the persisted env file, then solo.
//! Recipe-declared mode constraints are enforced after the choice, with
//! remediation in the error text.

use rayup_core::envfile::KEY_CLUSTER_NODES;
use rayup_core::{EnvFile, ExecMode, NodeSet, TopologyError};
use thiserror::Error;
use tracing::info;

use crate::recipe::Recipe;

/// Result type alias for mode resolution.
pub type ModeResult<T> = Result<T, ModeError>;

/// Errors raised while resolving the execution mode.
#[derive(Debug, Error)]
pub enum ModeError {
    #[error("--solo and an explicit node list are mutually exclusive")]
    ConflictingModeFlags,

    #[error(
        "recipe '{recipe}' requires cluster mode; \
         specify nodes with -n node1,node2 or run `rayup discover` first"
    )]
    RequiresClusterMode { recipe: String },

    #[error("recipe '{recipe}' requires solo mode; drop the node list or pass --solo")]
    RequiresSoloMode { recipe: String },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// The resolved mode plus where the node list came from.
#[derive(Debug, Clone)]
pub struct ResolvedMode {
    pub mode: ExecMode,
    /// Node list was read from the persisted env file.
    pub nodes_from_env: bool,
}

/// Resolve solo vs. cluster from flags and persisted config alone.
///
/// Used directly by lifecycle actions that have no recipe in hand.
pub fn resolve_nodes(
    solo_flag: bool,
    nodes_flag: Option<&str>,
    env: &EnvFile,
) -> ModeResult<ResolvedMode> {
    if solo_flag && nodes_flag.is_some() {
        return Err(ModeError::ConflictingModeFlags);
    }

    let mut nodes_from_env = false;
    let mode = if solo_flag {
        ExecMode::Solo
    } else if let Some(spec) = nodes_flag {
        mode_from_nodes(NodeSet::parse(spec)?)
    } else if let Some(spec) = env.get(KEY_CLUSTER_NODES) {
        nodes_from_env = true;
        info!(nodes = %spec, "using cluster nodes from {}", env.path().display());
        mode_from_nodes(NodeSet::parse(spec)?)
    } else {
        ExecMode::Solo
    };

    Ok(ResolvedMode { mode, nodes_from_env })
}

/// Resolve the execution mode from flags, persisted config, and the
/// recipe's constraints.
pub fn resolve_mode(
    solo_flag: bool,
    nodes_flag: Option<&str>,
    recipe: &Recipe,
    env: &EnvFile,
) -> ModeResult<ResolvedMode> {
    let resolved = resolve_nodes(solo_flag, nodes_flag, env)?;
    check_constraints(recipe, &resolved.mode)?;
    Ok(resolved)
}

/// A single-node set is solo execution — implicit fallback, with notice.
fn mode_from_nodes(nodes: NodeSet) -> ExecMode {
    if nodes.is_single() {
        info!(node = %nodes.first(), "single node resolved; running in solo mode");
        ExecMode::Solo
    } else {
        ExecMode::Cluster(nodes)
    }
}

/// Enforce recipe-declared mode constraints against the chosen mode.
pub fn check_constraints(recipe: &Recipe, mode: &ExecMode) -> ModeResult<()> {
    match mode {
        ExecMode::Solo if recipe.cluster_only => Err(ModeError::RequiresClusterMode {
            recipe: recipe.name.clone(),
        }),
        ExecMode::Cluster(_) if recipe.solo_only => Err(ModeError::RequiresSoloMode {
            recipe: recipe.name.clone(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(extra: &str) -> Recipe {
        Recipe::from_toml_str(
            &format!(
                r#"
schema_version = "1"
name = "t"
container = "c"
command = "run"
{extra}
"#
            ),
            "test",
        )
        .unwrap()
    }

    fn empty_env() -> EnvFile {
        EnvFile::load("/nonexistent/.env").unwrap()
    }

    fn env_with_nodes(spec: &str) -> (tempfile::TempDir, EnvFile) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, format!("CLUSTER_NODES={spec}\n")).unwrap();
        let env = EnvFile::load(&path).unwrap();
        (dir, env)
    }

    #[test]
    fn solo_and_nodes_conflict() {
        let err = resolve_mode(true, Some("10.0.0.1,10.0.0.2"), &recipe(""), &empty_env())
            .unwrap_err();
        assert!(matches!(err, ModeError::ConflictingModeFlags));
    }

    #[test]
    fn explicit_nodes_win_over_env() {
        let (_dir, env) = env_with_nodes("10.1.0.1,10.1.0.2");
        let resolved =
            resolve_mode(false, Some("10.0.0.1,10.0.0.2"), &recipe(""), &env).unwrap();
        assert!(!resolved.nodes_from_env);
        assert_eq!(
            resolved.mode.nodes().unwrap().addresses(),
            ["10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn env_nodes_used_when_no_flags() {
        let (_dir, env) = env_with_nodes("10.1.0.1,10.1.0.2");
        let resolved = resolve_mode(false, None, &recipe(""), &env).unwrap();
        assert!(resolved.nodes_from_env);
        assert!(!resolved.mode.is_solo());
    }

    #[test]
    fn nothing_resolves_to_solo() {
        let resolved = resolve_mode(false, None, &recipe(""), &empty_env()).unwrap();
        assert!(resolved.mode.is_solo());
    }

    #[test]
    fn single_node_list_is_solo_fallback() {
        let resolved = resolve_mode(false, Some("10.0.0.1"), &recipe(""), &empty_env()).unwrap();
        assert!(resolved.mode.is_solo());
    }

    #[test]
    fn cluster_only_fails_in_solo_with_remediation() {
        let err = resolve_mode(true, None, &recipe("cluster_only = true"), &empty_env())
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ModeError::RequiresClusterMode { .. }));
        assert!(msg.contains("-n node1,node2"));
        assert!(msg.contains("rayup discover"));
    }

    #[test]
    fn cluster_only_passes_in_cluster() {
        let resolved = resolve_mode(
            false,
            Some("10.0.0.1,10.0.0.2"),
            &recipe("cluster_only = true"),
            &empty_env(),
        )
        .unwrap();
        assert!(!resolved.mode.is_solo());
    }

    #[test]
    fn solo_only_fails_in_cluster() {
        let err = resolve_mode(
            false,
            Some("10.0.0.1,10.0.0.2"),
            &recipe("solo_only = true"),
            &empty_env(),
        )
        .unwrap_err();
        assert!(matches!(err, ModeError::RequiresSoloMode { .. }));
    }

    // A recipe with both constraints cannot load (the store rejects it),
    // but the resolver must still fail a constructed one in either mode.
    fn both_constraints() -> Recipe {
        let mut r = recipe("");
        r.cluster_only = true;
        r.solo_only = true;
        r
    }

    #[test]
    fn both_constraints_fail_solo_mode() {
        let err = check_constraints(&both_constraints(), &ExecMode::Solo).unwrap_err();
        assert!(matches!(err, ModeError::RequiresClusterMode { .. }));
    }

    #[test]
    fn both_constraints_fail_cluster_mode() {
        let nodes = NodeSet::parse("10.0.0.1,10.0.0.2").unwrap();
        let err =
            check_constraints(&both_constraints(), &ExecMode::Cluster(nodes)).unwrap_err();
        assert!(matches!(err, ModeError::RequiresSoloMode { .. }));
    }
}
