//! Execution mode — solo vs. cluster.
//!
//! The mode is decided once, early in a run, and carried explicitly
//! through every downstream component. Nothing re-infers it from flag
//! co-occurrence later.

use crate::topology::NodeSet;

/// How the workload executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecMode {
    /// Single machine, no distributed runtime backend.
    Solo,
    /// Multi-machine execution over the given node set.
    Cluster(NodeSet),
}

impl ExecMode {
    pub fn is_solo(&self) -> bool {
        matches!(self, ExecMode::Solo)
    }

    /// The node set, when in cluster mode.
    pub fn nodes(&self) -> Option<&NodeSet> {
        match self {
            ExecMode::Solo => None,
            ExecMode::Cluster(nodes) => Some(nodes),
        }
    }
}

impl std::fmt::Display for ExecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecMode::Solo => write!(f, "solo"),
            ExecMode::Cluster(nodes) => write!(f, "cluster ({} nodes)", nodes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_has_no_nodes() {
        assert!(ExecMode::Solo.is_solo());
        assert!(ExecMode::Solo.nodes().is_none());
    }

    #[test]
    fn cluster_exposes_nodes() {
        let set = NodeSet::parse("10.0.0.1,10.0.0.2").unwrap();
        let mode = ExecMode::Cluster(set);
        assert!(!mode.is_solo());
        assert_eq!(mode.nodes().unwrap().len(), 2);
        assert_eq!(mode.to_string(), "cluster (2 nodes)");
    }
}
