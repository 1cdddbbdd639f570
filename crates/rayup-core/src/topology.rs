//! Node set and head/peer role resolution.
//!
//! A [`NodeSet`] is an ordered list of unique node addresses. Roles are
//! derived by matching the launcher machine's own interface addresses
//! against the set: the first member bound locally is the head, everything
//! else is a peer. Explicit `-n` lists use legacy addressing where the
//! first entry is the head regardless of where the launcher runs.

use thiserror::Error;
use tracing::warn;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised while resolving cluster topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("node set is empty")]
    EmptyNodeSet,

    #[error(
        "none of this machine's addresses ({local}) appear in the node set ({nodes}); \
         the launcher must run on a listed node"
    )]
    LocalNodeNotInSet { local: String, nodes: String },
}

/// An ordered set of unique node addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSet {
    nodes: Vec<String>,
}

impl NodeSet {
    /// Build a node set from a list of addresses.
    ///
    /// Order is preserved; duplicate addresses are dropped with a warning.
    pub fn new(addresses: impl IntoIterator<Item = String>) -> TopologyResult<Self> {
        let mut nodes: Vec<String> = Vec::new();
        for addr in addresses {
            let addr = addr.trim().to_string();
            if addr.is_empty() {
                continue;
            }
            if nodes.contains(&addr) {
                warn!(%addr, "duplicate node address ignored");
                continue;
            }
            nodes.push(addr);
        }
        if nodes.is_empty() {
            return Err(TopologyError::EmptyNodeSet);
        }
        Ok(Self { nodes })
    }

    /// Parse a comma-separated node list like `10.0.0.1,10.0.0.2`.
    pub fn parse(spec: &str) -> TopologyResult<Self> {
        Self::new(spec.split(',').map(str::to_string))
    }

    /// All addresses in declaration order.
    pub fn addresses(&self) -> &[String] {
        &self.nodes
    }

    /// First address in the set (the head under legacy addressing).
    pub fn first(&self) -> &str {
        &self.nodes[0]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the set holds a single node.
    pub fn is_single(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.nodes.iter().any(|n| n == addr)
    }

    /// Render as a comma-separated list (env file / CLI form).
    pub fn to_spec(&self) -> String {
        self.nodes.join(",")
    }
}

/// Resolved cluster roles for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// The coordinator (head) node address.
    pub head: String,
    /// Remaining nodes, in node-set order.
    pub peers: Vec<String>,
    /// Whether the launcher machine is the head.
    pub is_head: bool,
}

impl Topology {
    /// Resolve roles by matching local addresses against the node set.
    ///
    /// The first set member that is bound on this machine becomes the
    /// head; all remaining members are peers regardless of position.
    /// Fails with [`TopologyError::LocalNodeNotInSet`] when the launcher
    /// is not running on any listed node.
    pub fn resolve(nodes: &NodeSet, local_addrs: &[String]) -> TopologyResult<Self> {
        let head = nodes
            .addresses()
            .iter()
            .find(|n| local_addrs.iter().any(|l| l == *n))
            .cloned()
            .ok_or_else(|| TopologyError::LocalNodeNotInSet {
                local: local_addrs.join(", "),
                nodes: nodes.to_spec(),
            })?;

        let peers = nodes
            .addresses()
            .iter()
            .filter(|n| **n != head)
            .cloned()
            .collect();

        Ok(Self {
            head,
            peers,
            is_head: true,
        })
    }

    /// Legacy addressing: the first entry is the head unconditionally.
    ///
    /// Used for explicit `-n` lists, where callers expect head-first
    /// ordering. `is_head` reflects whether this machine is that node.
    pub fn legacy(nodes: &NodeSet, local_addrs: &[String]) -> Self {
        let head = nodes.first().to_string();
        let peers = nodes.addresses()[1..].to_vec();
        let is_head = local_addrs.iter().any(|l| *l == head);
        Self {
            head,
            peers,
            is_head,
        }
    }

    /// Every node, head first.
    pub fn all_nodes(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.head).chain(self.peers.iter())
    }

    pub fn node_count(&self) -> usize {
        1 + self.peers.len()
    }
}
