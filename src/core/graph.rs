//! Node identity and the adjacency structure the resolver sorts.

use crate::core::resource::{Kind, Ref};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// The textual composite identifier `"<Kind>/<Name>"` for a resolved resource
/// (spec.md §4.1). Two resources of different kinds but the same name are
/// distinct nodes; two resources of the same kind and name are the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(kind: Kind, name: impl AsRef<str>) -> Self {
        Self(format!("{}/{}", kind, name.as_ref()))
    }

    pub fn from_ref(r: &Ref) -> Self {
        Self::new(r.kind, &r.name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id back into its kind and name, as recorded at construction.
    /// Returns `None` only for a malformed id, which never happens for ids
    /// produced by `new`/`from_ref`.
    pub fn kind_name(&self) -> Option<(Kind, &str)> {
        let (kind_str, name) = self.0.split_once('/')?;
        let kind = match kind_str {
            "Runtime" => Kind::Runtime,
            "Installer" => Kind::Installer,
            "InstallerRepository" => Kind::InstallerRepository,
            "Tool" => Kind::Tool,
            "ToolSet" => Kind::ToolSet,
            _ => return None,
        };
        Some((kind, name))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One layer of the layered topological order: a set of nodes with no
/// remaining dependency on each other, sorted by `(kind_priority, name)`.
pub type Layer = Vec<NodeId>;

/// The node sequence of a detected cycle, in traversal order with the
/// repeated node appended at both ends (spec.md §4.1). A dedicated type so
/// `CoreError::Cycle` can interpolate it directly via `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePath(pub Vec<NodeId>);

impl fmt::Display for CyclePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(NodeId::as_str).collect::<Vec<_>>().join(" -> ");
        write!(f, "{joined}")
    }
}

/// A directed graph over `NodeId`s. `edges[a]` holds the nodes `a` depends on
/// (must run before `a`), matching the direction resources declare their
/// `Ref`s in.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashSet<NodeId>,
    edges: HashMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.edges.entry(id.clone()).or_default();
        self.nodes.insert(id);
    }

    /// Records that `from` depends on `to` (`to` must be scheduled first).
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.add_node(from.clone());
        self.add_node(to.clone());
        let deps = self.edges.entry(from).or_default();
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|v| v.len()).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// The nodes `id` depends on, i.e. the set that must be scheduled first.
    pub fn dependencies_of(&self, id: &NodeId) -> &[NodeId] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains(id)
    }
}
