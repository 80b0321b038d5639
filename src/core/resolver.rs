//! Accepts resources, builds the dependency graph, detects cycles and
//! produces the layered topological order (spec.md §4.1).

use crate::core::error::{CoreError, CoreResult};
use crate::core::graph::{CyclePath, DependencyGraph, Layer, NodeId};
use crate::core::resource::Resource;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Builds one shared graph across all resource kinds, then resolves it into
/// layers. One `Resolver` is used per `apply` - the executor feeds it every
/// declared resource (after `ToolSet` expansion) regardless of kind.
#[derive(Debug, Default)]
pub struct Resolver {
    graph: DependencyGraph,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            graph: DependencyGraph::new(),
        }
    }

    /// Adds a node for `resource` and, for each of its declared dependencies,
    /// a node plus an edge from the resource to that dependency. Submitting
    /// the same `(kind, name)` again is a no-op for the graph (spec.md §4.1).
    pub fn add_resource(&mut self, resource: &Resource) {
        let id = NodeId::new(resource.kind(), resource.name());
        self.graph.add_node(id.clone());
        for dep in resource.dependencies() {
            let dep_id = NodeId::from_ref(&dep);
            self.graph.add_edge(id.clone(), dep_id);
        }
    }

    /// Same as `add_resource`, but for callers that only have a `NodeId` and
    /// its dependency `NodeId`s in hand rather than a live `Resource` (the
    /// executor building a removal-only graph from persisted state
    /// references, spec.md §4.3 "reverse of install order").
    pub fn add_node_with_dependencies(&mut self, id: NodeId, deps: impl IntoIterator<Item = NodeId>) {
        self.graph.add_node(id.clone());
        for dep in deps {
            self.graph.add_edge(id.clone(), dep);
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn get_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<_> = self.graph.nodes().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn get_edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges = Vec::new();
        for node in self.graph.nodes() {
            for dep in self.graph.dependencies_of(node) {
                edges.push((node.clone(), dep.clone()));
            }
        }
        edges
    }

    /// Runs cycle detection only (three-colour DFS, spec.md §4.1).
    pub fn validate(&self) -> CoreResult<()> {
        let mut colors: HashMap<NodeId, Color> =
            self.graph.nodes().map(|n| (n.clone(), Color::White)).collect();

        // Deterministic iteration order so repeated validate() calls on the
        // same graph report the same cycle path.
        let mut roots = self.get_nodes();
        roots.sort();

        for root in &roots {
            if colors.get(root) == Some(&Color::White) {
                let mut path = Vec::new();
                let mut on_path: HashSet<NodeId> = HashSet::new();
                self.visit(root, &mut colors, &mut path, &mut on_path)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        node: &NodeId,
        colors: &mut HashMap<NodeId, Color>,
        path: &mut Vec<NodeId>,
        on_path: &mut HashSet<NodeId>,
    ) -> CoreResult<()> {
        colors.insert(node.clone(), Color::Grey);
        path.push(node.clone());
        on_path.insert(node.clone());

        for dep in self.graph.dependencies_of(node) {
            match colors.get(dep) {
                Some(Color::Grey) => {
                    let start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<NodeId> = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Err(CoreError::Cycle { path: CyclePath(cycle) });
                }
                Some(Color::Black) => continue,
                _ => self.visit(dep, colors, path, on_path)?,
            }
        }

        path.pop();
        on_path.remove(node);
        colors.insert(node.clone(), Color::Black);
        Ok(())
    }

    /// Validates, then returns the layered topological sort (spec.md §4.1).
    #[instrument(name = "resolver.resolve", skip_all, fields(nodes = self.graph.nodes().count()))]
    pub fn resolve(&self) -> CoreResult<Vec<Layer>> {
        self.validate()?;

        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.graph.nodes() {
            in_degree.entry(node.clone()).or_insert(0);
            for dep in self.graph.dependencies_of(node) {
                *in_degree.entry(node.clone()).or_insert(0) += 1;
                dependents.entry(dep.clone()).or_default().push(node.clone());
            }
        }

        let mut frontier: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(n, _)| n.clone())
            .collect();

        let mut layers = Vec::new();
        while !frontier.is_empty() {
            let mut layer = frontier.clone();
            self.sort_layer(&mut layer);
            layers.push(layer.clone());

            let mut next_frontier = Vec::new();
            for node in &layer {
                if let Some(deps_on_node) = dependents.get(node) {
                    for dependent in deps_on_node {
                        let degree = in_degree.get_mut(dependent).expect("tracked node");
                        *degree -= 1;
                        if *degree == 0 {
                            next_frontier.push(dependent.clone());
                        }
                    }
                }
            }
            frontier = next_frontier;
        }

        Ok(layers)
    }

    /// Sorts a layer by `(kind_priority, name)` (spec.md §4.1).
    fn sort_layer(&self, layer: &mut [NodeId]) {
        layer.sort_by(|a, b| {
            let (kind_a, name_a) = a.kind_name().expect("well-formed node id");
            let (kind_b, name_b) = b.kind_name().expect("well-formed node id");
            kind_a
                .priority()
                .cmp(&kind_b.priority())
                .then_with(|| name_a.cmp(name_b))
        });
    }
}
