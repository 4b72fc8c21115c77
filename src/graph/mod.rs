use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use crate::core::package::{DependencyExpr, PackageRecord};
use crate::core::version::Version;

pub mod builder;
pub mod check;
pub mod ops;
pub mod resolver;
pub mod subgraph;
pub mod viz;

/// Prefix of the synthetic node standing in for a dependency nothing provides.
pub const UNRESOLVED_PREFIX: &str = "unresolved:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeKind {
    Package { version: Version },
    Unresolved { dependency: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl GraphNode {
    pub fn package(record: &PackageRecord) -> Self {
        Self {
            name: record.name.clone(),
            kind: NodeKind::Package {
                version: record.version.clone(),
            },
        }
    }

    pub fn unresolved(dependency: &str) -> Self {
        Self {
            name: unresolved_name(dependency),
            kind: NodeKind::Unresolved {
                dependency: dependency.to_string(),
            },
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.kind, NodeKind::Unresolved { .. })
    }

    pub fn version(&self) -> Option<&Version> {
        match &self.kind {
            NodeKind::Package { version } => Some(version),
            NodeKind::Unresolved { .. } => None,
        }
    }
}

pub fn unresolved_name(dependency: &str) -> String {
    format!("{UNRESOLVED_PREFIX}{dependency}")
}

/// How an edge's target was chosen for its expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    Exact,
    Provides,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub expression: DependencyExpr,
    pub via: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedDependency {
    pub from: String,
    pub expression: DependencyExpr,
}

/// Borrowed view of one edge, for renderers and reports.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'g> {
    pub source: NodeIndex,
    pub target: NodeIndex,
    pub from: &'g GraphNode,
    pub to: &'g GraphNode,
    pub edge: &'g DependencyEdge,
}

/// Package → chosen dependency graph. Built once by [`builder::build_graph`] and
/// read-only afterwards, so queries can share it across threads.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<GraphNode, DependencyEdge>,
    index: HashMap<NodeKey, NodeIndex>,
    unresolved: Vec<UnresolvedDependency>,
}

/// Packages and synthetic nodes live in separate key spaces, so a package
/// literally named `unresolved:x` never absorbs the stand-in for `x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Package(String),
    Unresolved(String),
}

impl NodeKey {
    fn of(node: &GraphNode) -> Self {
        match &node.kind {
            NodeKind::Package { .. } => NodeKey::Package(node.name.clone()),
            NodeKind::Unresolved { dependency } => NodeKey::Unresolved(dependency.clone()),
        }
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or retrieve a node by kind and name.
    pub(crate) fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        let key = NodeKey::of(&node);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.graph.add_node(node);
        self.index.insert(key, idx);
        idx
    }

    /// Adds `from -> to` unless the same pair already exists for the same expression.
    pub(crate) fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: DependencyEdge) -> bool {
        let duplicate = self
            .graph
            .edges_connecting(from, to)
            .any(|existing| existing.weight().expression == edge.expression);
        if duplicate {
            return false;
        }
        self.graph.add_edge(from, to, edge);
        true
    }

    pub(crate) fn record_unresolved(&mut self, unresolved: UnresolvedDependency) {
        self.unresolved.push(unresolved);
    }

    /// Looks a node up by display name. A package wins over a synthetic node
    /// with the same name.
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.find_package(name).or_else(|| {
            name.strip_prefix(UNRESOLVED_PREFIX)
                .and_then(|dependency| self.find_unresolved(dependency))
        })
    }

    pub fn find_package(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(&NodeKey::Package(name.to_string())).copied()
    }

    /// The synthetic node standing in for `dependency`, if one was created.
    pub fn find_unresolved(&self, dependency: &str) -> Option<NodeIndex> {
        self.index
            .get(&NodeKey::Unresolved(dependency.to_string()))
            .copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    pub fn name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx].name
    }

    /// Node indices in insertion order: index order first, then synthetic nodes.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Outgoing edges of `idx` in declaration order.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DependencyEdge)> {
        self.directed(idx, Direction::Outgoing)
    }

    /// Incoming edges of `idx` (who depends on it), ordered by edge creation.
    pub fn dependents_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &DependencyEdge)> {
        self.directed(idx, Direction::Incoming)
    }

    fn directed(&self, idx: NodeIndex, direction: Direction) -> Vec<(NodeIndex, &DependencyEdge)> {
        // petgraph walks adjacency lists newest-first; edge ids restore creation order.
        let mut edges: Vec<(EdgeIndex, NodeIndex, &DependencyEdge)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), other, edge.weight())
            })
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges
            .into_iter()
            .map(|(_, other, weight)| (other, weight))
            .collect()
    }

    /// Every edge in creation order.
    pub fn edges(&self) -> Vec<EdgeView<'_>> {
        self.graph
            .edge_indices()
            .filter_map(|id| {
                let (from, to) = self.graph.edge_endpoints(id)?;
                Some(EdgeView {
                    source: from,
                    target: to,
                    from: &self.graph[from],
                    to: &self.graph[to],
                    edge: &self.graph[id],
                })
            })
            .collect()
    }

    /// Dependencies that no package satisfies, one entry per declaring edge.
    pub fn unresolved(&self) -> &[UnresolvedDependency] {
        &self.unresolved
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// Node/edge iteration shared by the full graph and its subgraphs; everything a
/// layout tool needs without depending on the graph's storage.
pub trait GraphView {
    fn base(&self) -> &DependencyGraph;

    /// Member nodes in a stable order.
    fn node_ids(&self) -> Vec<NodeIndex>;

    fn includes(&self, idx: NodeIndex) -> bool;

    fn nodes(&self) -> Vec<&GraphNode> {
        let base = self.base();
        self.node_ids().into_iter().map(|idx| base.node(idx)).collect()
    }

    /// Distinct successors inside the view, in declaration order.
    fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        distinct_members(
            self,
            self.base()
                .dependencies_of(idx)
                .into_iter()
                .map(|(next, _)| next),
        )
    }

    /// Distinct predecessors inside the view.
    fn predecessors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        distinct_members(
            self,
            self.base()
                .dependents_of(idx)
                .into_iter()
                .map(|(prev, _)| prev),
        )
    }

    /// Edges with both endpoints inside the view, in creation order.
    fn edge_views(&self) -> Vec<EdgeView<'_>> {
        let base = self.base();
        base.edges()
            .into_iter()
            .filter(|view| self.includes(view.source) && self.includes(view.target))
            .collect()
    }
}

fn distinct_members<V: GraphView + ?Sized>(
    view: &V,
    candidates: impl Iterator<Item = NodeIndex>,
) -> Vec<NodeIndex> {
    let mut seen = HashSet::new();
    candidates
        .filter(|idx| view.includes(*idx) && seen.insert(*idx))
        .collect()
}

impl GraphView for DependencyGraph {
    fn base(&self) -> &DependencyGraph {
        self
    }

    fn node_ids(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    fn includes(&self, idx: NodeIndex) -> bool {
        idx.index() < self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::package::{DependencyExpr, PackageRecord};
    use crate::graph::{DependencyEdge, DependencyGraph, GraphNode, GraphView, MatchKind};

    fn edge(name: &str) -> DependencyEdge {
        DependencyEdge {
            expression: DependencyExpr::new(name),
            via: MatchKind::Exact,
        }
    }

    #[test]
    fn add_node_returns_existing_index_for_same_name() {
        let mut g = DependencyGraph::new();
        let a1 = g.add_node(GraphNode::package(&PackageRecord::new("a", "1")));
        let a2 = g.add_node(GraphNode::package(&PackageRecord::new("a", "2")));
        assert_eq!(a1, a2);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.find("a"), Some(a1));
    }

    #[test]
    fn duplicate_edges_for_same_expression_are_ignored() {
        let mut g = DependencyGraph::new();
        let a = g.add_node(GraphNode::package(&PackageRecord::new("a", "1")));
        let b = g.add_node(GraphNode::package(&PackageRecord::new("b", "1")));
        assert!(g.add_edge(a, b, edge("b")));
        assert!(!g.add_edge(a, b, edge("b")));
        assert!(g.add_edge(a, b, edge("libb")));
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.successors(a), vec![b]);
    }

    #[test]
    fn edges_keep_declaration_order() {
        let mut g = DependencyGraph::new();
        let a = g.add_node(GraphNode::package(&PackageRecord::new("a", "1")));
        let b = g.add_node(GraphNode::package(&PackageRecord::new("b", "1")));
        let c = g.add_node(GraphNode::package(&PackageRecord::new("c", "1")));
        let d = g.add_node(GraphNode::package(&PackageRecord::new("d", "1")));
        g.add_edge(a, c, edge("c"));
        g.add_edge(a, b, edge("b"));
        g.add_edge(a, d, edge("d"));
        let order: Vec<_> = g
            .dependencies_of(a)
            .into_iter()
            .map(|(idx, _)| g.name(idx).to_string())
            .collect();
        assert_eq!(order, vec!["c", "b", "d"]);
        let names: Vec<_> = g.edges().iter().map(|e| e.to.name.clone()).collect();
        assert_eq!(names, vec!["c", "b", "d"]);
    }

    #[test]
    fn unresolved_nodes_are_named_with_prefix() {
        let node = GraphNode::unresolved("missing");
        assert_eq!(node.name, "unresolved:missing");
        assert!(node.is_unresolved());
        assert!(node.version().is_none());
    }

    #[test]
    fn synthetic_nodes_do_not_collide_with_packages() {
        let mut g = DependencyGraph::new();
        let real = g.add_node(GraphNode::package(&PackageRecord::new("unresolved:x", "1")));
        let synthetic = g.add_node(GraphNode::unresolved("x"));
        assert_ne!(real, synthetic);
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.find("unresolved:x"), Some(real));
        assert_eq!(g.find_unresolved("x"), Some(synthetic));
        assert_eq!(g.add_node(GraphNode::unresolved("x")), synthetic);
    }
}
