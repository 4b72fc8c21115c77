use std::collections::{HashSet, VecDeque};
use std::str::FromStr;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use thiserror::Error;

use crate::graph::{DependencyGraph, GraphView};
use crate::util::parallel::run_in_parallel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown root package '{0}'")]
pub struct UnknownRootError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalDirection {
    /// Follow outgoing edges.
    Dependencies,
    /// Follow incoming edges.
    Dependents,
    Both,
}

impl FromStr for TraversalDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dependencies" | "deps" | "down" => Ok(TraversalDirection::Dependencies),
            "dependents" | "rdeps" | "up" => Ok(TraversalDirection::Dependents),
            "both" => Ok(TraversalDirection::Both),
            other => Err(format!(
                "unknown direction '{other}' (expected dependencies, dependents or both)"
            )),
        }
    }
}

/// Read-only view of the nodes reachable from one root, with every parent
/// edge between two members. Borrows the parent graph; copies no records.
#[derive(Debug, Clone)]
pub struct Subgraph<'g> {
    graph: &'g DependencyGraph,
    root: NodeIndex,
    direction: TraversalDirection,
    order: Vec<NodeIndex>,
    members: HashSet<NodeIndex>,
}

impl<'g> Subgraph<'g> {
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn root_name(&self) -> &'g str {
        self.graph.name(self.root)
    }

    pub fn direction(&self) -> TraversalDirection {
        self.direction
    }

    /// Member names in discovery order, root first.
    pub fn names(&self) -> Vec<&'g str> {
        self.order.iter().map(|idx| self.graph.name(*idx)).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graph
            .find(name)
            .map(|idx| self.members.contains(&idx))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl GraphView for Subgraph<'_> {
    fn base(&self) -> &DependencyGraph {
        self.graph
    }

    fn node_ids(&self) -> Vec<NodeIndex> {
        self.order.clone()
    }

    fn includes(&self, idx: NodeIndex) -> bool {
        self.members.contains(&idx)
    }
}

/// Closure of `root` in `direction`. `Both` is the union of the dependency and
/// dependent closures, so siblings reached through a shared dependency are not
/// pulled in.
pub fn reachable_from<'g>(
    graph: &'g DependencyGraph,
    root: &str,
    direction: TraversalDirection,
) -> Result<Subgraph<'g>, UnknownRootError> {
    let start = graph
        .find(root)
        .ok_or_else(|| UnknownRootError(root.to_string()))?;

    let mut order = Vec::new();
    let mut members = HashSet::new();
    match direction {
        TraversalDirection::Dependencies => {
            bfs(graph, start, Walk::Outgoing, &mut order, &mut members)
        }
        TraversalDirection::Dependents => {
            bfs(graph, start, Walk::Incoming, &mut order, &mut members)
        }
        TraversalDirection::Both => {
            bfs(graph, start, Walk::Outgoing, &mut order, &mut members);
            bfs(graph, start, Walk::Incoming, &mut order, &mut members);
        }
    }

    Ok(Subgraph {
        graph,
        root: start,
        direction,
        order,
        members,
    })
}

/// Extracts one subgraph per root on a rayon pool; results keep root order.
pub fn extract_many<'g>(
    graph: &'g DependencyGraph,
    roots: &[String],
    direction: TraversalDirection,
    jobs: Option<usize>,
) -> Vec<Result<Subgraph<'g>, UnknownRootError>> {
    run_in_parallel(roots.to_vec(), jobs, |root| {
        reachable_from(graph, &root, direction)
    })
}

#[derive(Clone, Copy)]
enum Walk {
    Outgoing,
    Incoming,
}

fn bfs(
    graph: &DependencyGraph,
    start: NodeIndex,
    walk: Walk,
    order: &mut Vec<NodeIndex>,
    members: &mut HashSet<NodeIndex>,
) {
    let mut visited = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    if members.insert(start) {
        order.push(start);
    }
    while let Some(current) = queue.pop_front() {
        let next = match walk {
            Walk::Outgoing => graph.successors(current),
            Walk::Incoming => graph.predecessors(current),
        };
        for idx in next {
            if !visited.insert(idx) {
                continue;
            }
            if members.insert(idx) {
                order.push(idx);
            }
            queue.push_back(idx);
        }
    }
}
