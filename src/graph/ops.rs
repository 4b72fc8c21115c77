use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use serde::Serialize;

use crate::graph::subgraph::TraversalDirection;
use crate::graph::{DependencyGraph, GraphView};

/// Cycles found in one pass. Each entry starts and ends with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycles: Vec<Vec<String>>,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    /// Whether `from -> to` is an edge of some reported cycle.
    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.cycles
            .iter()
            .any(|cycle| cycle.windows(2).any(|pair| pair[0] == from && pair[1] == to))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Visited,
}

struct Frame {
    node: NodeIndex,
    next: Vec<NodeIndex>,
    cursor: usize,
}

/// Depth-first search over the view in node order, keeping the current path.
/// An edge back onto the path records the slice from that node to itself.
/// Only back edges are reported: a cycle that closes through an already
/// finished node (e.g. `a -> c -> a` next to `a -> b -> c -> a`) is not
/// enumerated separately, though every cyclic graph yields at least one entry.
/// Explicit frames keep deep graphs off the call stack.
pub fn find_cycles<V: GraphView + ?Sized>(view: &V) -> CycleReport {
    let base = view.base();
    let mut state: HashMap<NodeIndex, VisitState> = HashMap::new();
    let mut path: Vec<NodeIndex> = Vec::new();
    let mut seen: HashSet<Vec<NodeIndex>> = HashSet::new();
    let mut cycles = Vec::new();

    for start in view.node_ids() {
        if state.contains_key(&start) {
            continue;
        }
        state.insert(start, VisitState::Visiting);
        path.push(start);
        let mut frames = vec![Frame {
            node: start,
            next: view.successors(start),
            cursor: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            let Some(&dep) = frame.next.get(frame.cursor) else {
                state.insert(frame.node, VisitState::Visited);
                path.pop();
                frames.pop();
                continue;
            };
            frame.cursor += 1;

            match state.get(&dep) {
                Some(VisitState::Visiting) => {
                    if let Some(pos) = path.iter().position(|n| *n == dep) {
                        let mut cycle = path[pos..].to_vec();
                        cycle.push(dep);
                        if seen.insert(cycle.clone()) {
                            cycles.push(
                                cycle.into_iter().map(|n| base.name(n).to_string()).collect(),
                            );
                        }
                    }
                }
                Some(VisitState::Visited) => {}
                None => {
                    state.insert(dep, VisitState::Visiting);
                    path.push(dep);
                    frames.push(Frame {
                        node: dep,
                        next: view.successors(dep),
                        cursor: 0,
                    });
                }
            }
        }
    }

    CycleReport { cycles }
}

/// Direct dependency names of `name`, in declaration order.
pub fn direct_dependencies(graph: &DependencyGraph, name: &str) -> Option<Vec<String>> {
    let idx = graph.find(name)?;
    Some(
        graph
            .successors(idx)
            .into_iter()
            .map(|n| graph.name(n).to_string())
            .collect(),
    )
}

/// Packages that depend on `name` directly.
pub fn direct_dependents(graph: &DependencyGraph, name: &str) -> Option<Vec<String>> {
    let idx = graph.find(name)?;
    Some(
        graph
            .predecessors(idx)
            .into_iter()
            .map(|n| graph.name(n).to_string())
            .collect(),
    )
}

/// Members adjacent to `idx` when walking `direction`. `Both` lists successors
/// first, then predecessors not already listed.
pub fn neighbours<V: GraphView + ?Sized>(
    view: &V,
    idx: NodeIndex,
    direction: TraversalDirection,
) -> Vec<NodeIndex> {
    match direction {
        TraversalDirection::Dependencies => view.successors(idx),
        TraversalDirection::Dependents => view.predecessors(idx),
        TraversalDirection::Both => {
            let mut next = view.successors(idx);
            for prev in view.predecessors(idx) {
                if !next.contains(&prev) {
                    next.push(prev);
                }
            }
            next
        }
    }
}

/// BFS distance from the nearest of `roots`, walking `direction`. Unreachable
/// nodes are absent. Renderers colour by these levels.
pub fn depth_levels<V: GraphView + ?Sized>(
    view: &V,
    roots: &[NodeIndex],
    direction: TraversalDirection,
) -> HashMap<NodeIndex, usize> {
    let mut levels = HashMap::new();
    let mut queue = VecDeque::new();
    for &root in roots {
        if view.includes(root) && levels.insert(root, 0).is_none() {
            queue.push_back(root);
        }
    }
    while let Some(current) = queue.pop_front() {
        let depth = levels[&current];
        for next in neighbours(view, current, direction) {
            if !levels.contains_key(&next) {
                levels.insert(next, depth + 1);
                queue.push_back(next);
            }
        }
    }
    levels
}
