use tracing::{debug, warn};

use crate::graph::resolver::NameResolver;
use crate::graph::{
    DependencyEdge, DependencyGraph, GraphNode, MatchKind, UnresolvedDependency,
};
use crate::index::PackageIndex;

/// Builds a fresh graph from a parsed index. One node per package in index
/// order, then one synthetic node per distinct unresolved name. Each declared
/// dependency becomes exactly one edge to the first candidate the resolver
/// returns, so the result depends only on the index content.
pub fn build_graph(index: &PackageIndex) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    let resolver = NameResolver::new(index);

    let nodes: Vec<_> = index
        .records()
        .iter()
        .map(|record| graph.add_node(GraphNode::package(record)))
        .collect();

    for (record, &from) in index.records().iter().zip(&nodes) {
        for expr in &record.depends_on {
            let (to, via) = match resolver.choose(expr) {
                Some(candidate) => {
                    let to = graph
                        .find_package(&candidate.record.name)
                        .unwrap_or_else(|| graph.add_node(GraphNode::package(candidate.record)));
                    (to, candidate.via)
                }
                None => (
                    graph.add_node(GraphNode::unresolved(&expr.name)),
                    MatchKind::Unresolved,
                ),
            };
            let added = graph.add_edge(
                from,
                to,
                DependencyEdge {
                    expression: expr.clone(),
                    via,
                },
            );
            // a repeated expression collapses into the existing edge and warning
            if added && via == MatchKind::Unresolved {
                warn!(package = %record.name, dependency = %expr, "unresolved dependency");
                graph.record_unresolved(UnresolvedDependency {
                    from: record.name.clone(),
                    expression: expr.clone(),
                });
            }
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        unresolved = graph.unresolved().len(),
        "built dependency graph"
    );
    graph
}
