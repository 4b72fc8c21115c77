use serde::Serialize;

use crate::core::snapshot::Snapshot;
use crate::graph::ops::{find_cycles, CycleReport};
use crate::graph::UnresolvedDependency;
use crate::index::ParseWarning;

/// Everything a snapshot recovered from instead of failing on.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub packages: usize,
    pub edges: usize,
    pub parse_warnings: Vec<ParseWarning>,
    pub unresolved: Vec<UnresolvedDependency>,
    pub cycles: CycleReport,
}

impl HealthReport {
    /// Cycles are reported but do not make a snapshot unclean.
    pub fn is_clean(&self) -> bool {
        self.parse_warnings.is_empty() && self.unresolved.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} packages, {} edges, {} parse warnings, {} unresolved, {} cycles",
            self.packages,
            self.edges,
            self.parse_warnings.len(),
            self.unresolved.len(),
            self.cycles.len()
        )
    }
}

pub fn check_snapshot(snapshot: &Snapshot) -> HealthReport {
    let graph = snapshot.graph();
    HealthReport {
        packages: snapshot.index().len(),
        edges: graph.edge_count(),
        parse_warnings: snapshot.warnings().to_vec(),
        unresolved: graph.unresolved().to_vec(),
        cycles: find_cycles(graph),
    }
}
