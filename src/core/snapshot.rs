use tracing::debug;

use crate::graph::builder::build_graph;
use crate::graph::resolver::NameResolver;
use crate::graph::DependencyGraph;
use crate::index::{
    load_index_text, parser_for, IndexError, IndexFormat, IndexSource, PackageIndex,
    ParseWarning, ParsedIndex,
};

/// Parsed index plus the graph built from it. Never mutated after
/// construction; pass it by reference to any number of query threads.
#[derive(Debug, Clone)]
pub struct Snapshot {
    label: String,
    parsed: ParsedIndex,
    graph: DependencyGraph,
}

impl Snapshot {
    pub fn from_text(text: &str, format: IndexFormat) -> Self {
        Self::from_text_labeled(text, format, "<memory>")
    }

    fn from_text_labeled(text: &str, format: IndexFormat, label: &str) -> Self {
        let parser = parser_for(format);
        let parsed = parser.parse(text);
        let graph = build_graph(&parsed.index);
        debug!(
            source = label,
            parser = parser.id(),
            packages = parsed.index.len(),
            "snapshot ready"
        );
        Self {
            label: label.to_string(),
            parsed,
            graph,
        }
    }

    pub fn load(source: &IndexSource, format: IndexFormat) -> Result<Self, IndexError> {
        let text = load_index_text(source)?;
        Ok(Self::from_text_labeled(&text, format, &source.to_string()))
    }

    /// Where the index text came from, for messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn index(&self) -> &PackageIndex {
        &self.parsed.index
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.parsed.warnings
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn resolver(&self) -> NameResolver<'_> {
        NameResolver::new(&self.parsed.index)
    }
}
