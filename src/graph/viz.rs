use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use petgraph::graph::NodeIndex;
use serde::Serialize;

use crate::error::Result;
use crate::graph::ops::{depth_levels, find_cycles, neighbours, CycleReport};
use crate::graph::subgraph::TraversalDirection;
use crate::graph::{GraphView, MatchKind};
use crate::util::template::render_template;

/// PlantUML fill colours by BFS depth; deeper levels reuse the last one.
const LEVEL_COLORS: [&str; 5] = ["#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Tree,
    Flat,
    Dot,
    Plantuml,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Tree | OutputFormat::Flat => "txt",
            OutputFormat::Dot => "dot",
            OutputFormat::Plantuml => "puml",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tree" => Ok(OutputFormat::Tree),
            "flat" => Ok(OutputFormat::Flat),
            "dot" | "graphviz" => Ok(OutputFormat::Dot),
            "plantuml" | "puml" => Ok(OutputFormat::Plantuml),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "unknown format '{other}' (expected tree, flat, dot, plantuml or json)"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Tree => "tree",
            OutputFormat::Flat => "flat",
            OutputFormat::Dot => "dot",
            OutputFormat::Plantuml => "plantuml",
            OutputFormat::Json => "json",
        };
        f.write_str(name)
    }
}

/// Everything the renderers need, computed once from a view.
pub struct Layout<'v, V: GraphView + ?Sized> {
    view: &'v V,
    direction: TraversalDirection,
    order: Vec<NodeIndex>,
    roots: Vec<NodeIndex>,
    children: HashMap<NodeIndex, Vec<NodeIndex>>,
    labels: HashMap<NodeIndex, String>,
    levels: HashMap<NodeIndex, usize>,
    cycles: CycleReport,
}

impl<'v, V: GraphView + ?Sized> Layout<'v, V> {
    /// `roots` empty means "every node nothing points at", or all nodes when
    /// the view is one big cycle.
    pub fn new(
        view: &'v V,
        direction: TraversalDirection,
        roots: &[NodeIndex],
        show_versions: bool,
    ) -> Self {
        let base = view.base();
        let order = view.node_ids();

        let children: HashMap<NodeIndex, Vec<NodeIndex>> = order
            .iter()
            .map(|&idx| (idx, neighbours(view, idx, direction)))
            .collect();

        let roots = if roots.is_empty() {
            default_roots(&order, &children)
        } else {
            roots.iter().copied().filter(|r| view.includes(*r)).collect()
        };

        let labels = order
            .iter()
            .map(|&idx| {
                let node = base.node(idx);
                let label = match node.version() {
                    Some(version) if show_versions => format!("{} ({})", node.name, version),
                    _ => node.name.clone(),
                };
                (idx, label)
            })
            .collect();

        let levels = depth_levels(view, &roots, direction);
        let cycles = find_cycles(view);

        Self {
            view,
            direction,
            order,
            roots,
            children,
            labels,
            levels,
            cycles,
        }
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    pub fn cycles(&self) -> &CycleReport {
        &self.cycles
    }

    fn label(&self, idx: NodeIndex) -> &str {
        self.labels
            .get(&idx)
            .map(String::as_str)
            .unwrap_or_else(|| self.view.base().name(idx))
    }

    fn children(&self, idx: NodeIndex) -> &[NodeIndex] {
        self.children.get(&idx).map(Vec::as_slice).unwrap_or(&[])
    }

    fn level(&self, idx: NodeIndex) -> usize {
        self.levels.get(&idx).copied().unwrap_or(0)
    }
}

fn default_roots(
    order: &[NodeIndex],
    children: &HashMap<NodeIndex, Vec<NodeIndex>>,
) -> Vec<NodeIndex> {
    let pointed: HashSet<NodeIndex> = children
        .iter()
        .flat_map(|(from, next)| next.iter().filter(move |to| *to != from).copied())
        .collect();
    let roots: Vec<_> = order
        .iter()
        .copied()
        .filter(|idx| !pointed.contains(idx))
        .collect();
    if roots.is_empty() {
        order.to_vec()
    } else {
        roots
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Marker {
    Expanded,
    Cycle,
    Repeated,
}

/// One child printed under its parent during a depth-first walk.
struct Line {
    node: NodeIndex,
    depth: usize,
    prefix: String,
    is_last: bool,
    marker: Marker,
}

struct WalkFrame {
    node: NodeIndex,
    cursor: usize,
    depth: usize,
    prefix: String,
}

/// Pre-order walk below `root`. A node on the current path is a cycle, a node
/// expanded earlier is a repeat; neither is descended into. Explicit frames
/// keep long chains off the call stack.
fn walk_below<V: GraphView + ?Sized>(
    layout: &Layout<'_, V>,
    root: NodeIndex,
    expanded: &mut HashSet<NodeIndex>,
) -> Vec<Line> {
    expanded.insert(root);
    let mut lines = Vec::new();
    let mut path = vec![root];
    let mut frames = vec![WalkFrame {
        node: root,
        cursor: 0,
        depth: 1,
        prefix: String::new(),
    }];

    while let Some(frame) = frames.last_mut() {
        let children = layout.children(frame.node);
        let Some(&child) = children.get(frame.cursor) else {
            frames.pop();
            path.pop();
            continue;
        };
        frame.cursor += 1;
        let is_last = frame.cursor == children.len();
        let depth = frame.depth;
        let prefix = frame.prefix.clone();

        let marker = if path.contains(&child) {
            Marker::Cycle
        } else if !expanded.insert(child) {
            Marker::Repeated
        } else {
            Marker::Expanded
        };
        if marker == Marker::Expanded {
            path.push(child);
            frames.push(WalkFrame {
                node: child,
                cursor: 0,
                depth: depth + 1,
                prefix: format!("{prefix}{}", if is_last { "    " } else { "|   " }),
            });
        }
        lines.push(Line {
            node: child,
            depth,
            prefix,
            is_last,
            marker,
        });
    }
    lines
}

/// ASCII tree per root. A node already on the current path is marked
/// `(cycle)`; a node expanded earlier is marked `(*)` and not repeated.
pub fn render_tree<V: GraphView + ?Sized>(layout: &Layout<'_, V>) -> String {
    let mut out = String::new();
    let mut expanded = HashSet::new();
    for (idx, &root) in layout.roots.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(layout.label(root));
        out.push('\n');
        for line in walk_below(layout, root, &mut expanded) {
            out.push_str(&line.prefix);
            out.push_str(if line.is_last { "`-- " } else { "|-- " });
            out.push_str(layout.label(line.node));
            match line.marker {
                Marker::Cycle => out.push_str(" (cycle)"),
                Marker::Repeated if !layout.children(line.node).is_empty() => out.push_str(" (*)"),
                _ => {}
            }
            out.push('\n');
        }
    }
    out
}

/// Indented list per root, two spaces per level.
pub fn render_flat<V: GraphView + ?Sized>(layout: &Layout<'_, V>) -> String {
    let mut out = String::new();
    let mut expanded = HashSet::new();
    for (idx, &root) in layout.roots.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        out.push_str(layout.label(root));
        out.push('\n');
        for line in walk_below(layout, root, &mut expanded) {
            out.push_str(&"  ".repeat(line.depth));
            out.push_str(layout.label(line.node));
            if line.marker == Marker::Cycle {
                out.push_str(" (cycle)");
            }
            out.push('\n');
        }
    }
    out
}

/// Graphviz source. Unresolved nodes are dashed, cycle edges red.
pub fn render_dot<V: GraphView + ?Sized>(layout: &Layout<'_, V>) -> String {
    let base = layout.view.base();
    let mut out = String::from("digraph apkgraph {\n  rankdir=LR;\n  node [shape=box];\n");
    for &idx in &layout.order {
        let node = base.node(idx);
        let style = if node.is_unresolved() {
            ", style=dashed, color=gray"
        } else {
            ""
        };
        out.push_str(&format!(
            "  \"{}\" [label=\"{}\"{}];\n",
            escape_dot(&node.name),
            escape_dot(layout.label(idx)),
            style
        ));
    }
    for edge in layout.view.edge_views() {
        let attrs = if layout.cycles.contains_edge(&edge.from.name, &edge.to.name) {
            " [color=red]"
        } else if edge.edge.via == MatchKind::Provides {
            " [style=dotted]"
        } else {
            ""
        };
        out.push_str(&format!(
            "  \"{}\" -> \"{}\"{};\n",
            escape_dot(&edge.from.name),
            escape_dot(&edge.to.name),
            attrs
        ));
    }
    out.push_str("}\n");
    out
}

fn escape_dot(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// PlantUML component diagram, rectangles coloured by distance from the roots.
pub fn render_plantuml<V: GraphView + ?Sized>(layout: &Layout<'_, V>) -> String {
    let base = layout.view.base();
    let aliases = plantuml_aliases(layout.order.iter().map(|idx| base.name(*idx)));

    let mut out = String::from(
        "@startuml\nskinparam rectangle {\n    BackgroundColor White\n    BorderColor Black\n    FontSize 13\n}\nskinparam ArrowColor #555555\nleft to right direction\n\n",
    );
    for &idx in &layout.order {
        let name = base.name(idx);
        let color = LEVEL_COLORS[layout.level(idx).min(LEVEL_COLORS.len() - 1)];
        let alias = aliases.get(name).map(String::as_str).unwrap_or(name);
        let border = if base.node(idx).is_unresolved() {
            " ##[dashed]gray"
        } else {
            ""
        };
        out.push_str(&format!(
            "rectangle \"{}\" as {} {}{}\n",
            layout.label(idx).replace('"', "'"),
            alias,
            color,
            border
        ));
    }
    out.push('\n');
    for edge in layout.view.edge_views() {
        let from = aliases.get(edge.from.name.as_str()).cloned().unwrap_or_default();
        let to = aliases.get(edge.to.name.as_str()).cloned().unwrap_or_default();
        let arrow = if layout.cycles.contains_edge(&edge.from.name, &edge.to.name) {
            "-[#red]->"
        } else {
            "-->"
        };
        out.push_str(&format!("{from} {arrow} {to}\n"));
    }
    out.push_str("@enduml\n");
    out
}

/// PlantUML aliases allow only word characters; colliding names get a numeric suffix.
fn plantuml_aliases<'a>(names: impl Iterator<Item = &'a str>) -> HashMap<&'a str, String> {
    let mut taken = HashSet::new();
    let mut aliases = HashMap::new();
    for name in names {
        let mut base: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
            base.insert(0, '_');
        }
        let mut alias = base.clone();
        let mut n = 2;
        while !taken.insert(alias.clone()) {
            alias = format!("{base}_{n}");
            n += 1;
        }
        aliases.insert(name, alias);
    }
    aliases
}

#[derive(Debug, Serialize)]
pub struct GraphJson {
    pub roots: Vec<String>,
    pub direction: TraversalDirection,
    pub nodes: Vec<NodeJson>,
    pub edges: Vec<EdgeJson>,
    pub cycles: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct NodeJson {
    pub name: String,
    pub label: String,
    pub version: Option<String>,
    pub unresolved: bool,
    pub level: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EdgeJson {
    pub from: String,
    pub to: String,
    pub expression: String,
    pub via: MatchKind,
    pub cycle: bool,
}

pub fn graph_json<V: GraphView + ?Sized>(layout: &Layout<'_, V>) -> GraphJson {
    let base = layout.view.base();
    GraphJson {
        roots: layout
            .roots
            .iter()
            .map(|idx| base.name(*idx).to_string())
            .collect(),
        direction: layout.direction,
        nodes: layout
            .order
            .iter()
            .map(|&idx| {
                let node = base.node(idx);
                NodeJson {
                    name: node.name.clone(),
                    label: layout.label(idx).to_string(),
                    version: node.version().map(|v| v.raw.clone()),
                    unresolved: node.is_unresolved(),
                    level: layout.levels.get(&idx).copied(),
                }
            })
            .collect(),
        edges: layout
            .view
            .edge_views()
            .into_iter()
            .map(|edge| EdgeJson {
                from: edge.from.name.clone(),
                to: edge.to.name.clone(),
                expression: edge.edge.expression.to_string(),
                via: edge.edge.via,
                cycle: layout.cycles.contains_edge(&edge.from.name, &edge.to.name),
            })
            .collect(),
        cycles: layout.cycles.cycles.clone(),
    }
}

pub fn render_json<V: GraphView + ?Sized>(layout: &Layout<'_, V>) -> Result<String> {
    let mut out = serde_json::to_string_pretty(&graph_json(layout))?;
    out.push('\n');
    Ok(out)
}

/// Feeds the JSON document to a user tera template.
pub fn render_with_template<V: GraphView + ?Sized>(
    layout: &Layout<'_, V>,
    template: &str,
) -> Result<String> {
    let context = serde_json::to_value(graph_json(layout))?;
    render_template(template, &context)
}

pub fn render<V: GraphView + ?Sized>(layout: &Layout<'_, V>, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Tree => render_tree(layout),
        OutputFormat::Flat => render_flat(layout),
        OutputFormat::Dot => render_dot(layout),
        OutputFormat::Plantuml => render_plantuml(layout),
        OutputFormat::Json => render_json(layout)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::core::snapshot::Snapshot;
    use crate::graph::subgraph::{reachable_from, TraversalDirection};
    use crate::graph::viz::{
        graph_json, plantuml_aliases, render_dot, render_flat, render_plantuml, render_tree,
        render_with_template, Layout, OutputFormat,
    };
    use crate::index::IndexFormat;

    fn snapshot(text: &str) -> Snapshot {
        Snapshot::from_text(text, IndexFormat::Simple)
    }

    #[test]
    fn tree_marks_cycles_and_repeats() {
        let snap = snapshot("app:lib,tool\nlib:base\ntool:base\nbase:app\n");
        let sub = reachable_from(snap.graph(), "app", TraversalDirection::Dependencies)
            .expect("root");
        let root = sub.root();
        let layout = Layout::new(&sub, TraversalDirection::Dependencies, &[root], false);
        let expected = "app\n|-- lib\n|   `-- base\n|       `-- app (cycle)\n`-- tool\n    `-- base (*)\n";
        assert_eq!(render_tree(&layout), expected);
    }

    #[test]
    fn flat_indents_by_depth() {
        let snap = snapshot("a:b\nb:c\nc:\n");
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependencies, &[], false);
        assert_eq!(render_flat(&layout), "a\n  b\n    c\n");
    }

    #[test]
    fn long_chain_renders_every_level() {
        let text: String = (0..2000)
            .map(|i| format!("p{i}:p{}\n", i + 1))
            .chain(std::iter::once("p2000:\n".to_string()))
            .collect();
        let snap = snapshot(&text);
        let root = snap.graph().find("p0").expect("p0");
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependencies, &[root], false);
        let flat = render_flat(&layout);
        assert_eq!(flat.lines().count(), 2001);
        assert_eq!(flat.lines().last(), Some(format!("{}p2000", "  ".repeat(2000)).as_str()));
        let tree = render_tree(&layout);
        assert!(tree.lines().last().expect("last line").ends_with("`-- p2000"));
    }

    #[test]
    fn dependents_direction_walks_upwards() {
        let snap = snapshot("a:c\nb:c\nc:\n");
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependents, &[], false);
        assert_eq!(render_tree(&layout), "c\n|-- a\n`-- b\n");
    }

    #[test]
    fn default_roots_fall_back_to_all_nodes_in_full_cycle() {
        let snap = snapshot("a:b\nb:a\n");
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependencies, &[], false);
        assert_eq!(layout.roots().len(), 2);
    }

    #[test]
    fn dot_styles_unresolved_and_cycle_edges() {
        let snap = snapshot("a:b,missing\nb:a\n");
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependencies, &[], false);
        let dot = render_dot(&layout);
        assert!(dot.starts_with("digraph apkgraph {"));
        assert!(dot.contains("\"a\" -> \"b\" [color=red];"));
        assert!(dot.contains("\"b\" -> \"a\" [color=red];"));
        assert!(dot.contains("\"unresolved:missing\" [label=\"unresolved:missing\", style=dashed"));
        assert!(dot.contains("\"a\" -> \"unresolved:missing\";"));
    }

    #[test]
    fn plantuml_colours_by_level_and_sanitises_aliases() {
        let snap = snapshot("py3-foo:lib.so\nlib.so:\n");
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependencies, &[], false);
        let puml = render_plantuml(&layout);
        assert!(puml.starts_with("@startuml\n"));
        assert!(puml.trim_end().ends_with("@enduml"));
        assert!(puml.contains("rectangle \"py3-foo\" as py3_foo #FF6B6B\n"));
        assert!(puml.contains("rectangle \"lib.so\" as lib_so #4ECDC4\n"));
        assert!(puml.contains("py3_foo --> lib_so\n"));
    }

    #[test]
    fn alias_collisions_get_suffixes() {
        let aliases = plantuml_aliases(["a-b", "a.b", "1x"].into_iter());
        assert_eq!(aliases["a-b"], "a_b");
        assert_eq!(aliases["a.b"], "a_b_2");
        assert_eq!(aliases["1x"], "_1x");
    }

    #[test]
    fn json_lists_nodes_edges_and_levels() {
        let snap = Snapshot::from_text(
            "P:a\nV:1.0-r0\nD:so:libb\n\nP:b\nV:2.0-r1\np:so:libb=2\n",
            IndexFormat::Apkindex,
        );
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependencies, &[], true);
        let json = graph_json(&layout);
        assert_eq!(json.roots, vec!["a"]);
        assert_eq!(json.nodes[1].label, "b (2.0-r1)");
        assert_eq!(json.nodes[1].level, Some(1));
        assert_eq!(json.edges[0].expression, "so:libb");
        assert!(!json.edges[0].cycle);
    }

    #[test]
    fn template_receives_graph_context() {
        let snap = snapshot("a:b\nb:\n");
        let layout = Layout::new(snap.graph(), TraversalDirection::Dependencies, &[], false);
        let out = render_with_template(
            &layout,
            "{% for e in edges %}{{ e.from }}->{{ e.to }};{% endfor %}",
        )
        .expect("render");
        assert_eq!(out, "a->b;");
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("puml".parse(), Ok(OutputFormat::Plantuml));
        assert_eq!("DOT".parse(), Ok(OutputFormat::Dot));
        assert!("svg".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Plantuml.extension(), "puml");
    }
}
