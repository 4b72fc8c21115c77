use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::{env, fs};

use anyhow::Context as _;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use tracing::debug;

use crate::config::{load_effective_config, LoadedConfig};
use crate::core::package::DependencyExpr;
use crate::core::snapshot::Snapshot;
use crate::error::{ApkGraphError, Result};
use crate::graph::check::{check_snapshot, HealthReport};
use crate::graph::ops::{direct_dependencies, direct_dependents, find_cycles};
use crate::graph::subgraph::{extract_many, reachable_from, TraversalDirection, UnknownRootError};
use crate::graph::viz::{self, Layout, OutputFormat};
use crate::graph::{GraphView, MatchKind};
use crate::index::{IndexFormat, IndexSource};
use crate::util::template::load_template;
use crate::util::{logging, output};

#[derive(Parser, Debug)]
#[command(name = "apkgraph")]
#[command(about = "Dependency graphs for Alpine APK repositories", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Local APKINDEX (plain or .tar.gz) instead of the configured source.
    #[arg(short, long, global = true, conflicts_with = "repository")]
    pub index: Option<PathBuf>,
    /// Repository root URL; `<url>/<arch>/APKINDEX.tar.gz` is fetched.
    #[arg(short, long, global = true)]
    pub repository: Option<String>,
    #[arg(long, global = true)]
    pub arch: Option<String>,
    /// Read the index as `pkg:dep,dep` lines.
    #[arg(long, global = true)]
    pub simple: bool,
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the graph, or the subgraph of each root.
    Show(ShowArgs),
    /// List what a package depends on.
    Deps(NeighbourArgs),
    /// List what depends on a package.
    Dependents(NeighbourArgs),
    /// Show the packages satisfying a dependency expression, in pick order.
    Resolve(ResolveArgs),
    Cycles(ReportArgs),
    /// Parse warnings, unresolved dependencies and cycles.
    Check(ReportArgs),
    /// Print the effective configuration.
    Config,
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub roots: Vec<String>,
    #[arg(short, long)]
    pub format: Option<String>,
    #[arg(short, long)]
    pub direction: Option<String>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(short, long)]
    pub template: Option<PathBuf>,
    /// Run `dot` or `plantuml` on the written file.
    #[arg(long, requires = "output")]
    pub render: bool,
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct NeighbourArgs {
    pub package: String,
    #[arg(short, long)]
    pub transitive: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    pub expression: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    pub shell: Shell,
}

pub fn run() {
    let cli = Cli::parse();
    if cli.global.no_color {
        output::set_colors(false);
    }
    logging::init(cli.global.verbose, cli.global.quiet);
    if let Err(err) = dispatch(cli) {
        output::error(&err.to_string());
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Show(args) => handle_show(args, &global),
        Commands::Deps(args) => handle_neighbours(args, &global, TraversalDirection::Dependencies),
        Commands::Dependents(args) => {
            handle_neighbours(args, &global, TraversalDirection::Dependents)
        }
        Commands::Resolve(args) => handle_resolve(args, &global),
        Commands::Cycles(args) => handle_cycles(args, &global),
        Commands::Check(args) => handle_check(args, &global),
        Commands::Config => handle_config(&global),
        Commands::Completions(args) => {
            clap_complete::generate(args.shell, &mut Cli::command(), "apkgraph", &mut io::stdout());
            Ok(())
        }
    }
}

/// Effective config plus the index source it points at.
struct Session {
    loaded: LoadedConfig,
    source: IndexSource,
    format: IndexFormat,
}

impl Session {
    fn open(global: &GlobalArgs) -> Result<Self> {
        let loaded = load_config(global)?;
        let settings = &loaded.config.settings;
        let (source, format) = if let Some(path) = &global.index {
            (IndexSource::File(path.clone()), IndexFormat::Apkindex)
        } else if let Some(url) = &global.repository {
            (IndexSource::from_input(url, settings.arch()), IndexFormat::Apkindex)
        } else {
            settings.index_source(&loaded.base_dir)?
        };
        let format = if global.simple {
            IndexFormat::Simple
        } else {
            format
        };
        debug!(%source, ?format, "index source selected");
        Ok(Self {
            loaded,
            source,
            format,
        })
    }

    fn snapshot(&self, quiet: bool) -> Result<Snapshot> {
        let snapshot = Snapshot::load(&self.source, self.format)?;
        if !quiet {
            let warnings = snapshot.warnings().len();
            let unresolved = snapshot.graph().unresolved().len();
            if warnings > 0 || unresolved > 0 {
                output::warn(&format!(
                    "{}: {} parse warnings, {} unresolved dependencies (see `apkgraph check`)",
                    snapshot.label(),
                    warnings,
                    unresolved
                ));
            }
        }
        Ok(snapshot)
    }

    fn show_versions(&self) -> bool {
        self.format != IndexFormat::Simple
    }
}

fn load_config(global: &GlobalArgs) -> Result<LoadedConfig> {
    let cwd = env::current_dir()?;
    let mut loaded = load_effective_config(&cwd, global.config.clone())?;
    if let Some(arch) = &global.arch {
        loaded.config.settings.arch = Some(arch.clone());
    }
    Ok(loaded)
}

fn invalid(message: String) -> ApkGraphError {
    ApkGraphError::Other(anyhow::anyhow!(message))
}

/// A root given as a package name, or failing that, as an expression picked
/// through the resolver (`so:libc.musl-x86_64.so.1`, `busybox>=1.36`).
fn resolve_root(snapshot: &Snapshot, token: &str) -> Result<String> {
    if snapshot.graph().contains(token) {
        return Ok(token.to_string());
    }
    let (expr, _) = DependencyExpr::parse(token);
    choose_root(snapshot, &expr)
}

fn choose_root(snapshot: &Snapshot, expr: &DependencyExpr) -> Result<String> {
    snapshot
        .resolver()
        .choose(expr)
        .map(|candidate| candidate.record.name.clone())
        .ok_or_else(|| UnknownRootError(expr.to_string()).into())
}

fn handle_show(args: ShowArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let output_cfg = &session.loaded.config.output;

    let format: OutputFormat = args
        .format
        .as_deref()
        .or(output_cfg.format.as_deref())
        .unwrap_or("tree")
        .parse()
        .map_err(invalid)?;
    let direction: TraversalDirection = args
        .direction
        .as_deref()
        .or(output_cfg.direction.as_deref())
        .unwrap_or("dependencies")
        .parse()
        .map_err(invalid)?;
    let template = match (&args.template, &output_cfg.template) {
        (Some(path), _) => Some(load_template(path)?),
        (None, Some(path)) => Some(load_template(&session.loaded.base_dir.join(path))?),
        (None, None) => None,
    };
    let output_path = args
        .output
        .clone()
        .or_else(|| {
            output_cfg
                .path
                .as_ref()
                .map(|path| session.loaded.base_dir.join(path))
        })
        .map(|path| {
            if template.is_some() {
                path
            } else {
                with_default_extension(path, format)
            }
        });

    let snapshot = session.snapshot(global.quiet)?;
    let mut roots = Vec::new();
    for token in &args.roots {
        roots.push(resolve_root(&snapshot, token)?);
    }
    if roots.is_empty() {
        if let Some(expr) = session.loaded.config.settings.root_requirement()? {
            roots.push(choose_root(&snapshot, &expr)?);
        }
    }

    let mut rendered: Vec<(Option<String>, String)> = Vec::new();
    if roots.is_empty() {
        let layout = Layout::new(snapshot.graph(), direction, &[], session.show_versions());
        rendered.push((None, render_layout(&layout, format, template.as_deref())?));
    } else {
        for subgraph in extract_many(snapshot.graph(), &roots, direction, args.jobs) {
            let subgraph = subgraph?;
            debug!(root = subgraph.root_name(), nodes = subgraph.len(), "extracted subgraph");
            let layout = Layout::new(
                &subgraph,
                direction,
                &[subgraph.root()],
                session.show_versions(),
            );
            let text = render_layout(&layout, format, template.as_deref())?;
            rendered.push((Some(subgraph.root_name().to_string()), text));
        }
    }

    match output_path {
        Some(path) => {
            let multiple = rendered.len() > 1;
            for (root, text) in rendered {
                let target = match (&root, multiple) {
                    (Some(root), true) => per_root_path(&path, root),
                    _ => path.clone(),
                };
                fs::write(&target, text)
                    .with_context(|| format!("failed to write {}", target.display()))?;
                output::success(&format!("wrote {}", target.display()));
                if args.render {
                    render_external(&target, format);
                }
            }
        }
        None => {
            let texts: Vec<_> = rendered.into_iter().map(|(_, text)| text).collect();
            print!("{}", texts.join("\n"));
        }
    }
    Ok(())
}

fn render_layout<V: GraphView + ?Sized>(
    layout: &Layout<'_, V>,
    format: OutputFormat,
    template: Option<&str>,
) -> Result<String> {
    match template {
        Some(template) => viz::render_with_template(layout, template),
        None => viz::render(layout, format),
    }
}

/// `graph` + dot -> `graph.dot`; an explicit extension is kept.
fn with_default_extension(path: PathBuf, format: OutputFormat) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(format.extension())
    }
}

/// `graph.puml` + `busybox` -> `graph.busybox.puml`.
fn per_root_path(path: &Path, root: &str) -> PathBuf {
    let safe: String = root
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{safe}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{safe}"),
    };
    path.with_file_name(name)
}

/// Best effort: a missing renderer is a warning, the source file is already written.
fn render_external(path: &Path, format: OutputFormat) {
    let mut command = match format {
        OutputFormat::Dot => {
            let mut cmd = Command::new("dot");
            cmd.arg("-Tpng").arg("-o").arg(path.with_extension("png")).arg(path);
            cmd
        }
        OutputFormat::Plantuml => {
            let mut cmd = Command::new("plantuml");
            cmd.arg(path);
            cmd
        }
        other => {
            output::warn(&format!("--render has no external renderer for {other} output"));
            return;
        }
    };
    match command.status() {
        Ok(status) if status.success() => {
            output::success(&format!("rendered {}", path.with_extension("png").display()));
        }
        Ok(status) => output::warn(&format!("renderer exited with {status}")),
        Err(err) => output::warn(&format!(
            "could not run renderer ({err}); install graphviz or plantuml to produce images"
        )),
    }
}

#[derive(Serialize)]
struct NeighbourJson<'a> {
    package: &'a str,
    direction: TraversalDirection,
    transitive: bool,
    packages: Vec<String>,
}

fn handle_neighbours(
    args: NeighbourArgs,
    global: &GlobalArgs,
    direction: TraversalDirection,
) -> Result<()> {
    let session = Session::open(global)?;
    let snapshot = session.snapshot(global.quiet)?;
    let package = resolve_root(&snapshot, &args.package)?;
    let graph = snapshot.graph();

    let packages = if args.transitive {
        let subgraph = reachable_from(graph, &package, direction)?;
        subgraph
            .names()
            .into_iter()
            .skip(1)
            .map(str::to_string)
            .collect()
    } else {
        let direct = match direction {
            TraversalDirection::Dependents => direct_dependents(graph, &package),
            _ => direct_dependencies(graph, &package),
        };
        direct.ok_or_else(|| UnknownRootError(package.clone()))?
    };

    if args.json {
        let json = NeighbourJson {
            package: &package,
            direction,
            transitive: args.transitive,
            packages,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    for name in packages {
        let label = graph
            .find(&name)
            .and_then(|idx| graph.node(idx).version())
            .filter(|_| session.show_versions())
            .map(|version| format!("{name} {version}"))
            .unwrap_or(name);
        println!("{label}");
    }
    Ok(())
}

#[derive(Serialize)]
struct CandidateJson<'a> {
    name: &'a str,
    version: &'a str,
    via: MatchKind,
}

fn handle_resolve(args: ResolveArgs, global: &GlobalArgs) -> Result<()> {
    let (expr, error) = DependencyExpr::parse(&args.expression);
    if let Some(error) = error {
        return Err(invalid(format!("invalid expression '{}': {error}", args.expression)));
    }
    let session = Session::open(global)?;
    let snapshot = session.snapshot(global.quiet)?;
    let candidates = snapshot.resolver().resolve(&expr);

    if args.json {
        let json: Vec<_> = candidates
            .iter()
            .map(|candidate| CandidateJson {
                name: &candidate.record.name,
                version: candidate.record.version.as_str(),
                via: candidate.via,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if candidates.is_empty() {
        output::warn(&format!("nothing satisfies '{expr}'"));
        return Ok(());
    }
    for (pos, candidate) in candidates.iter().enumerate() {
        let via = match candidate.via {
            MatchKind::Exact => "exact",
            MatchKind::Provides => "provides",
            MatchKind::Unresolved => "unresolved",
        };
        let marker = if pos == 0 { "*" } else { " " };
        println!(
            "{marker} {} {} ({via})",
            candidate.record.name, candidate.record.version
        );
    }
    Ok(())
}

fn handle_cycles(args: ReportArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let snapshot = session.snapshot(true)?;
    let report = find_cycles(snapshot.graph());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if report.is_empty() {
        output::success("no cycles found");
        return Ok(());
    }
    for cycle in &report.cycles {
        println!("{}", cycle.join(" -> "));
    }
    Ok(())
}

fn handle_check(args: ReportArgs, global: &GlobalArgs) -> Result<()> {
    let session = Session::open(global)?;
    let snapshot = session.snapshot(true)?;
    let report = check_snapshot(&snapshot);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_health_report(&report);
    Ok(())
}

fn print_health_report(report: &HealthReport) {
    if !report.parse_warnings.is_empty() {
        output::heading("Parse warnings:");
        for warning in &report.parse_warnings {
            println!("  {warning}");
        }
    }
    if !report.unresolved.is_empty() {
        output::heading("Unresolved dependencies:");
        for missing in &report.unresolved {
            println!("  {} -> {}", missing.from, missing.expression);
        }
    }
    if !report.cycles.is_empty() {
        output::heading("Cycles:");
        for cycle in &report.cycles.cycles {
            println!("  {}", cycle.join(" -> "));
        }
    }
    if report.is_clean() {
        output::success(&report.summary());
    } else {
        output::warn(&report.summary());
    }
}

fn handle_config(global: &GlobalArgs) -> Result<()> {
    let loaded = load_config(global)?;
    match &loaded.path {
        Some(path) => println!("# config: {}", path.display()),
        None => println!("# config: none (defaults)"),
    }
    match Session::open(global) {
        Ok(session) => println!("# index: {} ({:?})", session.source, session.format),
        Err(err) => println!("# index: {err}"),
    }
    let text = toml::to_string_pretty(&loaded.config)
        .map_err(|err| ApkGraphError::Other(anyhow::Error::new(err)))?;
    print!("{text}");
    Ok(())
}
