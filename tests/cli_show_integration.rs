use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct Fixture {
    root: PathBuf,
}

impl Fixture {
    fn new(prefix: &str) -> Self {
        let root = unique_temp_dir(prefix);
        fs::create_dir_all(&root).expect("create fixture dir");
        Self { root }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(apkgraph_bin())
            .current_dir(&self.root)
            .env_remove("APKGRAPH_CONFIG")
            .env_remove("APKGRAPH_ARCH")
            .env_remove("RUST_LOG")
            .arg("--no-color")
            .args(args)
            .output()
            .expect("run apkgraph")
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        assert!(
            output.status.success(),
            "apkgraph {args:?} failed\nstdout:\n{stdout}\nstderr:\n{stderr}"
        );
        stdout
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn apkgraph_bin() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_apkgraph") {
        return PathBuf::from(path);
    }

    let current_exe = std::env::current_exe().expect("resolve current test binary path");
    let target_dir = current_exe
        .parent()
        .and_then(|path| path.parent())
        .expect("derive cargo target dir from test binary path");
    let bin_name = if cfg!(windows) {
        "apkgraph.exe"
    } else {
        "apkgraph"
    };
    let fallback = target_dir.join(bin_name);

    if fallback.is_file() {
        fallback
    } else {
        panic!(
            "CARGO_BIN_EXE_apkgraph is not set and fallback binary not found at {}",
            fallback.display()
        );
    }
}

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos();
    let pid = std::process::id();
    std::env::temp_dir().join(format!("apkgraph-{prefix}-{pid}-{nanos}"))
}

const INDEX: &str = "\
P:app
V:2.0-r0
D:lib cmd:sh missing

P:lib
V:1.1-r3
D:so:libc.musl-x86_64.so.1

P:musl
V:1.2.5-r0
p:so:libc.musl-x86_64.so.1=1

P:busybox
V:1.36.1-r29
p:cmd:sh=1.36.1-r29
";

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read output file")
}

#[test]
fn show_tree_for_root_from_flag_index() {
    let fixture = Fixture::new("show-tree");
    fixture.write("APKINDEX", INDEX);
    let stdout = fixture.run_ok(&["show", "app", "--index", "APKINDEX", "--format", "tree"]);
    assert_eq!(
        stdout,
        "app (2.0-r0)\n|-- lib (1.1-r3)\n|   `-- musl (1.2.5-r0)\n|-- busybox (1.36.1-r29)\n`-- unresolved:missing\n"
    );
}

#[test]
fn config_file_drives_test_mode_plantuml_output() {
    let fixture = Fixture::new("config-plantuml");
    fixture.write("test_graph.txt", "A:B,C\nB:C\nC:A\n");
    fixture.write(
        "apkgraph.toml",
        "[settings]\npackage_name = \"A\"\ntest_mode = true\n\n[output]\nformat = \"plantuml\"\npath = \"dependency_graph.puml\"\n",
    );
    fixture.run_ok(&["show"]);

    let puml = read(&fixture.root.join("dependency_graph.puml"));
    assert!(puml.starts_with("@startuml"));
    assert!(puml.contains("rectangle \"A\" as A #FF6B6B"));
    assert!(puml.contains("rectangle \"B\" as B #4ECDC4"));
    assert!(puml.contains("C -[#red]-> A"));
    assert!(puml.trim_end().ends_with("@enduml"));
}

#[test]
fn multiple_roots_write_one_file_each() {
    let fixture = Fixture::new("multi-root");
    fixture.write("APKINDEX", INDEX);
    fixture.run_ok(&[
        "show", "app", "lib", "--index", "APKINDEX", "--format", "dot", "--output", "g.dot",
        "--jobs", "2",
    ]);
    let app = read(&fixture.root.join("g.app.dot"));
    let lib = read(&fixture.root.join("g.lib.dot"));
    assert!(app.contains("\"app\" -> \"unresolved:missing\";"));
    assert!(!lib.contains("\"app\""));
    assert!(lib.contains("\"lib\" -> \"musl\" [style=dotted];"));
}

#[test]
fn unknown_root_fails_with_message() {
    let fixture = Fixture::new("unknown-root");
    fixture.write("APKINDEX", INDEX);
    let output = fixture.run(&["show", "ghost", "--index", "APKINDEX"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown root package 'ghost'"), "{stderr}");
}

#[test]
fn resolve_lists_candidates_in_pick_order() {
    let fixture = Fixture::new("resolve");
    fixture.write(
        "APKINDEX",
        "P:alt-sh\nV:1\np:sh\n\nP:sh\nV:2\n\nP:dash\nV:3\np:sh\n",
    );
    let stdout = fixture.run_ok(&["resolve", "sh", "--index", "APKINDEX", "--json"]);
    let candidates: Vec<serde_json::Value> =
        serde_json::from_str(&stdout).expect("parse resolve json");
    let names: Vec<_> = candidates
        .iter()
        .map(|c| c["name"].as_str().expect("name").to_string())
        .collect();
    assert_eq!(names, vec!["sh", "alt-sh", "dash"]);
    assert_eq!(candidates[0]["via"], "exact");
    assert_eq!(candidates[1]["via"], "provides");
}

#[test]
fn deps_and_dependents_queries() {
    let fixture = Fixture::new("neighbours");
    fixture.write("APKINDEX", INDEX);
    let stdout = fixture.run_ok(&["deps", "app", "--index", "APKINDEX", "--transitive", "--json"]);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("parse deps json");
    assert_eq!(
        json["packages"],
        serde_json::json!(["lib", "busybox", "unresolved:missing", "musl"])
    );

    let stdout = fixture.run_ok(&["dependents", "musl", "--index", "APKINDEX"]);
    assert_eq!(stdout, "lib 1.1-r3\n");
}

#[test]
fn cycles_and_check_succeed_on_cyclic_input() {
    let fixture = Fixture::new("cycles");
    fixture.write("graph.txt", "A:B\nB:C\nC:A\nD:nothing\n");

    let stdout = fixture.run_ok(&["cycles", "--index", "graph.txt", "--simple"]);
    assert_eq!(stdout, "A -> B -> C -> A\n");

    let stdout = fixture.run_ok(&["check", "--index", "graph.txt", "--simple", "--json"]);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("parse check json");
    assert_eq!(report["cycles"]["cycles"][0], serde_json::json!(["A", "B", "C", "A"]));
    assert_eq!(report["unresolved"][0]["from"], "D");
    assert_eq!(report["packages"], 4);
}

#[test]
fn template_output_uses_graph_context() {
    let fixture = Fixture::new("template");
    fixture.write("graph.txt", "a:b\nb:\n");
    fixture.write(
        "edges.tera",
        "{% for e in edges %}{{ e.from }} => {{ e.to }}\n{% endfor %}",
    );
    let stdout = fixture.run_ok(&[
        "show",
        "--index",
        "graph.txt",
        "--simple",
        "--template",
        "edges.tera",
    ]);
    assert_eq!(stdout, "a => b\n");
}

#[test]
fn missing_index_source_is_a_config_error() {
    let fixture = Fixture::new("no-source");
    let output = fixture.run(&["cycles"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing setting"), "{stderr}");
}
