//! End-to-end go-to-declaration scenarios over small on-disk projects.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zynav::config::EngineConfig;
use zynav::index::IndexService;
use zynav::resolve::{Location, Request, ResolutionEngine};

struct Project {
    dir: TempDir,
    service: IndexService,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            write(dir.path(), rel, content);
        }
        let config = EngineConfig {
            throttle_ms: 0,
            ..EngineConfig::default()
        };
        let service = IndexService::open(dir.path(), config).unwrap();
        Self { dir, service }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.service.root().join(rel)
    }

    /// Resolve with the cursor on the `nth` occurrence of `needle` in `rel`.
    fn resolve(&self, rel: &str, needle: &str, nth: usize) -> Vec<Location> {
        let path = self.path(rel);
        let text = fs::read_to_string(&path).unwrap();
        let offset = text
            .match_indices(needle)
            .nth(nth)
            .unwrap_or_else(|| panic!("'{needle}' #{nth} not in {rel}"))
            .0;
        ResolutionEngine::new(&self.service).resolve(&Request {
            text: &text,
            offset,
            path: Some(&path),
        })
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn files(locations: &[Location], root: &Path) -> Vec<String> {
    let mut files: Vec<String> = locations
        .iter()
        .map(|l| l.path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    files.sort();
    files
}

const MODEL_USERS: &str = "namespace Model;\nclass Users {\n  public $age;\n  function age() {}\n}\n";
const LOGIC_USERS: &str = "namespace Logic;\nclass Users {\n  function age() {}\n}\n";

#[test]
fn ambiguous_method_returns_both_namespaces() {
    let project = Project::new(&[
        ("model/Users.zy", MODEL_USERS),
        ("logic/Users.zy", LOGIC_USERS),
        ("main.zy", "$n = new Users()->age();\n"),
    ]);

    let found = project.resolve("main.zy", "age", 0);
    assert_eq!(
        files(&found, project.service.root()),
        vec!["logic/Users.zy", "model/Users.zy"]
    );
    let mut labels: Vec<_> = found.iter().map(|l| l.label.as_str()).collect();
    labels.sort();
    assert_eq!(labels, vec!["Logic\\Users::age", "Model\\Users::age"]);
}

#[test]
fn property_access_never_resolves_to_function() {
    let source = "function name() {}\n$user = load();\necho $user->name;\n";
    let project = Project::new(&[("main.zy", source)]);

    let function_offset = source.find("name").unwrap();
    let found = project.resolve("main.zy", "name", 1);
    assert!(
        found.iter().all(|l| l.offset != function_offset),
        "property access resolved to the function: {found:?}"
    );
}

#[test]
fn property_access_uses_namespace_index() {
    let project = Project::new(&[
        ("model/Users.zy", MODEL_USERS),
        (
            "model/Report.zy",
            "namespace Model;\nfunction age() {}\n$u = new Users();\necho $u->age;\n",
        ),
    ]);

    let found = project.resolve("model/Report.zy", "age", 1);
    assert_eq!(found.len(), 1, "{found:?}");
    assert_eq!(found[0].label, "Model\\Users::$age");
    assert_eq!(found[0].offset, MODEL_USERS.find("$age").unwrap());
}

#[test]
fn alias_import_resolves_to_imported_class() {
    let project = Project::new(&[
        ("model/Users.zy", MODEL_USERS),
        ("logic/Users.zy", LOGIC_USERS),
        (
            "main.zy",
            "use Logic\\Users as LogicUsers;\n$u = new LogicUsers();\n",
        ),
    ]);

    let found = project.resolve("main.zy", "LogicUsers", 1);
    assert_eq!(found.len(), 1, "{found:?}");
    assert_eq!(found[0].label, "Logic\\Users");
    assert!(found[0].path.ends_with("logic/Users.zy"));
}

#[test]
fn short_import_prefers_imported_but_keeps_ambiguity() {
    let project = Project::new(&[
        ("model/Users.zy", MODEL_USERS),
        ("logic/Users.zy", LOGIC_USERS),
        ("main.zy", "use Model\\Users;\n$u = new Users();\n"),
    ]);

    let found = project.resolve("main.zy", "Users", 1);
    assert_eq!(found.len(), 2, "{found:?}");
    assert_eq!(found[0].label, "Model\\Users");
    assert_eq!(found[1].label, "Logic\\Users");
}

#[test]
fn cross_file_results_exclude_current_file() {
    let project = Project::new(&[
        ("a.zy", "function shared() {}\n"),
        ("b.zy", "function other() {}\nshared();\n"),
    ]);

    let found = project.resolve("b.zy", "shared", 0);
    assert_eq!(files(&found, project.service.root()), vec!["a.zy"]);
}

#[test]
fn deleted_definition_disappears() {
    let project = Project::new(&[
        ("lib/helpers.zy", "function helper() {}\n"),
        ("main.zy", "helper();\n"),
    ]);
    assert_eq!(project.resolve("main.zy", "helper", 0).len(), 1);

    fs::remove_file(project.dir.path().join("lib/helpers.zy")).unwrap();
    let found = project.resolve("main.zy", "helper", 0);
    assert!(
        found.iter().all(|l| !l.path.ends_with("lib/helpers.zy")),
        "stale definition returned: {found:?}"
    );
}

#[test]
fn this_method_call_stays_in_class() {
    let source = "namespace App;\nclass Cart {\n  function total() {}\n  function show() { return $this->total(); }\n}\n";
    let project = Project::new(&[
        ("app/Cart.zy", source),
        ("app/Other.zy", "namespace App;\nclass Other {\n  function total() {}\n}\n"),
    ]);

    let found = project.resolve("app/Cart.zy", "total", 1);
    assert_eq!(found[0].label, "App\\Cart::total");
    assert_eq!(found[0].offset, source.find("total").unwrap());
}

#[test]
fn this_property_resolves_to_initialized_declaration() {
    let source = "namespace App;\nclass Service {\n  private $repo = new Repo();\n  function run() { return $this->repo; }\n}\n";
    let project = Project::new(&[("app/Service.zy", source)]);

    let found = project.resolve("app/Service.zy", "repo", 1);
    assert_eq!(found.len(), 1, "{found:?}");
    assert_eq!(found[0].label, "App\\Service::$repo");
    assert_eq!(found[0].offset, source.find("$repo").unwrap());
}

#[test]
fn import_matches_class_that_inherits_directory_namespace() {
    let project = Project::new(&[
        ("model/Users.zy", MODEL_USERS),
        ("model/Orders.zy", "class Orders {\n  function total() {}\n}\n"),
        ("logic/Orders.zy", "namespace Logic;\nclass Orders {}\n"),
        ("main.zy", "use Model\\Orders;\n$o = new Orders();\n"),
    ]);

    let found = project.resolve("main.zy", "Orders", 1);
    assert_eq!(found[0].label, "Model\\Orders", "{found:?}");
    assert!(found[0].path.ends_with("model/Orders.zy"));
}
