//
// resolve/mod.rs
//
// Go-to-declaration: cursor position to candidate definition sites
//

pub mod context;
pub mod imports;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::index::{IndexService, SymbolLocation};
use crate::perf::TimingGuard;
use crate::symbols::{parse_file, ParsedFile, Symbol, SymbolKind};
use crate::syntax::ScopeId;

use context::WordSpan;
use imports::ImportMap;

/// A resolution request from the editor.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Current buffer content, possibly unsaved
    pub text: &'a str,
    /// Cursor byte offset into `text`
    pub offset: usize,
    /// Path of the buffer, when it has one
    pub path: Option<&'a Path>,
}

/// A candidate definition site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub path: PathBuf,
    pub offset: usize,
    /// Display name, normally the fully-qualified name
    pub label: String,
}

impl Location {
    /// 1-based line of `offset` within `text`, the content of `path`.
    pub fn line(&self, text: &str) -> usize {
        let end = self.offset.min(text.len());
        text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
    }
}

/// `fqn`, else `namespace\word`, else `word`.
fn label(fqn: Option<&str>, namespace: Option<&str>, word: &str) -> String {
    if let Some(fqn) = fqn.filter(|f| !f.is_empty()) {
        return fqn.to_string();
    }
    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{ns}\\{word}"),
        None => word.to_string(),
    }
}

/// Remove repeated `(path, offset)` pairs, keeping the first.
fn dedup(mut locations: Vec<Location>) -> Vec<Location> {
    let mut seen = HashSet::new();
    locations.retain(|loc| seen.insert((loc.path.clone(), loc.offset)));
    locations
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Method,
    Property,
}

/// Per-request state shared by the resolution steps.
struct Query<'a> {
    text: &'a str,
    span: WordSpan,
    word: &'a str,
    parsed: ParsedFile,
    /// Project-relative path of the buffer, if it lies in the project
    rel_path: Option<String>,
    buffer_path: PathBuf,
    property: bool,
    call: bool,
}

impl Query<'_> {
    fn is_current_file(&self, rel_path: &str) -> bool {
        self.rel_path.as_deref() == Some(rel_path)
    }

    /// Whether an index hit is the clicked word itself.
    fn is_self(&self, loc: &SymbolLocation) -> bool {
        self.is_current_file(&loc.file_path) && self.span.contains(loc.offset)
    }

    fn buffer_location(&self, offset: usize) -> Location {
        let fqn = self
            .parsed
            .symbols
            .iter()
            .find(|s| s.offset == offset)
            .map(|s| s.fqn.as_str());
        Location {
            path: self.buffer_path.clone(),
            offset,
            label: label(fqn, self.parsed.namespace.as_deref(), self.word),
        }
    }
}

/// Resolves declarations against one project's index.
pub struct ResolutionEngine<'a> {
    service: &'a IndexService,
}

impl<'a> ResolutionEngine<'a> {
    pub fn new(service: &'a IndexService) -> Self {
        Self { service }
    }

    /// Candidate declarations for the word at the cursor. Ambiguous names
    /// yield every match; failures yield an empty list.
    pub fn resolve(&self, request: &Request<'_>) -> Vec<Location> {
        let _guard = TimingGuard::with_budget("resolve", 100);
        match self.try_resolve(request) {
            Ok(locations) => locations,
            Err(e) => {
                log::warn!("resolution at offset {} failed: {e:#}", request.offset);
                Vec::new()
            }
        }
    }

    fn try_resolve(&self, request: &Request<'_>) -> anyhow::Result<Vec<Location>> {
        let text = request.text;
        let Some(span) = context::word_span(text, request.offset) else {
            return Ok(Vec::new());
        };
        let query = self.query(request, span);
        log::debug!(
            "resolving '{}' at {}..{} (property: {}, call: {})",
            query.word,
            span.start,
            span.end,
            query.property,
            query.call
        );

        if query.property {
            let found = self.property_definitions(&query);
            if !found.is_empty() {
                return Ok(finish("property", found));
            }
        } else {
            let found = self.local_definitions(&query)?;
            if !found.is_empty() {
                return Ok(finish("local", found));
            }
        }

        let found = self.member_definitions(&query)?;
        if !found.is_empty() {
            return Ok(finish("member", found));
        }

        if !query.property {
            let found = self.imported_definitions(&query);
            if !found.is_empty() {
                return Ok(finish("import", found));
            }
            let found = self.cross_file_definitions(&query);
            if !found.is_empty() {
                return Ok(finish("cross-file", found));
            }
        }

        Ok(finish("occurrence", self.occurrences(&query)))
    }

    fn query<'t>(&self, request: &Request<'t>, span: WordSpan) -> Query<'t> {
        let rel_path = request.path.and_then(|p| self.service.relative_path(p));
        let buffer_path = match (&rel_path, request.path) {
            (Some(rel), _) => self.service.absolute_path(rel),
            (None, Some(path)) => path.to_path_buf(),
            (None, None) => PathBuf::new(),
        };
        Query {
            text: request.text,
            span,
            word: span.text(request.text),
            parsed: parse_file(request.text),
            rel_path,
            buffer_path,
            property: context::is_property_access(request.text, span),
            call: context::followed_by_call(request.text, span),
        }
    }

    fn indexed(&self, loc: &SymbolLocation, word: &str) -> Location {
        Location {
            path: self.service.absolute_path(&loc.file_path),
            offset: loc.offset,
            label: label(loc.fqn.as_deref(), loc.namespace.as_deref(), word),
        }
    }

    /// Index hits outside the current buffer.
    fn other_files(&self, name: &str, hint: Option<&str>, query: &Query<'_>) -> Vec<Location> {
        self.service
            .find_definitions(name, hint)
            .iter()
            .filter(|loc| !query.is_current_file(&loc.file_path))
            .map(|loc| self.indexed(loc, name))
            .collect()
    }

    /// Property declarations from the namespace snapshot, narrowed to the
    /// receiver's class when it can be traced.
    fn property_definitions(&self, query: &Query<'_>) -> Vec<Location> {
        let Some(namespace) = query.parsed.namespace.as_deref() else {
            return Vec::new();
        };
        let Some(index) = self.service.namespace_index(namespace) else {
            return Vec::new();
        };
        let class = match context::owning_class(query.text, query.span, &query.parsed.tree) {
            Ok(class) => class,
            Err(e) => {
                log::debug!("cannot trace property receiver: {e:#}");
                None
            }
        };
        let name = format!("${}", query.word);
        let suffix = class.as_ref().map(|c| format!("{c}::{name}"));

        index
            .symbols()
            .filter(|(_, s)| s.kind == SymbolKind::Property && s.name == name)
            .filter(|(_, s)| match &suffix {
                Some(suffix) => s.fqn == *suffix || s.fqn.ends_with(&format!("\\{suffix}")),
                None => true,
            })
            .filter(|(path, s)| !(query.is_current_file(path) && query.span.contains(s.offset)))
            .map(|(path, s)| Location {
                path: self.service.absolute_path(path),
                offset: s.offset,
                label: label(Some(s.fqn.as_str()), s.namespace.as_deref(), &name),
            })
            .collect()
    }

    /// Definitions in the current file: indexed first, then a scan of the
    /// buffer for `function word(` and `class word {`.
    fn local_definitions(&self, query: &Query<'_>) -> anyhow::Result<Vec<Location>> {
        if let Some(rel) = &query.rel_path {
            let found: Vec<Location> = self
                .service
                .definitions_in_file(query.word, rel)
                .iter()
                .filter(|loc| !query.is_self(loc))
                .map(|loc| self.indexed(loc, query.word))
                .collect();
            if !found.is_empty() {
                return Ok(found);
            }
        }

        let word = regex::escape(query.word);
        for pattern in [
            format!(r"\bfunction\s+({word})\s*\("),
            format!(r"\bclass\s+({word})\s*\{{"),
        ] {
            let found: Vec<Location> = Regex::new(&pattern)?
                .captures_iter(query.text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.start())
                .filter(|&offset| !query.span.contains(offset))
                .map(|offset| query.buffer_location(offset))
                .collect();
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    /// `new C()->word` and `$v->word`: the member inside class `C`, plus
    /// same-named methods elsewhere so cross-namespace ambiguity survives.
    fn member_definitions(&self, query: &Query<'_>) -> anyhow::Result<Vec<Location>> {
        let Some(class) = context::owning_class(query.text, query.span, &query.parsed.tree)? else {
            return Ok(Vec::new());
        };
        let kind = if query.call {
            MemberKind::Method
        } else {
            MemberKind::Property
        };
        log::trace!("member access {class}->{} ({kind:?})", query.word);

        let mut found: Vec<Location> = match query.parsed.tree.find_class(&class) {
            Some(class_id) => members(&query.parsed, class_id, query.word, kind)
                .map(|s| Location {
                    path: query.buffer_path.clone(),
                    offset: s.offset,
                    label: s.fqn.clone(),
                })
                .collect(),
            None => Vec::new(),
        };

        if found.is_empty() {
            found = self.members_in_other_file(&class, query, kind);
        }

        if kind == MemberKind::Method {
            found.extend(
                self.service
                    .find_definitions(query.word, None)
                    .iter()
                    .filter(|loc| loc.kind == Some(SymbolKind::Method))
                    .filter(|loc| !query.is_current_file(&loc.file_path))
                    .map(|loc| self.indexed(loc, query.word)),
            );
        }
        Ok(found)
    }

    /// Members of `class` in the first other file that defines it.
    fn members_in_other_file(&self, class: &str, query: &Query<'_>, kind: MemberKind) -> Vec<Location> {
        for loc in self.service.find_definitions(class, None) {
            if loc.kind != Some(SymbolKind::Class) || query.is_current_file(&loc.file_path) {
                continue;
            }
            let Some(source) = self.service.read_source(&loc.file_path) else {
                continue;
            };
            let parsed = parse_file(&source);
            let Some(class_id) = parsed.tree.find_class(class) else {
                continue;
            };
            let path = self.service.absolute_path(&loc.file_path);
            return members(&parsed, class_id, query.word, kind)
                .map(|s| Location {
                    path: path.clone(),
                    offset: s.offset,
                    label: s.fqn.clone(),
                })
                .collect();
        }
        Vec::new()
    }

    /// Names brought in by `use`. Definitions matching the imported FQN come
    /// first; a plain short-name import also keeps same-named classes from
    /// other namespaces.
    fn imported_definitions(&self, query: &Query<'_>) -> Vec<Location> {
        let imports = ImportMap::parse(query.text);
        let Some(import) = imports.get(query.word) else {
            return Vec::new();
        };
        let class_name = import.class_name();
        let hint = import.namespace_path();
        log::debug!("'{}' imported as {}", query.word, import.fqn);

        let (mut found, rest): (Vec<Location>, Vec<Location>) = self
            .other_files(class_name, hint.as_deref(), query)
            .into_iter()
            .partition(|loc| loc.label == import.fqn);
        found.extend(rest);

        if !import.is_aliased() {
            found.extend(self.other_files(query.word, None, query));
        }
        found
    }

    fn cross_file_definitions(&self, query: &Query<'_>) -> Vec<Location> {
        self.other_files(query.word, None, query)
    }

    /// Every other occurrence of the word in the buffer. In a property
    /// context only occurrences that read as properties count.
    fn occurrences(&self, query: &Query<'_>) -> Vec<Location> {
        context::occurrences(query.text, query.word)
            .filter(|span| *span != query.span)
            .filter(|span| !query.property || context::looks_like_property(query.text, *span))
            .map(|span| query.buffer_location(span.start))
            .collect()
    }
}

fn finish(step: &str, locations: Vec<Location>) -> Vec<Location> {
    let locations = dedup(locations);
    log::debug!("resolved {} candidate(s) via {step}", locations.len());
    locations
}

/// Declarations of member `word` directly inside class `class_id`.
fn members<'p>(
    parsed: &'p ParsedFile,
    class_id: ScopeId,
    word: &'p str,
    kind: MemberKind,
) -> impl Iterator<Item = &'p Symbol> + 'p {
    parsed.symbols.iter().filter(move |s| match kind {
        MemberKind::Method => {
            s.kind == SymbolKind::Method && s.name == word && parsed.tree.get(s.scope).parent == Some(class_id)
        }
        MemberKind::Property => {
            s.kind == SymbolKind::Property
                && s.scope == class_id
                && s.name.strip_prefix('$') == Some(word)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn service(root: &Path) -> IndexService {
        let config = EngineConfig {
            throttle_ms: 0,
            ..EngineConfig::default()
        };
        IndexService::open(root, config).unwrap()
    }

    fn resolve_at(service: &IndexService, rel: &str, needle: &str, nth: usize) -> Vec<Location> {
        let path = service.root().join(rel);
        let text = fs::read_to_string(&path).unwrap();
        let offset = text.match_indices(needle).nth(nth).unwrap().0;
        ResolutionEngine::new(service).resolve(&Request {
            text: &text,
            offset,
            path: Some(&path),
        })
    }

    #[test]
    fn test_label_fallbacks() {
        assert_eq!(label(Some("Model\\Users"), Some("Model"), "Users"), "Model\\Users");
        assert_eq!(label(None, Some("Model"), "Users"), "Model\\Users");
        assert_eq!(label(Some(""), None, "Users"), "Users");
    }

    #[test]
    fn test_line_numbers() {
        let loc = Location {
            path: PathBuf::from("a.zy"),
            offset: 8,
            label: "x".into(),
        };
        assert_eq!(loc.line("line1\nline2\n"), 2);
        assert_eq!(loc.line("short"), 1);
    }

    #[test]
    fn test_local_function_definition() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.zy", "function helper() {}\nhelper();\n");
        let service = service(dir.path());

        let found = resolve_at(&service, "main.zy", "helper", 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, "function ".len());
        assert_eq!(found[0].label, "helper");
    }

    #[test]
    fn test_clicking_definition_skips_itself() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.zy", "function helper() {}\nhelper();\n");
        let service = service(dir.path());

        let found = resolve_at(&service, "main.zy", "helper", 0);
        assert!(found.iter().all(|loc| loc.offset != "function ".len()));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, "function helper() {}\n".len());
    }

    #[test]
    fn test_unsaved_buffer_definition() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.zy", "");
        let service = service(dir.path());
        let path = dir.path().join("main.zy");
        let text = "class Cart {}\n$c = new Cart();\n";
        let offset = text.rfind("Cart").unwrap();

        let found = ResolutionEngine::new(&service).resolve(&Request {
            text,
            offset,
            path: Some(&path),
        });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, "class ".len());
        assert_eq!(found[0].label, "Cart");
    }

    #[test]
    fn test_this_property_in_same_class() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "model/Users.zy",
            "namespace Model;\nclass Users {\n  public $age;\n  function show() { return $this->age; }\n}\n",
        );
        let service = service(dir.path());

        let found = resolve_at(&service, "model/Users.zy", "age", 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "Model\\Users::$age");
        assert_eq!(found[0].offset, "namespace Model;\nclass Users {\n  public ".len());
    }

    #[test]
    fn test_member_chain_through_variable() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "model/Users.zy",
            "namespace Model;\nclass Users {\n  function age() {}\n}\n",
        );
        write(dir.path(), "main.zy", "$u = new Users();\n$u->age();\n");
        let service = service(dir.path());

        let found = resolve_at(&service, "main.zy", "age", 0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "Model\\Users::age");
        assert!(found[0].path.ends_with("model/Users.zy"));
    }

    #[test]
    fn test_cross_file_excludes_current_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib/util.zy", "function shared() {}\n");
        write(dir.path(), "main.zy", "shared();\n");
        let service = service(dir.path());

        let found = resolve_at(&service, "main.zy", "shared", 0);
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("lib/util.zy"));
    }

    #[test]
    fn test_occurrence_fallback() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.zy", "$total = 1;\necho $total;\n");
        let service = service(dir.path());

        let found = resolve_at(&service, "main.zy", "total", 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].offset, 1);
    }

    #[test]
    fn test_no_word_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let found = ResolutionEngine::new(&service).resolve(&Request {
            text: "",
            offset: 0,
            path: None,
        });
        assert!(found.is_empty());
    }
}
