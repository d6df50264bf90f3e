//
// symbols/mod.rs
//
// Symbol extraction from the scope tree, with a regex fallback
//

pub mod fallback;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::syntax::keywords::is_declaration_keyword;
use crate::syntax::{self, ScopeId, ScopeKind, ScopeTree, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Method,
    Function,
    Property,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Function => "function",
            SymbolKind::Property => "property",
        }
    }
}

/// A named declaration found in one parse of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Bare name; properties keep their `$` sigil
    pub name: String,
    pub kind: SymbolKind,
    /// Byte offset of the name token
    pub offset: usize,
    pub namespace: Option<String>,
    pub fqn: String,
    /// Scope that produced the symbol, valid for the tree of the same parse
    pub scope: ScopeId,
}

/// Persisted form of a symbol, as stored in index snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub kind: SymbolKind,
    pub name: String,
    pub offset: usize,
    pub namespace: Option<String>,
    pub fqn: String,
}

impl From<&Symbol> for SymbolEntry {
    fn from(symbol: &Symbol) -> Self {
        Self {
            kind: symbol.kind,
            name: symbol.name.clone(),
            offset: symbol.offset,
            namespace: symbol.namespace.clone(),
            fqn: symbol.fqn.clone(),
        }
    }
}

/// Build a fully-qualified name: `ns\name` or `ns\Class::member`, without
/// the `ns\` prefix when there is no namespace.
pub fn qualify(namespace: Option<&str>, class: Option<&str>, name: &str) -> String {
    let mut fqn = String::new();
    if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
        fqn.push_str(ns);
        fqn.push('\\');
    }
    if let Some(class) = class {
        fqn.push_str(class);
        fqn.push_str("::");
    }
    fqn.push_str(name);
    fqn
}

/// Scope tree and symbols of one file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub tree: ScopeTree,
    pub symbols: Vec<Symbol>,
    /// Name of the first namespace declared in the file
    pub namespace: Option<String>,
}

/// Parse `text` and extract its symbols, keeping the scope tree around.
pub fn parse_file(text: &str) -> ParsedFile {
    let tree = syntax::parse(text);
    let namespace = file_namespace(&tree);
    let symbols = match symbols_from_tree(text, &tree, namespace.as_deref()) {
        Ok(symbols) => symbols,
        Err(e) => {
            log::debug!("scope-based extraction failed: {e:#}");
            Vec::new()
        }
    };
    ParsedFile {
        tree,
        symbols,
        namespace,
    }
}

/// Scope-based extraction. Returns an empty list on internal failure.
pub fn extract_symbols(text: &str) -> Vec<Symbol> {
    parse_file(text).symbols
}

fn file_namespace(tree: &ScopeTree) -> Option<String> {
    tree.first_of_kind(ScopeKind::Namespace)
        .map(|id| tree.get(id).name.clone())
        .filter(|name| !name.is_empty())
}

fn try_extract(text: &str) -> anyhow::Result<Vec<Symbol>> {
    let tree = syntax::parse(text);
    let namespace = file_namespace(&tree);
    symbols_from_tree(text, &tree, namespace.as_deref())
}

fn symbols_from_tree(
    text: &str,
    tree: &ScopeTree,
    namespace: Option<&str>,
) -> anyhow::Result<Vec<Symbol>> {
    let mut symbols = Vec::new();
    let owned_ns = namespace.map(str::to_string);

    for (id, scope) in tree.iter() {
        match scope.kind {
            ScopeKind::Global | ScopeKind::Namespace => {}
            ScopeKind::Class => {
                symbols.push(Symbol {
                    name: scope.name.clone(),
                    kind: SymbolKind::Class,
                    offset: scope.name_offset,
                    namespace: owned_ns.clone(),
                    fqn: qualify(namespace, None, &scope.name),
                    scope: id,
                });
                scan_properties(text, tree, id, namespace, &mut symbols)?;
            }
            ScopeKind::Method => {
                let class = scope
                    .parent
                    .map(|p| tree.get(p).name.as_str())
                    .context("method scope without a class parent")?;
                symbols.push(Symbol {
                    name: scope.name.clone(),
                    kind: SymbolKind::Method,
                    offset: scope.name_offset,
                    namespace: owned_ns.clone(),
                    fqn: qualify(namespace, Some(class), &scope.name),
                    scope: id,
                });
            }
            ScopeKind::Function => {
                symbols.push(Symbol {
                    name: scope.name.clone(),
                    kind: SymbolKind::Function,
                    offset: scope.name_offset,
                    namespace: owned_ns.clone(),
                    fqn: qualify(namespace, None, &scope.name),
                    scope: id,
                });
            }
        }
    }

    Ok(symbols)
}

/// Scan the part of a class body before its first method for
/// `$name ... ;` property declarations.
fn scan_properties(
    text: &str,
    tree: &ScopeTree,
    class_id: ScopeId,
    namespace: Option<&str>,
    out: &mut Vec<Symbol>,
) -> anyhow::Result<()> {
    let class = tree.get(class_id);
    let Some(body_start) = class.body_start else {
        return Ok(());
    };
    let region_start = body_start + 1;
    let first_method = class
        .children
        .iter()
        .map(|&child| tree.get(child))
        .find(|child| child.kind == ScopeKind::Method)
        .map(|method| method.start);
    // `end` sits just past the closing brace.
    let region_end = first_method.unwrap_or_else(|| match class.end {
        Some(end) => end.saturating_sub(1),
        None => text.len(),
    });
    if region_end <= region_start {
        return Ok(());
    }

    let region = text
        .get(region_start..region_end)
        .with_context(|| format!("class body {region_start}..{region_end} out of range"))?;
    let tokens = syntax::tokenize(region);
    let mut seen: Vec<&str> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Variable || seen.contains(&token.text) {
            continue;
        }
        for next in &tokens[i + 1..] {
            match next.kind {
                TokenKind::Semicolon => {
                    seen.push(token.text);
                    out.push(Symbol {
                        name: token.text.to_string(),
                        kind: SymbolKind::Property,
                        offset: region_start + token.start,
                        namespace: namespace.map(str::to_string),
                        fqn: qualify(namespace, Some(&class.name), token.text),
                        scope: class_id,
                    });
                    break;
                }
                TokenKind::BraceOpen | TokenKind::BraceClose => break,
                TokenKind::Keyword if is_declaration_keyword(next.text) => break,
                _ => {}
            }
        }
    }

    Ok(())
}

// ============================================================================
// Two-stage extraction for indexing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Scope-based parser
    Scope,
    /// Pattern-based legacy extractor
    Regex,
}

#[derive(Debug, Clone)]
pub struct ExtractedSymbols {
    pub symbols: Vec<SymbolEntry>,
    pub strategy: ExtractionStrategy,
}

/// Whether the primary extraction result should be replaced by the regex
/// fallback: it failed, or it found nothing.
pub fn needs_fallback(primary: &anyhow::Result<Vec<Symbol>>) -> bool {
    match primary {
        Ok(symbols) => symbols.is_empty(),
        Err(_) => true,
    }
}

/// Extract index entries for `text`, falling back to pattern matching when
/// the scope parser yields nothing.
pub fn index_symbols(text: &str) -> ExtractedSymbols {
    let primary = try_extract(text);
    if needs_fallback(&primary) {
        if let Err(e) = &primary {
            log::debug!("falling back to regex extraction: {e:#}");
        }
        return ExtractedSymbols {
            symbols: fallback::extract(text),
            strategy: ExtractionStrategy::Regex,
        };
    }
    let symbols = primary.map(|s| s.iter().map(SymbolEntry::from).collect()).unwrap_or_default();
    ExtractedSymbols {
        symbols,
        strategy: ExtractionStrategy::Scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(symbols: &[Symbol]) -> Vec<(SymbolKind, &str, &str)> {
        symbols
            .iter()
            .map(|s| (s.kind, s.name.as_str(), s.fqn.as_str()))
            .collect()
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify(Some("Model"), None, "Users"), "Model\\Users");
        assert_eq!(qualify(Some("Model"), Some("Users"), "$age"), "Model\\Users::$age");
        assert_eq!(qualify(None, Some("Users"), "age"), "Users::age");
        assert_eq!(qualify(Some(""), None, "f"), "f");
    }

    #[test]
    fn test_class_methods_and_properties() {
        let text = "namespace Model;\n\nclass Users {\n    public $name;\n    private $age = 3;\n    function age() { return $this->age; }\n    $late;\n}\n\nfunction helper() {}\n";
        let symbols = extract_symbols(text);
        assert_eq!(
            names(&symbols),
            vec![
                (SymbolKind::Class, "Users", "Model\\Users"),
                (SymbolKind::Property, "$name", "Model\\Users::$name"),
                (SymbolKind::Property, "$age", "Model\\Users::$age"),
                (SymbolKind::Method, "age", "Model\\Users::age"),
                (SymbolKind::Function, "helper", "Model\\helper"),
            ]
        );
        assert_eq!(symbols[0].offset, text.find("Users").unwrap());
        assert_eq!(symbols[1].offset, text.find("$name").unwrap());
        assert_eq!(symbols[3].offset, text.find("age()").unwrap());
        assert!(symbols.iter().all(|s| s.namespace.as_deref() == Some("Model")));
    }

    #[test]
    fn test_property_disqualified_by_brace_or_declaration_keyword() {
        let text = "class A {\n $ok;\n $f = static;\n $cb = function() {};\n}";
        let props: Vec<_> = extract_symbols(text)
            .into_iter()
            .filter(|s| s.kind == SymbolKind::Property)
            .map(|s| s.name)
            .collect();
        assert_eq!(props, vec!["$ok".to_string()]);
    }

    #[test]
    fn test_initialized_property_with_new_is_declared() {
        let text = "namespace App;\nclass Service {\n  private $repo = new Repo();\n  function run() { return $this->repo; }\n}";
        let props: Vec<_> = extract_symbols(text)
            .into_iter()
            .filter(|s| s.kind == SymbolKind::Property)
            .collect();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].fqn, "App\\Service::$repo");
        assert_eq!(props[0].offset, text.find("$repo").unwrap());
    }

    #[test]
    fn test_no_namespace() {
        let symbols = extract_symbols("class A { function run() {} }");
        assert_eq!(symbols[0].fqn, "A");
        assert_eq!(symbols[1].fqn, "A::run");
        assert_eq!(symbols[0].namespace, None);
    }

    #[test]
    fn test_first_namespace_wins() {
        let parsed = parse_file("namespace First;\nnamespace Second;\nclass A {}");
        assert_eq!(parsed.namespace.as_deref(), Some("First"));
        assert_eq!(parsed.symbols[0].fqn, "First\\A");
    }

    #[test]
    fn test_symbol_scope_points_into_tree() {
        let parsed = parse_file("class A { function m() {} }");
        let method = &parsed.symbols[1];
        assert_eq!(parsed.tree.get(method.scope).kind, ScopeKind::Method);
    }

    #[test]
    fn test_needs_fallback_predicate() {
        assert!(needs_fallback(&Ok(Vec::new())));
        assert!(needs_fallback(&Err(anyhow::anyhow!("boom"))));
        let one = extract_symbols("function f() {}");
        assert!(!needs_fallback(&Ok(one)));
    }

    #[test]
    fn test_index_symbols_uses_scope_parser() {
        let extracted = index_symbols("namespace N;\nfunction f() {}");
        assert_eq!(extracted.strategy, ExtractionStrategy::Scope);
        assert_eq!(extracted.symbols[0].fqn, "N\\f");
    }

    #[test]
    fn test_index_symbols_falls_back_when_empty() {
        // A string-wrapped keyword hides the class from the tokenizer-based
        // pass but not from pattern matching.
        let text = "$tpl = \"class Hidden{ }\";";
        let extracted = index_symbols(text);
        assert_eq!(extracted.strategy, ExtractionStrategy::Regex);
        assert_eq!(extracted.symbols[0].name, "Hidden");
    }

    #[test]
    fn test_symbol_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SymbolKind::Property).unwrap(), "\"property\"");
    }
}
