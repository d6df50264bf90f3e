//
// symbols/fallback.rs
//
// Pattern-based symbol extraction, used when the scope parser finds nothing
//

use std::sync::OnceLock;

use regex::Regex;

use super::{qualify, SymbolEntry, SymbolKind};

struct FallbackPatterns {
    function_def: Regex,
    class_def: Regex,
    namespace_decl: Regex,
    variable: Regex,
}

fn patterns() -> &'static FallbackPatterns {
    static PATTERNS: OnceLock<FallbackPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FallbackPatterns {
        function_def: Regex::new(r"function\s+(\w+)\s*\(").unwrap(),
        class_def: Regex::new(r"class\s+(\w+)\s*\{").unwrap(),
        namespace_decl: Regex::new(r"(?i)\bnamespace\s+([A-Za-z_]\w*(?:\\[A-Za-z_]\w*)*)\s*;?")
            .unwrap(),
        variable: Regex::new(r"\$([A-Za-z_]\w*)").unwrap(),
    })
}

/// First `namespace X\Y` declaration in `text`, matched case-insensitively.
pub fn namespace_of(text: &str) -> Option<String> {
    patterns()
        .namespace_decl
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

struct ClassSpan<'a> {
    name: &'a str,
    name_offset: usize,
    open: usize,
    close: Option<usize>,
}

impl ClassSpan<'_> {
    fn contains(&self, offset: usize) -> bool {
        self.open < offset && self.close.map_or(true, |close| offset < close)
    }
}

struct FunctionMatch<'a> {
    name: &'a str,
    name_offset: usize,
    start: usize,
    end: usize,
}

/// Offset of the `}` matching the `{` at `open`, if any.
pub(crate) fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.as_bytes().iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract symbols with plain pattern matching. Not scope-aware: class
/// bodies come from brace counting, and a function is a method when it sits
/// inside one.
pub fn extract(text: &str) -> Vec<SymbolEntry> {
    let p = patterns();
    let namespace = namespace_of(text);
    let ns = namespace.as_deref();

    let classes: Vec<ClassSpan<'_>> = p
        .class_def
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            let open = whole.end() - 1;
            Some(ClassSpan {
                name: name.as_str(),
                name_offset: name.start(),
                open,
                close: matching_brace(text, open),
            })
        })
        .collect();

    let functions: Vec<FunctionMatch<'_>> = p
        .function_def
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            Some(FunctionMatch {
                name: name.as_str(),
                name_offset: name.start(),
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect();

    let mut out = Vec::new();

    for class in &classes {
        out.push(SymbolEntry {
            kind: SymbolKind::Class,
            name: class.name.to_string(),
            offset: class.name_offset,
            namespace: namespace.clone(),
            fqn: qualify(ns, None, class.name),
        });
    }

    for function in &functions {
        let owner = innermost_class(&classes, function.name_offset);
        let (kind, fqn) = match owner {
            Some(class) => (SymbolKind::Method, qualify(ns, Some(class.name), function.name)),
            None => (SymbolKind::Function, qualify(ns, None, function.name)),
        };
        out.push(SymbolEntry {
            kind,
            name: function.name.to_string(),
            offset: function.name_offset,
            namespace: namespace.clone(),
            fqn,
        });
    }

    let mut seen: Vec<(usize, &str)> = Vec::new();
    for m in p.variable.find_iter(text) {
        let Some(class) = innermost_class(&classes, m.start()) else {
            continue;
        };
        if inside_method(text, class, m.start(), &functions) {
            continue;
        }
        let key = (class.open, m.as_str());
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(SymbolEntry {
            kind: SymbolKind::Property,
            name: m.as_str().to_string(),
            offset: m.start(),
            namespace: namespace.clone(),
            fqn: qualify(ns, Some(class.name), m.as_str()),
        });
    }

    out
}

fn innermost_class<'c, 'a>(classes: &'c [ClassSpan<'a>], offset: usize) -> Option<&'c ClassSpan<'a>> {
    classes
        .iter()
        .filter(|class| class.contains(offset))
        .max_by_key(|class| class.open)
}

/// Whether `offset` falls inside the body of the nearest method declared
/// before it in `class`.
fn inside_method(text: &str, class: &ClassSpan<'_>, offset: usize, functions: &[FunctionMatch<'_>]) -> bool {
    let Some(method) = functions
        .iter()
        .filter(|f| f.start > class.open && f.start < offset)
        .last()
    else {
        return false;
    };
    let Some(brace) = text[method.end..].find('{').map(|i| method.end + i) else {
        return false;
    };
    if brace > offset {
        // Still in the signature, e.g. a parameter.
        return true;
    }
    let mut depth = 0i64;
    for b in &text.as_bytes()[brace..offset] {
        match b {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}
