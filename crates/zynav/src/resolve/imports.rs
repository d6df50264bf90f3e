//
// resolve/imports.rs
//
// `use A\B [as C];` declarations
//

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Imported name without a leading `\`
    pub fqn: String,
    pub alias: Option<String>,
}

impl Import {
    /// Last segment of the imported name.
    pub fn class_name(&self) -> &str {
        self.fqn.rsplit('\\').next().unwrap_or(&self.fqn)
    }

    /// Namespace segments joined with `/`, usable as a path hint.
    pub fn namespace_path(&self) -> Option<String> {
        let (ns, _) = self.fqn.rsplit_once('\\')?;
        Some(ns.replace('\\', "/"))
    }

    pub fn is_aliased(&self) -> bool {
        self.alias.is_some()
    }
}

fn use_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*use\s+\\?([A-Za-z_][\w\\]*)(?:\s+as\s+([A-Za-z_]\w*))?\s*;?").unwrap()
    })
}

/// Local names brought in by a file's imports, in declaration order.
/// A later import of the same local name replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct ImportMap {
    entries: IndexMap<String, Import>,
}

impl ImportMap {
    pub fn parse(text: &str) -> Self {
        let mut entries = IndexMap::new();
        for caps in use_pattern().captures_iter(text) {
            let fqn = caps[1].trim_end_matches('\\').to_string();
            if fqn.is_empty() {
                continue;
            }
            let import = Import {
                fqn,
                alias: caps.get(2).map(|m| m.as_str().to_string()),
            };
            let local = match &import.alias {
                Some(alias) => alias.clone(),
                None => import.class_name().to_string(),
            };
            log::trace!("import {local} -> {}", import.fqn);
            entries.insert(local, import);
        }
        Self { entries }
    }

    pub fn get(&self, local: &str) -> Option<&Import> {
        self.entries.get(local)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Import)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
