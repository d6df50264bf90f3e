//! Deterministic fixture workspace generator for benchmarks and tests.
//!
//! Generates synthetic Zy projects spread over several namespace
//! directories. Every file declares one class with properties and methods,
//! some free functions, and an import of the previous file's class. Method
//! names repeat across classes, so lookups see realistic ambiguity.
//!
//! No randomness is involved; the same configuration always yields the
//! same bytes.

use std::fmt::Write;
use std::path::Path;
use tempfile::TempDir;

/// Configuration for generating a fixture workspace.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub file_count: usize,
    /// Number of `ns_N` directories, each with its own namespace
    pub namespace_count: usize,
    pub methods_per_class: usize,
    pub properties_per_class: usize,
    pub functions_per_file: usize,
    pub extra_lines_per_file: usize,
}

impl FixtureConfig {
    /// Small workspace: 10 files in 2 namespaces.
    pub fn small() -> Self {
        Self {
            file_count: 10,
            namespace_count: 2,
            methods_per_class: 5,
            properties_per_class: 2,
            functions_per_file: 2,
            extra_lines_per_file: 5,
        }
    }

    /// Medium workspace: 50 files in 5 namespaces.
    pub fn medium() -> Self {
        Self {
            file_count: 50,
            namespace_count: 5,
            methods_per_class: 10,
            properties_per_class: 4,
            functions_per_file: 4,
            extra_lines_per_file: 10,
        }
    }

    /// Large workspace: 300 files in 12 namespaces.
    pub fn large() -> Self {
        Self {
            file_count: 300,
            namespace_count: 12,
            methods_per_class: 20,
            properties_per_class: 6,
            functions_per_file: 6,
            extra_lines_per_file: 20,
        }
    }

    /// Symbols the generator declares in total.
    pub fn expected_symbols(&self) -> usize {
        self.file_count * (1 + self.methods_per_class + self.properties_per_class + self.functions_per_file)
    }
}

fn namespace_of(index: usize, config: &FixtureConfig) -> usize {
    index % config.namespace_count.max(1)
}

/// Project-relative path of file `index`.
pub fn fixture_file_path(index: usize, config: &FixtureConfig) -> String {
    format!("ns_{}/file_{}.zy", namespace_of(index, config), index)
}

/// Generate the content of a single file deterministically.
pub fn generate_zy_file_content(index: usize, config: &FixtureConfig) -> String {
    let mut content = String::new();
    writeln!(content, "namespace Ns{};", namespace_of(index, config)).unwrap();
    content.push('\n');

    let previous = index.checked_sub(1);
    if let Some(prev) = previous {
        writeln!(content, "use Ns{}\\Class{};", namespace_of(prev, config), prev).unwrap();
        content.push('\n');
    }

    writeln!(content, "class Class{} {{", index).unwrap();
    for prop in 0..config.properties_per_class {
        writeln!(content, "    public $prop_{};", prop).unwrap();
    }
    for method in 0..config.methods_per_class {
        content.push('\n');
        writeln!(content, "    public function method_{}($x) {{", method).unwrap();
        if let Some(prev) = previous {
            writeln!(content, "        $other = new Class{}();", prev).unwrap();
            writeln!(content, "        $other->method_{}($x);", method).unwrap();
        }
        writeln!(content, "        if ($x > {}) {{", method).unwrap();
        writeln!(content, "            return $this->prop_0;").unwrap();
        writeln!(content, "        }}").unwrap();
        writeln!(content, "        return $x + {};", method + 1).unwrap();
        writeln!(content, "    }}").unwrap();
    }
    writeln!(content, "}}").unwrap();

    for func in 0..config.functions_per_file {
        content.push('\n');
        writeln!(content, "function func_{}_{}($a) {{", index, func).unwrap();
        writeln!(content, "    return $a * {};", func + 1).unwrap();
        writeln!(content, "}}").unwrap();
    }

    if config.extra_lines_per_file > 0 {
        content.push('\n');
    }
    for line in 0..config.extra_lines_per_file {
        writeln!(content, "$var_{}_{} = {};", index, line, line + 1).unwrap();
    }

    content
}

/// Create a temporary fixture workspace from the given configuration.
///
/// The directory is cleaned up when the `TempDir` is dropped.
pub fn create_fixture_workspace(config: &FixtureConfig) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory for fixture workspace");
    write_fixture_workspace(temp_dir.path(), config);
    temp_dir
}

/// Write fixture files into an existing directory.
pub fn write_fixture_workspace(dir: &Path, config: &FixtureConfig) {
    for i in 0..config.file_count {
        let rel = fixture_file_path(i, config);
        let path = dir.join(&rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("Failed to create {}: {}", parent.display(), e));
        }
        std::fs::write(&path, generate_zy_file_content(i, config))
            .unwrap_or_else(|e| panic!("Failed to write fixture file {}: {}", rel, e));
    }
}
