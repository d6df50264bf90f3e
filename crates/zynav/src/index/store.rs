//
// index/store.rs
//
// Persisted per-directory and per-namespace index snapshots
//

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::files::{self, mtime_millis, now_millis};
use crate::config::EngineConfig;
use crate::symbols::{index_symbols, SymbolEntry};

/// Snapshot format version. Files with any other version are ignored.
pub const FORMAT_VERSION: u32 = 1;

const INDEX_SUFFIX: &str = ".index.json";
const ROOT_INDEX: &str = "index.json";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub file_count: usize,
    pub symbol_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Project-relative path with `/` separators
    pub path: String,
    pub mtime: u64,
    pub size: u64,
    pub symbols: Vec<SymbolEntry>,
}

/// One persisted snapshot: the files of a directory, or of every directory
/// sharing a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirIndex {
    pub version: u32,
    pub dir: String,
    pub generated_at: u64,
    pub summary: IndexSummary,
    pub files: Vec<FileEntry>,
}

impl DirIndex {
    pub fn new(dir: impl Into<String>, files: Vec<FileEntry>) -> Self {
        let mut index = Self {
            version: FORMAT_VERSION,
            dir: dir.into(),
            generated_at: now_millis(),
            summary: IndexSummary {
                file_count: 0,
                symbol_count: 0,
            },
            files,
        };
        index.refresh_summary();
        index
    }

    fn refresh_summary(&mut self) {
        self.summary = IndexSummary {
            file_count: self.files.len(),
            symbol_count: self.files.iter().map(|f| f.symbols.len()).sum(),
        };
    }

    /// All symbols across the snapshot's files, paired with their file path.
    pub fn symbols(&self) -> impl Iterator<Item = (&str, &SymbolEntry)> + '_ {
        self.files
            .iter()
            .flat_map(|f| f.symbols.iter().map(move |s| (f.path.as_str(), s)))
    }
}

/// Storage key of a snapshot. A declared namespace takes priority over the
/// directory path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Namespace(String),
    Directory(String),
}

impl IndexKey {
    /// Deterministic file name: `ns_<namespace>.index.json`,
    /// `<dir>.index.json`, or `index.json` for the project root.
    pub fn file_name(&self) -> String {
        match self {
            IndexKey::Namespace(ns) => format!("ns_{}{INDEX_SUFFIX}", sanitize(ns)),
            IndexKey::Directory(dir) if dir.is_empty() => ROOT_INDEX.to_string(),
            IndexKey::Directory(dir) => format!("{}{INDEX_SUFFIX}", sanitize(dir)),
        }
    }
}

fn sanitize(key: &str) -> String {
    key.trim_matches(|c: char| c == '/' || c == '\\')
        .replace(['/', '\\'], "_")
}

/// Totals from a whole-project snapshot regeneration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub directories: usize,
    pub snapshots: usize,
    pub files: usize,
    pub symbols: usize,
    pub pruned: usize,
    pub cancelled: bool,
}

/// Reads and writes snapshots under `<root>/<cache_dir>`.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
    index_dir: PathBuf,
    config: EngineConfig,
}

impl IndexStore {
    pub fn new(root: &Path, config: &EngineConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            index_dir: root.join(&config.cache_dir),
            config: config.clone(),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn path_for(&self, key: &IndexKey) -> PathBuf {
        self.index_dir.join(key.file_name())
    }

    pub fn state_path(&self) -> PathBuf {
        self.index_dir.join(STATE_FILE)
    }

    fn ensure_index_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.index_dir)
            .with_context(|| format!("creating index directory {}", self.index_dir.display()))
    }

    /// Whether any snapshot file exists.
    pub fn has_snapshots(&self) -> bool {
        fs::read_dir(&self.index_dir)
            .map(|entries| entries.flatten().any(|e| is_snapshot_name(&e.file_name().to_string_lossy())))
            .unwrap_or(false)
    }

    /// Build the snapshot for the files directly inside `dir`.
    ///
    /// The key is the first namespace declared by any of the directory's
    /// files; symbols without a namespace of their own inherit it.
    pub fn build_dir_index(&self, dir: &Path, token: &CancellationToken) -> (IndexKey, DirIndex) {
        let rel_dir = files::relative_path(&self.root, dir).unwrap_or_default();
        let mut entries = Vec::new();

        for path in files::source_files_in(dir, &self.config) {
            if token.is_cancelled() {
                log::debug!("snapshot build for '{rel_dir}' cancelled");
                break;
            }
            match read_file_entry(&self.root, &path) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("skipping {}: {e:#}", path.display()),
            }
        }

        let dir_namespace = entries
            .iter()
            .flat_map(|f| f.symbols.iter())
            .find_map(|s| s.namespace.clone().filter(|ns| !ns.is_empty()));

        if let Some(ns) = &dir_namespace {
            for symbol in entries.iter_mut().flat_map(|f| f.symbols.iter_mut()) {
                if symbol.namespace.is_none() {
                    symbol.fqn = format!("{ns}\\{}", symbol.fqn);
                    symbol.namespace = Some(ns.clone());
                }
            }
        }

        let key = match dir_namespace {
            Some(ns) => IndexKey::Namespace(ns),
            None => IndexKey::Directory(rel_dir.clone()),
        };
        (key, DirIndex::new(rel_dir, entries))
    }

    /// Build and persist the snapshot for one directory. Returns the path written.
    pub fn write_dir_index(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let (key, index) = self.build_dir_index(dir, &CancellationToken::new());
        self.ensure_index_dir()?;
        let path = self.path_for(&key);
        write_json_atomic(&path, &index)?;
        log::debug!(
            "wrote {} ({} files, {} symbols)",
            path.display(),
            index.summary.file_count,
            index.summary.symbol_count
        );
        Ok(path)
    }

    /// Snapshot stored under the directory key for `dir`.
    pub fn read_dir_index(&self, dir: &Path) -> Option<DirIndex> {
        let rel = files::relative_path(&self.root, dir)?;
        self.read_key(&IndexKey::Directory(rel))
    }

    pub fn read_namespace_index(&self, namespace: &str) -> Option<DirIndex> {
        self.read_key(&IndexKey::Namespace(namespace.to_string()))
    }

    fn read_key(&self, key: &IndexKey) -> Option<DirIndex> {
        let index: DirIndex = read_json(&self.path_for(key))?;
        if index.version != FORMAT_VERSION {
            log::debug!("ignoring snapshot {} with version {}", key.file_name(), index.version);
            return None;
        }
        Some(index)
    }

    /// Regenerate every snapshot: one per directory holding source files,
    /// plus the project root. Directories that share a namespace are merged,
    /// and snapshot files not produced by this pass are removed.
    pub fn build_all_dir_indexes(&self, token: &CancellationToken) -> anyhow::Result<BuildSummary> {
        self.ensure_index_dir()?;
        let mut summary = BuildSummary::default();

        let mut dirs = vec![self.root.clone()];
        for entry in files::walk(&self.root, &self.config) {
            if token.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let Ok(entry) = entry else { continue };
            if entry.depth() > 0
                && entry.file_type().is_dir()
                && !files::source_files_in(entry.path(), &self.config).is_empty()
            {
                dirs.push(entry.into_path());
            }
        }

        let mut snapshots: IndexMap<IndexKey, DirIndex> = IndexMap::new();
        for dir in &dirs {
            if token.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let (key, index) = self.build_dir_index(dir, token);
            summary.directories += 1;
            match snapshots.get_mut(&key) {
                Some(existing) => {
                    existing.files.extend(index.files);
                    existing.refresh_summary();
                }
                None => {
                    snapshots.insert(key, index);
                }
            }
        }

        let mut written = Vec::with_capacity(snapshots.len());
        for (key, index) in &snapshots {
            let path = self.path_for(key);
            match write_json_atomic(&path, index) {
                Ok(()) => {
                    summary.snapshots += 1;
                    summary.files += index.summary.file_count;
                    summary.symbols += index.summary.symbol_count;
                    written.push(key.file_name());
                }
                Err(e) => log::warn!("failed to write snapshot {}: {e:#}", path.display()),
            }
        }

        if !summary.cancelled {
            summary.pruned = self.prune_except(&written);
        }

        log::debug!(
            "regenerated {} snapshots from {} directories ({} pruned)",
            summary.snapshots,
            summary.directories,
            summary.pruned
        );
        Ok(summary)
    }

    /// Remove snapshot files whose names are not in `keep`.
    fn prune_except(&self, keep: &[String]) -> usize {
        let Ok(entries) = fs::read_dir(&self.index_dir) else {
            return 0;
        };
        let mut pruned = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_snapshot_name(&name) || keep.contains(&name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => pruned += 1,
                Err(e) => log::warn!("failed to remove stale snapshot {name}: {e}"),
            }
        }
        pruned
    }

    pub fn save_state<T: Serialize>(&self, state: &T) -> anyhow::Result<()> {
        self.ensure_index_dir()?;
        write_json_atomic(&self.state_path(), state)
    }

    pub fn load_state<T: DeserializeOwned>(&self) -> Option<T> {
        read_json(&self.state_path())
    }
}

fn is_snapshot_name(name: &str) -> bool {
    name == ROOT_INDEX || name.ends_with(INDEX_SUFFIX)
}

/// Read and extract one source file into a snapshot entry.
pub fn read_file_entry(root: &Path, path: &Path) -> anyhow::Result<FileEntry> {
    let metadata = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let extracted = index_symbols(&text);
    log::trace!(
        "{}: {} symbols via {:?}",
        path.display(),
        extracted.symbols.len(),
        extracted.strategy
    );
    Ok(FileEntry {
        path: files::relative_path(root, path).unwrap_or_else(|| path.to_string_lossy().into_owned()),
        mtime: mtime_millis(&metadata),
        size: metadata.len(),
        symbols: extracted.symbols,
    })
}

/// Serialize to `<path>.tmp` and rename over `path`, so readers never see a
/// partially written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = (|| -> anyhow::Result<()> {
        let file = fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .with_context(|| format!("failed to serialize {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to move {} into place", path.display()))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Deserialize `path`. Missing files are a silent miss; malformed ones are
/// logged and also treated as a miss.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("cannot read {}: {e}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("ignoring malformed index file {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolKind;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn store(root: &Path) -> IndexStore {
        IndexStore::new(root, &EngineConfig::default())
    }

    #[test]
    fn test_key_file_names() {
        assert_eq!(IndexKey::Namespace("Model\\Sub".into()).file_name(), "ns_Model_Sub.index.json");
        assert_eq!(IndexKey::Directory("app/model".into()).file_name(), "app_model.index.json");
        assert_eq!(IndexKey::Directory(String::new()).file_name(), "index.json");
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "lib/a.zy", "function first() {}\nfunction second() {}");
        write(root, "lib/b.zy", "class B { public $x; function m() {} }");
        let store = store(root);

        let written = store.write_dir_index(&root.join("lib")).unwrap();
        assert!(written.ends_with("lib.index.json"));

        let (_, built) = store.build_dir_index(&root.join("lib"), &CancellationToken::new());
        let read = store.read_dir_index(&root.join("lib")).unwrap();
        assert_eq!(read.files, built.files);
        assert_eq!(read.dir, "lib");
        assert_eq!(
            read.summary.symbol_count,
            read.files.iter().map(|f| f.symbols.len()).sum::<usize>()
        );
        assert_eq!(read.summary.file_count, 2);
        let names: Vec<_> = read.files[0].symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_namespace_key_and_inheritance() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "model/a_plain.zy", "function helper() {}");
        write(root, "model/b_users.zy", "namespace Model;\nclass Users { function age() {} }");
        let store = store(root);

        let written = store.write_dir_index(&root.join("model")).unwrap();
        assert!(written.ends_with("ns_Model.index.json"));
        assert!(store.read_dir_index(&root.join("model")).is_none());

        let index = store.read_namespace_index("Model").unwrap();
        let helper = index.symbols().find(|(_, s)| s.name == "helper").unwrap().1;
        assert_eq!(helper.namespace.as_deref(), Some("Model"));
        assert_eq!(helper.fqn, "Model\\helper");
        let age = index.symbols().find(|(_, s)| s.name == "age").unwrap();
        assert_eq!(age.0, "model/b_users.zy");
        assert_eq!(age.1.kind, SymbolKind::Method);
    }

    #[test]
    fn test_missing_and_corrupt_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.read_namespace_index("Nope").is_none());

        fs::create_dir_all(store.index_dir()).unwrap();
        fs::write(store.path_for(&IndexKey::Namespace("Bad".into())), "{not json").unwrap();
        assert!(store.read_namespace_index("Bad").is_none());
    }

    #[test]
    fn test_old_version_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        fs::create_dir_all(store.index_dir()).unwrap();
        let mut index = DirIndex::new("x", Vec::new());
        index.version = FORMAT_VERSION + 1;
        write_json_atomic(&store.path_for(&IndexKey::Namespace("Old".into())), &index).unwrap();
        assert!(store.read_namespace_index("Old").is_none());
    }

    #[test]
    fn test_build_all_merges_namespaces_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "model/Users.zy", "namespace Model;\nclass Users {}");
        write(root, "model/extra/Orders.zy", "namespace Model;\nclass Orders {}");
        write(root, "scripts/run.zy", "function run() {}");
        write(root, "empty/readme.txt", "");
        let store = store(root);

        fs::create_dir_all(store.index_dir()).unwrap();
        fs::write(store.index_dir().join("stale.index.json"), "{}").unwrap();

        let summary = store.build_all_dir_indexes(&CancellationToken::new()).unwrap();
        assert!(!summary.cancelled);
        // root + model + model/extra + scripts
        assert_eq!(summary.directories, 4);
        assert_eq!(summary.snapshots, 3);
        assert_eq!(summary.pruned, 1);
        assert!(!store.index_dir().join("stale.index.json").exists());

        let model = store.read_namespace_index("Model").unwrap();
        assert_eq!(model.summary.file_count, 2);
        assert!(store.read_dir_index(&root.join("scripts")).is_some());
        assert!(store.read_dir_index(root).is_some());
        assert!(store.read_dir_index(&root.join("empty")).is_none());
        assert!(store.has_snapshots());
    }

    #[test]
    fn test_state_blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let value = serde_json::json!({"lastFullScanMs": 42});
        store.save_state(&value).unwrap();
        let back: serde_json::Value = store.load_state().unwrap();
        assert_eq!(back, value);
        assert!(!store.has_snapshots());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("x.json.tmp").exists());
    }
}
