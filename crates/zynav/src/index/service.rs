//
// index/service.rs
//
// In-memory symbol index with throttled incremental refresh
//

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::files::{self, now_millis, FileStamp, SourceScan};
use super::store::{read_file_entry, DirIndex, IndexStore};
use crate::config::EngineConfig;
use crate::perf::TimingGuard;
use crate::symbols::{SymbolEntry, SymbolKind};

/// Where a symbol is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolLocation {
    /// Project-relative path with `/` separators
    pub file_path: String,
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SymbolKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqn: Option<String>,
    /// `namespace` and `fqn` come from the directory, not the file
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inherited: bool,
}

/// Authoritative index data, also persisted as the warm-start blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexServiceState {
    /// Bare symbol name to every place it is defined
    pub symbol_to_locations: HashMap<String, Vec<SymbolLocation>>,
    pub file_timestamps: HashMap<String, FileStamp>,
    pub last_full_scan_ms: u64,
}

impl IndexServiceState {
    /// Drop every location in `path`, removing names left without any.
    pub fn remove_file(&mut self, path: &str) {
        self.symbol_to_locations.retain(|_, locations| {
            locations.retain(|loc| loc.file_path != path);
            !locations.is_empty()
        });
    }

    /// Add the symbols of `path`. Callers purge the path first.
    pub fn merge_file(&mut self, path: &str, symbols: &[SymbolEntry]) {
        for symbol in symbols {
            self.symbol_to_locations
                .entry(symbol.name.clone())
                .or_default()
                .push(SymbolLocation {
                    file_path: path.to_string(),
                    offset: symbol.offset,
                    kind: Some(symbol.kind),
                    namespace: symbol.namespace.clone(),
                    fqn: Some(symbol.fqn.clone()),
                    inherited: false,
                });
        }
    }

    /// Give symbols without a namespace of their own the namespace of their
    /// directory, the way directory snapshots do. The directory namespace is
    /// the declared namespace of its first file, in path order, that has one.
    pub fn inherit_directory_namespaces(&mut self) {
        let mut declared: HashMap<String, String> = HashMap::new();
        for loc in self.symbol_to_locations.values().flatten() {
            if loc.inherited {
                continue;
            }
            if let Some(ns) = loc.namespace.as_deref().filter(|ns| !ns.is_empty()) {
                declared.entry(loc.file_path.clone()).or_insert_with(|| ns.to_string());
            }
        }

        let mut dir_namespaces: HashMap<&str, (&str, &str)> = HashMap::new();
        for (file, ns) in &declared {
            let dir = parent_dir(file);
            let entry = dir_namespaces.entry(dir).or_insert((file.as_str(), ns.as_str()));
            if file.as_str() < entry.0 {
                *entry = (file.as_str(), ns.as_str());
            }
        }
        let dir_namespaces: HashMap<String, String> = dir_namespaces
            .into_iter()
            .map(|(dir, (_, ns))| (dir.to_string(), ns.to_string()))
            .collect();

        for loc in self.symbol_to_locations.values_mut().flatten() {
            if !loc.inherited && loc.namespace.is_some() {
                continue;
            }
            let bare = match (&loc.fqn, loc.inherited, &loc.namespace) {
                (Some(fqn), true, Some(old)) => fqn
                    .strip_prefix(old.as_str())
                    .and_then(|rest| rest.strip_prefix('\\'))
                    .unwrap_or(fqn.as_str())
                    .to_string(),
                (Some(fqn), _, _) => fqn.clone(),
                (None, _, _) => continue,
            };
            match dir_namespaces.get(parent_dir(&loc.file_path)) {
                Some(ns) => {
                    loc.fqn = Some(format!("{ns}\\{bare}"));
                    loc.namespace = Some(ns.clone());
                    loc.inherited = true;
                }
                None => {
                    loc.fqn = Some(bare);
                    loc.namespace = None;
                    loc.inherited = false;
                }
            }
        }
    }

    pub fn location_count(&self) -> usize {
        self.symbol_to_locations.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Nothing loaded or built yet
    Cold,
    /// Loaded from disk or built at least once
    Warm,
}

/// What a call to [`IndexService::ensure_up_to_date`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Called again inside the throttle window
    Throttled,
    /// No file changed since the last refresh
    Unchanged,
    Incremental { removed: usize, updated: usize },
    FullRebuild { files: usize },
    /// The refresh failed; the previous state was kept
    Failed,
}

impl RefreshOutcome {
    /// Whether the in-memory map may have changed.
    pub fn mutated(self) -> bool {
        matches!(
            self,
            RefreshOutcome::Incremental { .. } | RefreshOutcome::FullRebuild { .. }
        )
    }
}

type RebuiltFile = (String, FileStamp, Vec<SymbolEntry>);

#[derive(Debug, Default)]
struct RefreshClock {
    last_run: Option<Instant>,
}

/// Index of every tracked source file of one project.
///
/// Share it as `Arc<IndexService>`. Refreshes are serialized by one mutex;
/// queries read a snapshot of the map under a short read lock.
pub struct IndexService {
    root: PathBuf,
    config: EngineConfig,
    store: IndexStore,
    state: RwLock<IndexServiceState>,
    refresh: Mutex<RefreshClock>,
    query_cache: Mutex<LruCache<String, Vec<SymbolLocation>>>,
    /// Bumped under the state write lock on every map mutation
    generation: AtomicU64,
    warm: AtomicBool,
    shutdown: CancellationToken,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IndexService {
    /// Open the index for `root`, loading the persisted state when present.
    pub fn open(root: &Path, config: EngineConfig) -> anyhow::Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| anyhow::anyhow!("cannot open project root {}: {e}", root.display()))?;
        let store = IndexStore::new(&root, &config);

        let loaded: Option<IndexServiceState> = store.load_state();
        let warm = loaded.is_some();
        let state = loaded.unwrap_or_default();
        if warm {
            log::info!(
                "Loaded persisted index for {} ({} files, {} names)",
                root.display(),
                state.file_timestamps.len(),
                state.symbol_to_locations.len()
            );
        }

        let capacity = NonZeroUsize::new(config.query_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            root,
            store,
            state: RwLock::new(state),
            refresh: Mutex::new(RefreshClock::default()),
            query_cache: Mutex::new(LruCache::new(capacity)),
            generation: AtomicU64::new(0),
            warm: AtomicBool::new(warm),
            shutdown: CancellationToken::new(),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn status(&self) -> ServiceStatus {
        if self.warm.load(Ordering::Acquire) {
            ServiceStatus::Warm
        } else {
            ServiceStatus::Cold
        }
    }

    /// Copy of the current index data.
    pub fn snapshot(&self) -> IndexServiceState {
        read(&self.state).clone()
    }

    /// Cancel in-flight and future walks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bring the index in line with the files on disk.
    pub fn ensure_up_to_date(&self) -> RefreshOutcome {
        self.ensure_up_to_date_with(&self.shutdown)
    }

    /// Like [`ensure_up_to_date`](Self::ensure_up_to_date) with an explicit
    /// cancellation signal. A cancelled walk keeps the work it finished.
    pub fn ensure_up_to_date_with(&self, token: &CancellationToken) -> RefreshOutcome {
        let mut clock = lock(&self.refresh);
        if let Some(last) = clock.last_run {
            if last.elapsed() < Duration::from_millis(self.config.throttle_ms) {
                log::trace!("index refresh throttled");
                return RefreshOutcome::Throttled;
            }
        }

        let _guard = TimingGuard::with_budget("index:ensure-up-to-date", 2000);
        match self.refresh_locked(token) {
            Ok(outcome) => {
                clock.last_run = Some(Instant::now());
                self.warm.store(true, Ordering::Release);
                if outcome.mutated() {
                    log::info!("Index refreshed: {outcome:?}");
                }
                outcome
            }
            Err(e) => {
                // Throttle retries too, so a broken root is not rescanned per query.
                clock.last_run = Some(Instant::now());
                log::warn!("Index refresh failed, keeping previous state: {e:#}");
                RefreshOutcome::Failed
            }
        }
    }

    /// Refresh on tokio's blocking pool without blocking the caller.
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<RefreshOutcome> {
        let service = Arc::clone(self);
        tokio::task::spawn_blocking(move || service.ensure_up_to_date())
    }

    /// Discard the in-memory map and rebuild it, and every snapshot, from
    /// the files on disk. Ignores the throttle window.
    pub fn reindex(&self) -> anyhow::Result<RefreshOutcome> {
        let mut clock = lock(&self.refresh);
        let token = &self.shutdown;
        let scan = files::scan_sources(&self.root, &self.config, token)?;
        let (removed, _, _) = self.diff(&scan);

        let outcome = self.full_rebuild(&scan, &removed, token);
        self.regenerate_snapshots(token);
        self.clear_query_cache();
        self.persist_state();
        clock.last_run = Some(Instant::now());
        self.warm.store(true, Ordering::Release);
        Ok(outcome)
    }

    /// Runs with the refresh mutex held.
    fn refresh_locked(&self, token: &CancellationToken) -> anyhow::Result<RefreshOutcome> {
        let scan = files::scan_sources(&self.root, &self.config, token)?;

        let (removed, changed, indexed) = self.diff(&scan);

        if removed.is_empty() && changed.is_empty() {
            if !self.store.has_snapshots() {
                self.regenerate_snapshots(token);
            }
            return Ok(RefreshOutcome::Unchanged);
        }

        let outcome = if removed.len() + changed.len() > self.config.full_rebuild_threshold(indexed) {
            self.full_rebuild(&scan, &removed, token)
        } else {
            self.incremental_update(&scan, &removed, &changed)
        };

        self.regenerate_snapshots(token);
        self.clear_query_cache();
        self.persist_state();
        Ok(outcome)
    }

    /// Removed paths, added or modified paths, and the number of files
    /// indexed before the scan.
    fn diff(&self, scan: &SourceScan) -> (Vec<String>, Vec<String>, usize) {
        let state = read(&self.state);
        // A partial walk says nothing about files it never reached.
        let removed: Vec<String> = if scan.complete {
            state
                .file_timestamps
                .keys()
                .filter(|path| !scan.files.contains_key(*path))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let changed: Vec<String> = scan
            .files
            .iter()
            .filter(|(path, stamp)| state.file_timestamps.get(*path) != Some(*stamp))
            .map(|(path, _)| path.clone())
            .collect();
        (removed, changed, state.file_timestamps.len())
    }

    fn full_rebuild(&self, scan: &SourceScan, removed: &[String], token: &CancellationToken) -> RefreshOutcome {
        let _guard = TimingGuard::new("index:full-rebuild");
        log::info!("Full index rebuild over {} files", scan.files.len());

        let results: Vec<RebuiltFile> = scan
            .files
            .par_iter()
            .filter_map(|(rel, stamp)| {
                if token.is_cancelled() {
                    return None;
                }
                match read_file_entry(&self.root, &self.root.join(rel)) {
                    Ok(entry) => Some((rel.clone(), *stamp, entry.symbols)),
                    Err(e) => {
                        log::warn!("skipping {rel}: {e:#}");
                        None
                    }
                }
            })
            .collect();
        self.apply_rebuild(results, removed, token.is_cancelled() || !scan.complete)
    }

    /// Install rebuilt files. A complete rebuild replaces the map; a
    /// partial one merges what was read and leaves every other file as it was.
    fn apply_rebuild(&self, results: Vec<RebuiltFile>, removed: &[String], partial: bool) -> RefreshOutcome {
        let files = results.len();
        let mut state = write(&self.state);
        self.generation.fetch_add(1, Ordering::AcqRel);
        if partial {
            // Keep what was read; files not reached keep their previous entries.
            log::debug!("partial rebuild kept {files} files");
            for path in removed {
                state.remove_file(path);
                state.file_timestamps.remove(path);
            }
            for (rel, stamp, symbols) in results {
                state.remove_file(&rel);
                state.merge_file(&rel, &symbols);
                state.file_timestamps.insert(rel, stamp);
            }
        } else {
            let mut fresh = IndexServiceState::default();
            for (rel, stamp, symbols) in results {
                fresh.merge_file(&rel, &symbols);
                fresh.file_timestamps.insert(rel, stamp);
            }
            fresh.last_full_scan_ms = now_millis();
            *state = fresh;
        }
        state.inherit_directory_namespaces();

        RefreshOutcome::FullRebuild { files }
    }

    fn incremental_update(&self, scan: &SourceScan, removed: &[String], changed: &[String]) -> RefreshOutcome {
        let _guard = TimingGuard::new("index:incremental-update");

        let reads: Vec<(String, anyhow::Result<Vec<SymbolEntry>>)> = changed
            .par_iter()
            .map(|rel| {
                let result = read_file_entry(&self.root, &self.root.join(rel)).map(|e| e.symbols);
                (rel.clone(), result)
            })
            .collect();

        let mut state = write(&self.state);
        self.generation.fetch_add(1, Ordering::AcqRel);
        for path in removed {
            log::debug!("removing {path} from index");
            state.remove_file(path);
            state.file_timestamps.remove(path);
        }

        let mut updated = 0;
        for (rel, result) in reads {
            match result {
                Ok(symbols) => {
                    log::debug!("reindexing {rel} ({} symbols)", symbols.len());
                    state.remove_file(&rel);
                    state.merge_file(&rel, &symbols);
                    if let Some(stamp) = scan.files.get(&rel) {
                        state.file_timestamps.insert(rel, *stamp);
                    }
                    updated += 1;
                }
                // Old entries stay; the missing stamp makes the next refresh retry.
                Err(e) => log::warn!("skipping {rel}: {e:#}"),
            }
        }
        state.inherit_directory_namespaces();

        RefreshOutcome::Incremental {
            removed: removed.len(),
            updated,
        }
    }

    fn regenerate_snapshots(&self, token: &CancellationToken) {
        let _guard = TimingGuard::new("index:snapshots");
        if let Err(e) = self.store.build_all_dir_indexes(token) {
            log::warn!("failed to regenerate index snapshots: {e:#}");
        }
    }

    fn persist_state(&self) {
        let state = read(&self.state);
        if let Err(e) = self.store.save_state(&*state) {
            log::warn!("failed to persist index state: {e:#}");
        }
    }

    fn clear_query_cache(&self) {
        lock(&self.query_cache).clear();
    }

    fn lookup(&self, name: &str) -> Vec<SymbolLocation> {
        if let Some(hit) = lock(&self.query_cache).get(name) {
            return hit.clone();
        }
        let (generation, locations) = self.read_locations(name);
        self.cache_locations(name, generation, &locations);
        locations
    }

    /// Locations of `name` and the map generation they were read at.
    fn read_locations(&self, name: &str) -> (u64, Vec<SymbolLocation>) {
        let state = read(&self.state);
        let generation = self.generation.load(Ordering::Acquire);
        let locations = state.symbol_to_locations.get(name).cloned().unwrap_or_default();
        (generation, locations)
    }

    /// Cache a lookup unless the map changed since it was read. The check
    /// runs under the cache lock, which a refresh takes only after bumping
    /// the generation.
    fn cache_locations(&self, name: &str, generation: u64, locations: &[SymbolLocation]) {
        let mut cache = lock(&self.query_cache);
        if self.generation.load(Ordering::Acquire) == generation {
            cache.put(name.to_string(), locations.to_vec());
        } else {
            log::trace!("index changed during lookup of '{name}', not caching");
        }
    }

    /// Every definition of `name`, refreshing the index first.
    ///
    /// With a path hint, locations whose path contains the hint as a
    /// directory segment (or file stem) win when there are any.
    pub fn find_definitions(&self, name: &str, preferred_path_hint: Option<&str>) -> Vec<SymbolLocation> {
        self.ensure_up_to_date();
        let locations = self.lookup(name);

        let Some(hint) = preferred_path_hint.filter(|h| !h.trim().is_empty()) else {
            return locations;
        };
        let preferred: Vec<SymbolLocation> = locations
            .iter()
            .filter(|loc| path_matches_hint(&loc.file_path, hint, &self.config.extension))
            .cloned()
            .collect();
        if preferred.is_empty() {
            locations
        } else {
            preferred
        }
    }

    /// Definitions of `name` inside one project-relative file.
    pub fn definitions_in_file(&self, name: &str, rel_path: &str) -> Vec<SymbolLocation> {
        self.ensure_up_to_date();
        let mut locations = self.lookup(name);
        locations.retain(|loc| loc.file_path == rel_path);
        locations
    }

    /// Persisted snapshot for `namespace`, refreshing the index first.
    pub fn namespace_index(&self, namespace: &str) -> Option<DirIndex> {
        self.ensure_up_to_date();
        self.store.read_namespace_index(namespace)
    }

    /// Project-relative form of `path`. Relative inputs are taken as-is.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        if path.is_relative() {
            return files::relative_path(Path::new(""), path);
        }
        files::relative_path(&self.root, path).or_else(|| {
            let canonical = path.canonicalize().ok()?;
            files::relative_path(&self.root, &canonical)
        })
    }

    pub fn absolute_path(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    /// Current disk content of a project file.
    pub fn read_source(&self, rel_path: &str) -> Option<String> {
        match std::fs::read_to_string(self.absolute_path(rel_path)) {
            Ok(text) => Some(text),
            Err(e) => {
                log::debug!("cannot read {rel_path}: {e}");
                None
            }
        }
    }
}

/// Directory part of a project-relative path; `""` for the root.
fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Whether `path` lies under a directory named `hint`, or is the file
/// `<hint>.<extension>`. Case-insensitive; `\` in the hint reads as `/`.
pub fn path_matches_hint(path: &str, hint: &str, extension: &str) -> bool {
    let path = format!("/{}", path.to_lowercase());
    let hint = hint.to_lowercase().replace('\\', "/");
    let hint = hint.trim_matches('/');
    if hint.is_empty() {
        return false;
    }
    path.contains(&format!("/{hint}/")) || path.ends_with(&format!("/{hint}.{}", extension.to_lowercase()))
}
