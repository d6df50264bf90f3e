//
// index/watcher.rs
//
// Debounced file-change notifications that trigger index refreshes
//

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::service::IndexService;

pub type RefreshCallback = Arc<dyn Fn() + Send + Sync>;

/// Collapses a burst of triggers into one callback, fired once the burst
/// has been quiet for `delay`.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<CancellationToken>>,
    callback: RefreshCallback,
    handle: Handle,
}

impl Debouncer {
    pub fn new(handle: Handle, delay: Duration, callback: RefreshCallback) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
            callback,
            handle,
        }
    }

    /// Restart the quiet period, cancelling the previously scheduled fire.
    /// Returns the token of the newly scheduled task.
    pub fn schedule(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let task_token = token.clone();
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        self.handle.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    log::trace!("debounced refresh superseded");
                }
                _ = tokio::time::sleep(delay) => {
                    callback();
                }
            }
        });
        token
    }

    /// Drop any scheduled fire.
    pub fn cancel(&self) {
        if let Some(token) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

/// Decides which paths count as changes to tracked sources.
#[derive(Debug, Clone)]
pub struct EventFilter {
    extension: String,
    ignored_dir: PathBuf,
}

impl EventFilter {
    pub fn new(extension: &str, ignored_dir: &Path) -> Self {
        Self {
            extension: extension.to_string(),
            ignored_dir: ignored_dir.to_path_buf(),
        }
    }

    pub fn for_service(service: &IndexService) -> Self {
        Self::new(&service.config().extension, service.store().index_dir())
    }

    /// Source files with the tracked extension, outside the cache directory.
    pub fn is_tracked(&self, path: &Path) -> bool {
        is_tracked(path, &self.extension) && !path.starts_with(&self.ignored_dir)
    }
}

/// Whether `path` names a non-directory with extension `ext` (case-insensitive).
pub fn is_tracked(path: &Path, ext: &str) -> bool {
    !path.is_dir()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

/// Watches a project for source changes and refreshes its index after
/// each burst of edits.
pub struct ChangeWatcher {
    _watcher: Option<RecommendedWatcher>,
    debouncer: Arc<Debouncer>,
    filter: EventFilter,
}

impl ChangeWatcher {
    /// Watch the service's root recursively. Must be called inside a tokio runtime.
    pub fn start(service: Arc<IndexService>) -> anyhow::Result<Self> {
        let handle = Handle::try_current().context("change watcher requires a tokio runtime")?;
        let filter = EventFilter::for_service(&service);
        let delay = Duration::from_millis(service.config().debounce_ms);
        let debouncer = Arc::new(Debouncer::new(handle.clone(), delay, refresh_callback(&service)));

        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_change(&event.kind) => {
                for path in event.paths {
                    // The receiver only goes away when the watcher is dropped.
                    let _ = tx.send(path);
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("file watch error: {e}"),
        })
        .context("creating file watcher")?;
        watcher
            .watch(service.root(), RecursiveMode::Recursive)
            .with_context(|| format!("watching {}", service.root().display()))?;

        let task_filter = filter.clone();
        let task_debouncer = Arc::clone(&debouncer);
        handle.spawn(async move {
            while let Some(path) = rx.recv().await {
                if task_filter.is_tracked(&path) {
                    log::trace!("change detected: {}", path.display());
                    task_debouncer.schedule();
                }
            }
        });

        log::info!(
            "Watching {} for .{} changes ({}ms debounce)",
            service.root().display(),
            service.config().extension,
            service.config().debounce_ms
        );
        Ok(Self {
            _watcher: Some(watcher),
            debouncer,
            filter,
        })
    }

    /// A watcher fed only through [`notify_path`](Self::notify_path), for
    /// hosts that deliver their own change events.
    pub fn manual(service: Arc<IndexService>) -> anyhow::Result<Self> {
        let filter = EventFilter::for_service(&service);
        let delay = Duration::from_millis(service.config().debounce_ms);
        Self::with_callback(filter, delay, refresh_callback(&service))
    }

    /// A manual watcher that runs `callback` instead of an index refresh.
    pub fn with_callback(filter: EventFilter, delay: Duration, callback: RefreshCallback) -> anyhow::Result<Self> {
        let handle = Handle::try_current().context("change watcher requires a tokio runtime")?;
        Ok(Self {
            _watcher: None,
            debouncer: Arc::new(Debouncer::new(handle, delay, callback)),
            filter,
        })
    }

    /// Report a changed, created or deleted path. Returns whether it counted.
    pub fn notify_path(&self, path: &Path) -> bool {
        if !self.filter.is_tracked(path) {
            return false;
        }
        self.debouncer.schedule();
        true
    }

    pub fn stop(&self) {
        self.debouncer.cancel();
    }
}

fn refresh_callback(service: &Arc<IndexService>) -> RefreshCallback {
    let service = Arc::clone(service);
    Arc::new(move || {
        log::debug!("change burst settled, refreshing index");
        // Detached: the outcome is logged by the service.
        drop(service.spawn_refresh());
    })
}
