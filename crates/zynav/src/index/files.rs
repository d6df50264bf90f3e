//
// index/files.rs
//
// Source file discovery and change stamps
//

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::EngineConfig;

/// Modification stamp used to detect changed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    /// Modification time in milliseconds since the Unix epoch
    pub mtime: u64,
    /// File size in bytes
    pub size: u64,
}

impl FileStamp {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            mtime: mtime_millis(metadata),
            size: metadata.len(),
        }
    }
}

pub fn mtime_millis(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .unwrap_or(UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `path` relative to `root` with `/` separators, or `None` if it lies outside.
/// The root itself maps to the empty string.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Result of enumerating the project's source files.
#[derive(Debug, Default)]
pub struct SourceScan {
    /// Project-relative path to stamp
    pub files: HashMap<String, FileStamp>,
    /// False when the walk was cancelled before finishing
    pub complete: bool,
}

/// Enumerate every tracked source file under `root`, skipping ignored
/// directories. Unreadable entries are logged and skipped; cancellation
/// stops the walk and returns what was collected.
pub fn scan_sources(
    root: &Path,
    config: &EngineConfig,
    token: &CancellationToken,
) -> anyhow::Result<SourceScan> {
    if !root.is_dir() {
        bail!("project root {} is not a directory", root.display());
    }

    let mut scan = SourceScan {
        files: HashMap::new(),
        complete: true,
    };

    for entry in walk(root, config) {
        if token.is_cancelled() {
            log::debug!("source scan cancelled after {} files", scan.files.len());
            scan.complete = false;
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry during scan: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !config.is_source_file(entry.path()) {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("cannot stat {}: {e}", entry.path().display());
                continue;
            }
        };
        if let Some(rel) = relative_path(root, entry.path()) {
            scan.files.insert(rel, FileStamp::from_metadata(&metadata));
        }
    }

    Ok(scan)
}

/// Recursive walk over `root` that never enters skipped directories.
pub(crate) fn walk<'a>(
    root: &Path,
    config: &'a EngineConfig,
) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || e.file_name()
                    .to_str()
                    .map_or(true, |name| !config.should_skip_directory(name))
        })
}

/// Tracked source files directly inside `dir` (non-recursive), sorted.
pub fn source_files_in(dir: &Path, config: &EngineConfig) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && config.is_source_file(p))
        .collect();
    files.sort();
    files
}
