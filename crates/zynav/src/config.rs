//
// config.rs
//
// Engine configuration
//

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Name of the optional per-project settings file.
pub const SETTINGS_FILE: &str = "zynav.json";

/// Indexing and watching configuration for one project
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Source file extension, without the dot
    pub extension: String,
    /// Cache directory for persisted indexes, relative to the project root
    pub cache_dir: PathBuf,
    /// Minimum interval between two refreshes in milliseconds
    pub throttle_ms: u64,
    /// Quiet period after the last change event before refreshing, in milliseconds
    pub debounce_ms: u64,
    /// Change count that always allows an incremental update
    pub full_rebuild_min: usize,
    /// Fraction of indexed files above which a change set triggers a full rebuild
    pub full_rebuild_ratio: f64,
    /// Entries kept in the name lookup cache
    pub query_cache_capacity: usize,
    /// Directory names never descended into
    pub skip_dirs: Vec<String>,
}

impl Default for EngineConfig {
    /// Defaults: `.zy` sources, a 1.5s refresh throttle, a 500ms debounce and a
    /// full rebuild once more than `max(200, 30%)` of the files changed.
    ///
    /// ```
    /// let cfg = zynav::config::EngineConfig::default();
    /// assert_eq!(cfg.extension, "zy");
    /// assert_eq!(cfg.throttle_ms, 1500);
    /// assert_eq!(cfg.debounce_ms, 500);
    /// ```
    fn default() -> Self {
        Self {
            extension: "zy".to_string(),
            cache_dir: PathBuf::from(".zynav").join("index"),
            throttle_ms: 1500,
            debounce_ms: 500,
            full_rebuild_min: 200,
            full_rebuild_ratio: 0.3,
            query_cache_capacity: 256,
            skip_dirs: [
                ".git",
                ".svn",
                ".hg",
                "node_modules",
                ".idea",
                ".vscode",
                "target",
                "vendor",
                ".zynav",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl EngineConfig {
    /// Apply camelCase overrides from a settings object onto the defaults.
    ///
    /// Unknown keys and values of the wrong type are ignored.
    pub fn from_settings(settings: &serde_json::Value) -> Self {
        let mut config = Self::default();

        if let Some(v) = settings.get("extension").and_then(|v| v.as_str()) {
            let v = v.trim_start_matches('.');
            if !v.is_empty() {
                config.extension = v.to_string();
            }
        }
        if let Some(v) = settings.get("cacheDir").and_then(|v| v.as_str()) {
            if !v.is_empty() && !v.contains('\0') {
                config.cache_dir = PathBuf::from(v);
            }
        }
        if let Some(v) = settings.get("throttleMs").and_then(|v| v.as_u64()) {
            config.throttle_ms = v;
        }
        if let Some(v) = settings.get("debounceMs").and_then(|v| v.as_u64()) {
            config.debounce_ms = v;
        }
        if let Some(v) = settings.get("fullRebuildMin").and_then(|v| v.as_u64()) {
            config.full_rebuild_min = v as usize;
        }
        if let Some(v) = settings.get("fullRebuildRatio").and_then(|v| v.as_f64()) {
            if (0.0..=1.0).contains(&v) {
                config.full_rebuild_ratio = v;
            }
        }
        if let Some(v) = settings.get("queryCacheCapacity").and_then(|v| v.as_u64()) {
            config.query_cache_capacity = v as usize;
        }
        if let Some(dirs) = settings.get("skipDirs").and_then(|v| v.as_array()) {
            config.skip_dirs = dirs
                .iter()
                .filter_map(|d| d.as_str())
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
        }

        log::info!("Engine configuration:");
        log::info!("  extension: {}", config.extension);
        log::info!("  cache_dir: {}", config.cache_dir.display());
        log::info!("  throttle_ms: {}", config.throttle_ms);
        log::info!("  debounce_ms: {}", config.debounce_ms);
        log::info!(
            "  full_rebuild: max({}, {:.0}%)",
            config.full_rebuild_min,
            config.full_rebuild_ratio * 100.0
        );
        log::info!("  query_cache_capacity: {}", config.query_cache_capacity);

        config
    }

    /// Load `<root>/zynav.json` if present, otherwise return the defaults.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let path = root.join(SETTINGS_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::from_settings(&settings))
    }

    /// Whether a directory with this name is excluded from scans.
    pub fn should_skip_directory(&self, name: &str) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
    }

    /// Whether `path` has the tracked source extension (case-insensitive).
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// Change count above which an update becomes a full rebuild.
    pub fn full_rebuild_threshold(&self, indexed_files: usize) -> usize {
        let ratio = (indexed_files as f64 * self.full_rebuild_ratio) as usize;
        self.full_rebuild_min.max(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.extension, "zy");
        assert_eq!(cfg.cache_dir, PathBuf::from(".zynav/index"));
        assert_eq!(cfg.full_rebuild_min, 200);
        assert!(cfg.should_skip_directory(".git"));
        assert!(cfg.should_skip_directory(".zynav"));
        assert!(!cfg.should_skip_directory("src"));
    }

    #[test]
    fn test_from_settings_overrides() {
        let cfg = EngineConfig::from_settings(&json!({
            "extension": ".zyx",
            "throttleMs": 0,
            "debounceMs": 50,
            "fullRebuildRatio": 0.5,
            "skipDirs": ["build", ""]
        }));
        assert_eq!(cfg.extension, "zyx");
        assert_eq!(cfg.throttle_ms, 0);
        assert_eq!(cfg.debounce_ms, 50);
        assert_eq!(cfg.full_rebuild_ratio, 0.5);
        assert_eq!(cfg.skip_dirs, vec!["build".to_string()]);
        // Untouched keys keep their defaults
        assert_eq!(cfg.full_rebuild_min, 200);
    }

    #[test]
    fn test_from_settings_ignores_bad_values() {
        let cfg = EngineConfig::from_settings(&json!({
            "throttleMs": "fast",
            "fullRebuildRatio": 4.0,
            "extension": ""
        }));
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_full_rebuild_threshold() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.full_rebuild_threshold(10), 200);
        assert_eq!(cfg.full_rebuild_threshold(1000), 300);
    }

    #[test]
    fn test_is_source_file() {
        let cfg = EngineConfig::default();
        assert!(cfg.is_source_file(Path::new("a/b/Users.zy")));
        assert!(cfg.is_source_file(Path::new("Users.ZY")));
        assert!(!cfg.is_source_file(Path::new("Users.zy.bak")));
        assert!(!cfg.is_source_file(Path::new("zy")));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(EngineConfig::load(dir.path()).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), r#"{"cacheDir": ".cache/zy"}"#).unwrap();
        let cfg = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.cache_dir, PathBuf::from(".cache/zy"));
    }
}
