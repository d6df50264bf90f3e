//
// cli/index_stats.rs
//
// `zynav stats`: per-phase timings of the indexing pipeline
//
// Phases measured:
//   1. scan     - discovering source files
//   2. tokenize - lexing every file
//   3. scopes   - building scope trees
//   4. symbols  - two-stage symbol extraction
//   5. persist  - writing directory and namespace snapshots
//

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::index::files::scan_sources;
use crate::index::IndexStore;
use crate::perf::TimingGuard;
use crate::symbols::{index_symbols, ExtractionStrategy};
use crate::syntax;

/// Parsed arguments for the `stats` subcommand.
#[derive(Debug)]
pub struct IndexStatsArgs {
    pub path: PathBuf,
    pub csv: bool,
    pub only: Option<String>,
}

/// Result of running a single phase.
pub struct PhaseResult {
    pub name: String,
    pub duration: Duration,
    pub detail: String,
}

/// All valid phase names.
const VALID_PHASES: &[&str] = &["scan", "tokenize", "scopes", "symbols", "persist"];

/// Parse `stats` arguments from the remaining CLI args.
///
/// Expected usage: `zynav stats <path> [--csv] [--only <phase>]`
pub fn parse_args(args: &mut impl Iterator<Item = String>) -> Result<IndexStatsArgs, String> {
    let mut path: Option<PathBuf> = None;
    let mut csv = false;
    let mut only: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--csv" => csv = true,
            "--only" => {
                let phase = args
                    .next()
                    .ok_or_else(|| "--only requires a phase name".to_string())?;
                if !VALID_PHASES.contains(&phase.as_str()) {
                    return Err(format!(
                        "Unknown phase '{}'. Valid phases: {}",
                        phase,
                        VALID_PHASES.join(", ")
                    ));
                }
                only = Some(phase);
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown flag: '{}'", other));
            }
            _ => {
                if path.is_some() {
                    return Err("Multiple paths provided; expected exactly one".to_string());
                }
                path = Some(PathBuf::from(arg));
            }
        }
    }

    let path = path.ok_or_else(|| "Missing required <path> argument".to_string())?;
    if !path.is_dir() {
        return Err(format!("Not a directory: {}", path.display()));
    }

    Ok(IndexStatsArgs { path, csv, only })
}

/// Run the stats command and return phase results.
pub fn run_index_stats(args: &IndexStatsArgs, config: &EngineConfig) -> Vec<PhaseResult> {
    let mut results = Vec::new();
    let should_run = |phase: &str| args.only.as_ref().map_or(true, |only| only == phase);
    let token = CancellationToken::new();

    let start = Instant::now();
    let sources = {
        let _guard = TimingGuard::new("stats:scan");
        load_sources(&args.path, config, &token)
    };
    if should_run("scan") {
        results.push(PhaseResult {
            name: "scan".to_string(),
            duration: start.elapsed(),
            detail: format!("{} files", sources.len()),
        });
    }

    if should_run("tokenize") {
        let _guard = TimingGuard::new("stats:tokenize");
        let start = Instant::now();
        let tokens: usize = sources.iter().map(|(_, text)| syntax::tokenize(text).len()).sum();
        results.push(PhaseResult {
            name: "tokenize".to_string(),
            duration: start.elapsed(),
            detail: format!("{} tokens", tokens),
        });
    }

    if should_run("scopes") {
        let _guard = TimingGuard::new("stats:scopes");
        let start = Instant::now();
        let scopes: usize = sources.iter().map(|(_, text)| syntax::parse(text).len()).sum();
        results.push(PhaseResult {
            name: "scopes".to_string(),
            duration: start.elapsed(),
            detail: format!("{} scopes", scopes),
        });
    }

    if should_run("symbols") {
        let _guard = TimingGuard::new("stats:symbols");
        let start = Instant::now();
        let mut symbols = 0usize;
        let mut fallbacks = 0usize;
        for (_, text) in &sources {
            let extracted = index_symbols(text);
            symbols += extracted.symbols.len();
            if extracted.strategy == ExtractionStrategy::Regex {
                fallbacks += 1;
            }
        }
        results.push(PhaseResult {
            name: "symbols".to_string(),
            duration: start.elapsed(),
            detail: format!("{} symbols, {} files via regex fallback", symbols, fallbacks),
        });
    }

    if should_run("persist") {
        let _guard = TimingGuard::new("stats:persist");
        let start = Instant::now();
        let store = IndexStore::new(&args.path, config);
        let detail = match store.build_all_dir_indexes(&token) {
            Ok(summary) => format!(
                "{} directories, {} snapshots, {} pruned",
                summary.directories, summary.snapshots, summary.pruned
            ),
            Err(e) => format!("failed: {e:#}"),
        };
        results.push(PhaseResult {
            name: "persist".to_string(),
            duration: start.elapsed(),
            detail,
        });
    }

    results
}

/// Print phase results in human-readable format.
pub fn print_results(results: &[PhaseResult]) {
    println!("=== zynav index stats ===\n");
    for result in results {
        println!(
            "  {:<10} {:>10.2?}   ({})",
            result.name, result.duration, result.detail
        );
    }

    if results.len() > 1 {
        let total: Duration = results.iter().map(|r| r.duration).sum();
        println!("\n  {:<10} {:>10.2?}", "TOTAL", total);
    }
    println!();
}

/// Print phase results in CSV format.
pub fn print_results_csv(results: &[PhaseResult]) {
    for line in csv_lines(results) {
        println!("{line}");
    }
}

fn csv_lines(results: &[PhaseResult]) -> Vec<String> {
    let mut lines = vec!["phase,duration_ms,detail".to_string()];
    lines.extend(results.iter().map(|result| {
        format!(
            "{},{:.3},\"{}\"",
            result.name,
            result.duration.as_secs_f64() * 1000.0,
            result.detail.replace('"', "\"\"")
        )
    }));
    lines
}

/// Tracked source files under `root` with their contents, sorted by path.
fn load_sources(root: &Path, config: &EngineConfig, token: &CancellationToken) -> Vec<(String, String)> {
    let scan = match scan_sources(root, config, token) {
        Ok(scan) => scan,
        Err(e) => {
            log::warn!("scan failed: {e:#}");
            return Vec::new();
        }
    };
    let mut paths: Vec<String> = scan.files.into_keys().collect();
    paths.sort();
    paths
        .into_iter()
        .filter_map(|rel| match std::fs::read_to_string(root.join(&rel)) {
            Ok(text) => Some((rel, text)),
            Err(e) => {
                log::warn!("cannot read {rel}: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_basic() {
        let mut it = args(&["."]).into_iter();
        let result = parse_args(&mut it).unwrap();
        assert_eq!(result.path, PathBuf::from("."));
        assert!(!result.csv);
        assert!(result.only.is_none());
    }

    #[test]
    fn test_parse_args_all_flags() {
        let mut it = args(&[".", "--csv", "--only", "scopes"]).into_iter();
        let result = parse_args(&mut it).unwrap();
        assert!(result.csv);
        assert_eq!(result.only.as_deref(), Some("scopes"));
    }

    #[test]
    fn test_parse_args_errors() {
        let err = parse_args(&mut args(&["--csv"]).into_iter()).unwrap_err();
        assert!(err.contains("Missing required <path>"));

        let err = parse_args(&mut args(&[".", "--only", "parse"]).into_iter()).unwrap_err();
        assert!(err.contains("Unknown phase"));

        let err = parse_args(&mut args(&[".", "--only"]).into_iter()).unwrap_err();
        assert!(err.contains("--only requires a phase name"));

        let err = parse_args(&mut args(&[".", "--bogus"]).into_iter()).unwrap_err();
        assert!(err.contains("Unknown flag"));

        let err = parse_args(&mut args(&[".", "."]).into_iter()).unwrap_err();
        assert!(err.contains("Multiple paths"));
    }

    #[test]
    fn test_parse_args_all_valid_phases() {
        for phase in VALID_PHASES {
            let mut it = args(&[".", "--only", phase]).into_iter();
            let result = parse_args(&mut it);
            assert!(result.is_ok(), "Phase '{}' should be valid", phase);
        }
    }

    #[test]
    fn test_run_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let args = IndexStatsArgs {
            path: dir.path().to_path_buf(),
            csv: false,
            only: None,
        };
        let results = run_index_stats(&args, &EngineConfig::default());
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, VALID_PHASES);
        assert_eq!(results[0].detail, "0 files");
    }

    #[test]
    fn test_run_only_symbols_counts_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.zy"),
            "namespace App;\nclass A {\n  public $x;\n  function go() {}\n}\n",
        )
        .unwrap();
        let args = IndexStatsArgs {
            path: dir.path().to_path_buf(),
            csv: false,
            only: Some("symbols".to_string()),
        };
        let results = run_index_stats(&args, &EngineConfig::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "symbols");
        assert!(results[0].detail.starts_with("3 symbols, 0 files"));
    }

    #[test]
    fn test_csv_output_format() {
        let results = vec![PhaseResult {
            name: "scan".to_string(),
            duration: Duration::from_millis(12),
            detail: "say \"hi\"".to_string(),
        }];
        let lines = csv_lines(&results);
        assert_eq!(lines[0], "phase,duration_ms,detail");
        assert_eq!(lines[1], "scan,12.000,\"say \"\"hi\"\"\"");
    }
}
