//
// cli/commands.rs
//
// `zynav index`, `zynav resolve` and `zynav watch`
//

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::config::EngineConfig;
use crate::index::{ChangeWatcher, IndexService, RefreshOutcome};
use crate::resolve::{Location, Request, ResolutionEngine};

/// Parsed arguments for the `resolve` subcommand.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolveArgs {
    pub root: PathBuf,
    pub file: PathBuf,
    pub offset: usize,
}

/// Parse the single `<path>` argument of `index` and `watch`.
pub fn parse_path_arg(args: &mut impl Iterator<Item = String>) -> Result<PathBuf, String> {
    let path = args
        .next()
        .ok_or_else(|| "Missing required <path> argument".to_string())?;
    if let Some(extra) = args.next() {
        return Err(format!("Unexpected argument: '{extra}'"));
    }
    let path = PathBuf::from(path);
    if !path.is_dir() {
        return Err(format!("Not a directory: {}", path.display()));
    }
    Ok(path)
}

/// Parse `resolve <root> <file> <offset>`. A relative `<file>` is taken
/// relative to `<root>`.
pub fn parse_resolve_args(args: &mut impl Iterator<Item = String>) -> Result<ResolveArgs, String> {
    let usage = "expected: resolve <root> <file> <offset>";
    let root = PathBuf::from(args.next().ok_or_else(|| format!("Missing <root>; {usage}"))?);
    let file = PathBuf::from(args.next().ok_or_else(|| format!("Missing <file>; {usage}"))?);
    let offset = args
        .next()
        .ok_or_else(|| format!("Missing <offset>; {usage}"))?;
    let offset = offset
        .parse::<usize>()
        .map_err(|_| format!("Invalid offset '{offset}': expected a byte offset"))?;
    if let Some(extra) = args.next() {
        return Err(format!("Unexpected argument: '{extra}'"));
    }
    let file = if file.is_relative() { root.join(file) } else { file };
    Ok(ResolveArgs { root, file, offset })
}

/// Summary of a forced rebuild.
#[derive(Debug)]
pub struct IndexReport {
    pub outcome: RefreshOutcome,
    pub files: usize,
    pub names: usize,
    pub locations: usize,
    pub elapsed: Duration,
}

/// Rebuild the index of `root` from scratch.
pub fn run_index(root: &Path) -> anyhow::Result<IndexReport> {
    let config = EngineConfig::load(root)?;
    let service = IndexService::open(root, config)?;
    let start = Instant::now();
    let outcome = service.reindex()?;
    let elapsed = start.elapsed();
    let state = service.snapshot();
    Ok(IndexReport {
        outcome,
        files: state.file_timestamps.len(),
        names: state.symbol_to_locations.len(),
        locations: state.location_count(),
        elapsed,
    })
}

pub fn print_index_report(root: &Path, report: &IndexReport) {
    println!(
        "Indexed {}: {} files, {} names, {} definitions in {:.2?}",
        root.display(),
        report.files,
        report.names,
        report.locations,
        report.elapsed
    );
}

/// Resolve the word at `args.offset` and format each candidate as
/// `path:line  label`, paths relative to the project root where possible.
pub fn run_resolve(args: &ResolveArgs) -> anyhow::Result<Vec<String>> {
    let config = EngineConfig::load(&args.root)?;
    let service = IndexService::open(&args.root, config)?;
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;

    let engine = ResolutionEngine::new(&service);
    let locations = engine.resolve(&Request {
        text: &text,
        offset: args.offset,
        path: Some(&args.file),
    });
    Ok(locations
        .iter()
        .map(|loc| format_location(&service, loc, &args.file, &text))
        .collect())
}

fn format_location(service: &IndexService, loc: &Location, buffer: &Path, buffer_text: &str) -> String {
    let rel = service.relative_path(&loc.path);
    let line = match &rel {
        Some(rel) if service.relative_path(buffer).as_deref() != Some(rel.as_str()) => service
            .read_source(rel)
            .map_or(1, |source| loc.line(&source)),
        _ => loc.line(buffer_text),
    };
    let shown = rel.unwrap_or_else(|| loc.path.display().to_string());
    format!("{shown}:{line}  {}", loc.label)
}

/// Warm the index, then refresh it on every burst of changes until Ctrl-C.
pub async fn run_watch(root: &Path) -> anyhow::Result<()> {
    let config = EngineConfig::load(root)?;
    let service = Arc::new(IndexService::open(root, config)?);

    let outcome = service.spawn_refresh().await.context("initial index refresh")?;
    log::info!("Initial refresh: {outcome:?}");

    let watcher = ChangeWatcher::start(Arc::clone(&service))?;
    println!("Watching {} (Ctrl-C to stop)", service.root().display());
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    watcher.stop();
    service.shutdown();
    log::info!("Watcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args(items: &[&str]) -> std::vec::IntoIter<String> {
        items.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_path_arg() {
        assert_eq!(parse_path_arg(&mut args(&["."])).unwrap(), PathBuf::from("."));
        assert!(parse_path_arg(&mut args(&[]))
            .unwrap_err()
            .contains("Missing required <path>"));
        assert!(parse_path_arg(&mut args(&[".", "extra"]))
            .unwrap_err()
            .contains("Unexpected argument"));
    }

    #[test]
    fn test_parse_resolve_args() {
        let parsed = parse_resolve_args(&mut args(&["/proj", "src/main.zy", "42"])).unwrap();
        assert_eq!(
            parsed,
            ResolveArgs {
                root: PathBuf::from("/proj"),
                file: PathBuf::from("/proj/src/main.zy"),
                offset: 42,
            }
        );

        let absolute = parse_resolve_args(&mut args(&["/proj", "/other/a.zy", "0"])).unwrap();
        assert_eq!(absolute.file, PathBuf::from("/other/a.zy"));

        assert!(parse_resolve_args(&mut args(&["/proj", "a.zy"]))
            .unwrap_err()
            .contains("Missing <offset>"));
        assert!(parse_resolve_args(&mut args(&["/proj", "a.zy", "x"]))
            .unwrap_err()
            .contains("Invalid offset"));
    }

    #[test]
    fn test_run_index_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("model")).unwrap();
        fs::write(
            dir.path().join("model/Users.zy"),
            "namespace Model;\n\nclass Users {\n  function age() {}\n}\n",
        )
        .unwrap();
        let main = "$u = new Users();\n";
        fs::write(dir.path().join("main.zy"), main).unwrap();

        let report = run_index(dir.path()).unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.outcome, RefreshOutcome::FullRebuild { files: 2 });

        let lines = run_resolve(&ResolveArgs {
            root: dir.path().to_path_buf(),
            file: dir.path().join("main.zy"),
            offset: main.find("Users").unwrap(),
        })
        .unwrap();
        assert_eq!(lines, vec!["model/Users.zy:3  Model\\Users".to_string()]);
    }
}
