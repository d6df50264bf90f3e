//
// main.rs
//
// Copyright (C) 2026 Jonathan Marc Bearak
//

use std::env;

use zynav::cli::{commands, index_stats};
use zynav::config::EngineConfig;

fn print_usage() {
    println!("zynav {}, code intelligence for Zy sources.", env!("CARGO_PKG_VERSION"));
    print!(
        r#"
Usage: zynav <COMMAND> [ARGS]

Commands:

index <path>                         Rebuild the symbol index of a project
resolve <root> <file> <offset>       Print declarations of the word at a byte offset
watch <path>                         Keep the index current until Ctrl-C
stats <path> [--csv] [--only PHASE]  Time each indexing phase
                                     (scan, tokenize, scopes, symbols, persist)

Options:

--version                            Print the version
--help                               Print this help message

Set RUST_LOG for logging and ZYNAV_PERF=1 (or verbose) for timings.

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let Some(command) = argv.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "--version" => {
            println!("zynav {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        "--help" | "help" => {
            print_usage();
            return Ok(());
        }
        _ => {}
    }

    env_logger::init();

    match command.as_str() {
        "index" => {
            let path = commands::parse_path_arg(&mut argv).map_err(|e| anyhow::anyhow!("index: {e}"))?;
            let report = commands::run_index(&path)?;
            commands::print_index_report(&path, &report);
        }
        "resolve" => {
            let args = commands::parse_resolve_args(&mut argv).map_err(|e| anyhow::anyhow!("resolve: {e}"))?;
            let lines = commands::run_resolve(&args)?;
            if lines.is_empty() {
                println!("no declaration found");
            }
            for line in lines {
                println!("{line}");
            }
        }
        "watch" => {
            let path = commands::parse_path_arg(&mut argv).map_err(|e| anyhow::anyhow!("watch: {e}"))?;
            commands::run_watch(&path).await?;
        }
        "stats" => {
            let args = index_stats::parse_args(&mut argv).map_err(|e| anyhow::anyhow!("stats: {e}"))?;
            let config = EngineConfig::load(&args.path)?;
            let results = index_stats::run_index_stats(&args, &config);
            if args.csv {
                index_stats::print_results_csv(&results);
            } else {
                index_stats::print_results(&results);
            }
        }
        other => {
            return Err(anyhow::anyhow!("Unknown command: '{other}'. Run 'zynav --help' for usage."));
        }
    }

    Ok(())
}
