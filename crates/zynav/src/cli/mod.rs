//
// cli/mod.rs
//
// Command-line subcommands
//

pub mod commands;
pub mod index_stats;
