//
// test_utils/mod.rs
//
// Shared helpers for tests and benchmarks
//

pub mod fixture_workspace;
