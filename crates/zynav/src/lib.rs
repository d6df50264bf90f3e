//
// lib.rs
//
// Zy code intelligence: tokenizer, scope tree, symbol index and
// go-to-declaration resolution. The binary in main.rs is a thin CLI over
// these modules.
//

pub mod cli;
pub mod config;
pub mod index;
pub mod perf;
pub mod resolve;
pub mod symbols;
pub mod syntax;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
