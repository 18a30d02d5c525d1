//! monocle-core
//!
//! Core library for ranking the decompiled functions of native binaries
//! against a natural-language description.
//!
//! This crate owns the whole binary-to-ranking pipeline: driving Ghidra's
//! headless analyzer, fanning decompilation out over a folder, loading the
//! per-function artifacts back, scoring each function with a language model,
//! and aggregating the scores into a ranking.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends (the CLI today).

pub mod config;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
