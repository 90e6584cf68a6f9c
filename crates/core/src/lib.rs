//! Core library for dcplan
//!
//! Resolves devcontainer descriptors into validated container invocation plans:
//! document loading with `extends` inheritance, merge rules, variable substitution,
//! port and mount normalization, plan synthesis, argument vector inspection and
//! lifecycle script rendering. Logging and error handling are shared with the CLI.

pub mod argv;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod merge;
pub mod mount;
pub mod pipeline;
pub mod plan;
pub mod ports;
pub mod variable;

// Re-export IndexMap for use by dependent crates (preserves insertion order for ordered maps)
pub use indexmap::IndexMap;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
