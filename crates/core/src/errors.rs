//! Error types and handling
//!
//! Errors are grouped by domain: document loading and shape problems live in
//! [`ConfigError`], invocation synthesis and validation problems in [`PlanError`],
//! and lifecycle command problems in [`LifecycleError`]. All of them are wrapped by
//! [`DcplanError`] so callers can propagate a single type with `?`.
//!
//! Every error is terminal for the resolution call that produced it. Nothing in the
//! pipeline retries or downgrades an error to a warning.

use std::path::PathBuf;
use thiserror::Error;

/// Document loading and shape errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Malformed document syntax or a field of the wrong type
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Document is syntactically valid but violates a structural rule
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Descriptor could not be written back to its document shape
    #[error("Failed to serialize configuration: {message}")]
    Serialization { message: String },

    /// Cycle detected in extends chain
    #[error("Cycle detected in extends chain: {chain}")]
    ExtendsCycle { chain: String },

    /// Configuration file (or an extends ancestor) does not exist
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// Configuration file exists but could not be read
    #[error("Failed to read configuration file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invocation synthesis and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// No container selector, or an empty image reference
    #[error("No image specified")]
    NoImageSpecified,

    /// A recognized selector kind that cannot be turned into a single-container launch
    #[error("Unsupported container selector: {kind}")]
    UnsupportedSelector { kind: String },

    /// `${localEnv:...}` references with no host value and no default
    #[error("Unresolved localEnv variables: {}", names.join(", "))]
    UnresolvedVariable { names: Vec<String> },

    /// Mount missing a type or target, or naming an unknown kind
    #[error("Invalid mount '{mount}': {reason}")]
    InvalidMount { mount: String, reason: String },

    /// Port string that is neither a bare integer nor a single `host:container` pair
    #[error("Invalid port format: {port}")]
    InvalidPort { port: String },

    /// Structurally invalid launch argument vector
    #[error("Invalid arguments: {message}")]
    InvalidArguments { message: String },
}

/// Lifecycle command errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Phase name other than `create`, `start` or `attach`
    #[error("Unknown phase: {phase}")]
    UnknownPhase { phase: String },

    /// Command value of an unsupported shape
    #[error("Invalid lifecycle command: {message}")]
    InvalidCommand { message: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum DcplanError {
    /// Document loading and shape errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invocation synthesis and validation errors
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Lifecycle command errors
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Convenience type alias for Results with DcplanError
pub type Result<T> = std::result::Result<T, DcplanError>;
