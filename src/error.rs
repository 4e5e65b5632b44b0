//! Error types for the model-building engine

use thiserror::Error;

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, ModelgenError>;

/// Fatal generation errors
///
/// Recoverable anomalies never surface here; they accumulate as
/// [`Diagnostics`](crate::graph::diagnostics::Diagnostics) alongside the
/// Model IR instead.
#[derive(Error, Debug)]
pub enum ModelgenError {
    #[error("unresolved reference '{reference}' at {pointer}")]
    UnresolvedRef { pointer: String, reference: String },

    #[error("reference chain at {pointer} never reaches a concrete schema")]
    RefChainLoop { pointer: String },

    #[error("naming exhausted for '{base}' at {pointer}: all disambiguation suffixes and counters taken")]
    NamingExhausted { base: String, pointer: String },

    #[error("duplicate definition name '{name}' ({first} and {second})")]
    DuplicateDefinition {
        name: String,
        first: String,
        second: String,
    },

    #[error("document root is not an object: {path}")]
    InvalidDocument { path: String },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no definitions found in {path}")]
    EmptyDocument { path: String },

    #[error("unknown generation mode: {0} (expected 'flatten' or 'expand')")]
    UnknownMode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
