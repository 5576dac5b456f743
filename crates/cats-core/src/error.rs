//! Error type for the CATS pipeline.
//!
//! # Error Categories
//!
//! | Category | Variants | Recovery Strategy |
//! |----------|----------|-------------------|
//! | Contract | ShapeMismatch, GroupSizeMismatch, UnevenGroups, DimensionMismatch | Fix upstream data |
//! | Lookup | KeyNotFound | Skip the affected example/page, continue |
//! | Checkpoint | Checkpoint | Fix variant/path, reload |
//! | Infrastructure | Tensor, Io, Json | Retry or fix environment |
//!
//! Contract violations abort the whole operation. `KeyNotFound` is the one
//! recoverable condition: upstream ID namespaces are known to diverge
//! partially, so callers log the missing IDs and keep going.

use thiserror::Error;

/// Error type for all CATS pipeline failures.
#[derive(Debug, Error)]
pub enum CatsError {
    // === Contract violations ===
    /// ID list and vector matrix disagree on row count.
    #[error("Shape mismatch: {ids} ids but {rows} vector rows")]
    ShapeMismatch { ids: usize, rows: usize },

    /// A query group's passage list and cluster-label list differ in length.
    #[error("Group size mismatch for query {query}: {passages} passages vs {labels} cluster labels")]
    GroupSizeMismatch {
        query: String,
        passages: usize,
        labels: usize,
    },

    /// Cluster-grouped input requires every query to carry the same passage count.
    #[error("Uneven groups: query {query} has {actual} passages, expected {expected}")]
    UnevenGroups {
        query: String,
        expected: usize,
        actual: usize,
    },

    /// Embedding vector dimension mismatch.
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Empty input where at least one element is required.
    #[error("Empty input: {what}")]
    EmptyInput { what: &'static str },

    // === Lookup (recoverable) ===
    /// Entity ID has no embedding vector. Callers log and skip.
    #[error("{kind} id not found: {id}")]
    KeyNotFound { kind: &'static str, id: String },

    // === Checkpoint ===
    /// Checkpoint save/load failure (missing tensor, variant mismatch, bad manifest).
    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    // === Infrastructure ===
    /// Tensor backend operation failed.
    #[error("Tensor error: {message}")]
    Tensor { message: String },

    /// A data file could not be parsed.
    #[error("Parse error in {path} line {line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type CatsResult<T> = Result<T, CatsError>;

impl CatsError {
    /// Whether the error is the recoverable missing-key condition.
    pub fn is_missing_key(&self) -> bool {
        matches!(self, CatsError::KeyNotFound { .. })
    }
}

/// Map candle errors into [`CatsError::Tensor`].
pub(crate) fn map_candle(e: candle_core::Error) -> CatsError {
    CatsError::Tensor {
        message: e.to_string(),
    }
}
