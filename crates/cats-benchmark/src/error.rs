//! Error type for the evaluation crate.

use thiserror::Error;

/// Evaluation failures.
#[derive(Debug, Error)]
pub enum BenchError {
    /// More clusters requested for a page than it has passages.
    #[error("page {page}: requested {requested} clusters for {items} passages")]
    ClusterCount {
        page: String,
        requested: usize,
        items: usize,
    },

    /// Clustering input was structurally invalid.
    #[error("invalid clustering input: {message}")]
    InvalidClusterInput { message: String },

    /// Parallel per-page score lists disagree in length.
    #[error("page {page}: {pairs} pair keys but {labels} labels")]
    PairLabelMismatch {
        page: String,
        pairs: usize,
        labels: usize,
    },

    /// A statistics routine received unusable input.
    #[error("statistics error: {message}")]
    Stats { message: String },

    /// A ground-truth file could not be parsed.
    #[error("parse error in {path} line {line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    /// Failure bubbled up from the core pipeline.
    #[error(transparent)]
    Core(#[from] cats_core::CatsError),

    /// Tensor backend failure.
    #[error("tensor error: {message}")]
    Tensor { message: String },

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for the evaluation crate.
pub type BenchResult<T> = Result<T, BenchError>;

/// Map candle errors into [`BenchError::Tensor`].
pub(crate) fn map_candle(e: candle_core::Error) -> BenchError {
    BenchError::Tensor {
        message: e.to_string(),
    }
}
