//! Evaluation metrics: clustering agreement and significance testing.
//!
//! Rank/classification metrics (ROC AUC, min-max normalization) live in
//! `cats_core::training::evaluation` and are reused here rather than
//! duplicated.

pub mod clustering;
pub mod stats;

pub use clustering::{adjusted_rand_index, encode_labels};
pub use stats::{paired_t_test, TTestResult};
