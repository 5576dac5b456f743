//! Clustering-based evaluation for CATS pairwise scores.
//!
//! Turns a trained comparison network's per-pair scores into full
//! per-page distance matrices, runs average-linkage agglomerative
//! clustering against ground-truth section counts, and reports Adjusted
//! Rand Index per page and in aggregate for the model and for the
//! cosine/Euclidean baselines, together with paired t-tests between them.

pub mod baselines;
pub mod clustering;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod metrics;

pub use clustering::average_linkage_labels;
pub use error::{BenchError, BenchResult};
pub use evaluator::{
    ClusterEvalReport, ClusterEvaluator, PageResult, ParapairsReport, ScoreKind,
};
pub use loader::{read_article_qrels, read_parapairs, read_section_qrels, PagePairs};
pub use metrics::{adjusted_rand_index, paired_t_test, TTestResult};
