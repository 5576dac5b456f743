//! Training loop, optimizer, and training-time evaluation.

pub mod evaluation;
pub mod optimizer;
pub mod trainer;

pub use evaluation::{baseline_aucs, min_max_normalize, roc_auc, BaselineReport};
pub use optimizer::{Adam, AdamConfig};
pub use trainer::{ProgressRecord, TestReport, TrainConfig, Trainer, TrainingHistory};
