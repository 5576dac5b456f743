//! Context-Aware Text Similarity (CATS).
//!
//! Pairwise similarity between short text passages conditioned on a query,
//! for clustering retrieved passages into topical groups. This crate holds
//! the data side and the model side of the pipeline:
//!
//! - **VectorStore**: read-only ID → embedding lookup built from two
//!   parallel arrays, validated at construction.
//! - **PairDatasetBuilder**: labeled (query, passage, passage) tuples plus
//!   embedding tables → fixed-shape feature tensors.
//! - **ComparisonNetwork**: the CATS scoring family (triamese base, scaled,
//!   query-scaler, Manhattan, and the sequence-level attention strategy),
//!   with self-describing checkpoints.
//! - **Trainer**: mini-batch MSE regression with a held-out validation
//!   prefix, periodic AUC reporting, and untrained distance baselines.
//!
//! Clustering-based evaluation lives in the companion `cats-benchmark`
//! crate.

pub mod config;
pub mod dataset;
pub mod embedder;
pub mod error;
pub mod io;
pub mod model;
pub mod store;
pub mod training;

pub use config::{ComputeDevice, RunConfig};
pub use dataset::{
    FlatDataset, GroupedDataset, GroupedPage, LabeledPair, PairDatasetBuilder,
};
pub use error::{CatsError, CatsResult};
pub use model::{ComparisonNetwork, Variant};
pub use store::VectorStore;
pub use training::{TrainConfig, Trainer};
