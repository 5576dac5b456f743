//! Base triamese variant: shared projection over query and both passages,
//! absolute-difference features, rectified linear scoring head.

use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::CatsResult;

use super::projection::ScoringHead;
use super::split_blocks;

/// Non-negative, unbounded pairwise scores from pooled embeddings.
#[derive(Debug)]
pub struct TriameseScorer {
    emb_dim: usize,
    head: ScoringHead,
}

impl TriameseScorer {
    pub fn new(emb_dim: usize, seed: u64, device: &Device) -> CatsResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self {
            emb_dim,
            head: ScoringHead::new(emb_dim, &mut rng, device)?,
        })
    }

    pub fn emb_dim(&self) -> usize {
        self.emb_dim
    }

    /// `[N, 3v] -> [N]`.
    pub fn forward(&self, features: &Tensor) -> CatsResult<Tensor> {
        let (q, p1, p2) = split_blocks(features, self.emb_dim)?;
        self.head.score(&q, &p1, &p2)
    }

    pub fn named_vars(&self) -> Vec<(String, Var)> {
        self.head.named_vars("head")
    }
}
