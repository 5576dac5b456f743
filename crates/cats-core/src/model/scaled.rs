//! Scaled variant: the query is projected to a small rank, expanded back to
//! a per-dimension scale vector, and both passages are rescaled before a
//! cosine comparison.

use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{map_candle, CatsResult};

use super::projection::{batch_cosine, uniform_matrix, LinearVar};
use super::split_blocks;

/// Default rank of the query projection.
pub const DEFAULT_SCALE_RANK: usize = 32;

/// Query-conditioned rescaling followed by cosine similarity, in [-1, 1].
#[derive(Debug)]
pub struct ScaledScorer {
    emb_dim: usize,
    rank: usize,
    reduce: LinearVar,
    /// Rank-expansion matrix `[rank, v]`.
    expand: Var,
}

impl ScaledScorer {
    pub fn new(emb_dim: usize, seed: u64, device: &Device) -> CatsResult<Self> {
        Self::with_rank(emb_dim, DEFAULT_SCALE_RANK, seed, device)
    }

    pub fn with_rank(
        emb_dim: usize,
        rank: usize,
        seed: u64,
        device: &Device,
    ) -> CatsResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self {
            emb_dim,
            rank,
            reduce: LinearVar::new(emb_dim, rank, &mut rng, device)?,
            expand: uniform_matrix(&mut rng, rank, emb_dim, rank, device)?,
        })
    }

    pub fn emb_dim(&self) -> usize {
        self.emb_dim
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// `[N, 3v] -> [N]` cosine scores of the query-rescaled passages.
    pub fn forward(&self, features: &Tensor) -> CatsResult<Tensor> {
        let (q, p1, p2) = split_blocks(features, self.emb_dim)?;
        let scale = self
            .reduce
            .forward(&q)?
            .matmul(self.expand.as_tensor())
            .map_err(map_candle)?;
        let zp1 = (p1 * &scale).map_err(map_candle)?;
        let zp2 = (p2 * &scale).map_err(map_candle)?;
        batch_cosine(&zp1, &zp2)
    }

    pub fn named_vars(&self) -> Vec<(String, Var)> {
        let mut vars = self.reduce.named_vars("reduce");
        vars.push(("expand".to_string(), self.expand.clone()));
        vars
    }
}
