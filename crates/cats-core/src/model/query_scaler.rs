//! QueryScaler variant: a full-width rectified transform of the query is
//! used as an elementwise scale on both passages before cosine comparison.

use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{map_candle, CatsResult};

use super::projection::{batch_cosine, StackedProjection};
use super::split_blocks;

/// Query-derived elementwise scaling with cosine scoring, in [-1, 1].
#[derive(Debug)]
pub struct QueryScalerScorer {
    emb_dim: usize,
    proj: StackedProjection,
}

impl QueryScalerScorer {
    pub fn new(emb_dim: usize, seed: u64, device: &Device) -> CatsResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self {
            emb_dim,
            proj: StackedProjection::new(emb_dim, &mut rng, device)?,
        })
    }

    pub fn emb_dim(&self) -> usize {
        self.emb_dim
    }

    /// `[N, 3v] -> [N]`.
    pub fn forward(&self, features: &Tensor) -> CatsResult<Tensor> {
        let (q, p1, p2) = split_blocks(features, self.emb_dim)?;
        let scale = self.proj.project(&q)?;
        let zp1 = (p1 * &scale).map_err(map_candle)?;
        let zp2 = (p2 * &scale).map_err(map_candle)?;
        batch_cosine(&zp1, &zp2)
    }

    pub fn named_vars(&self) -> Vec<(String, Var)> {
        self.proj.named_vars("proj")
    }
}
