//! Manhattan variant: base-style projections, scored by `exp(-L1)` between
//! the two concatenated passage representations. Output in (0, 1].

use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{map_candle, CatsResult};

use super::projection::{abs_diff, StackedProjection};
use super::split_blocks;

/// Exponentiated negative L1 distance between query-aware passage encodings.
#[derive(Debug)]
pub struct ManhattanScorer {
    emb_dim: usize,
    proj: StackedProjection,
}

impl ManhattanScorer {
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

    /// `[N, 3v] -> [N]` scores in (0, 1].
    pub fn forward(&self, features: &Tensor) -> CatsResult<Tensor> {
        let (q, p1, p2) = split_blocks(features, self.emb_dim)?;
        let zq = self.proj.project(&q)?;
        let zp1 = self.proj.project(&p1)?;
        let zp2 = self.proj.project(&p2)?;
        let r1 = Tensor::cat(&[&zp1, &abs_diff(&zp1, &zq)?], 1).map_err(map_candle)?;
        let r2 = Tensor::cat(&[&zp2, &abs_diff(&zp2, &zq)?], 1).map_err(map_candle)?;
        let l1 = abs_diff(&r1, &r2)?.sum(1).map_err(map_candle)?;
        l1.neg().map_err(map_candle)?.exp().map_err(map_candle)
    }

    pub fn named_vars(&self) -> Vec<(String, Var)> {
        self.proj.named_vars("proj")
    }
}
