//! Shared building blocks of the scoring networks.
//!
//! All weights are `candle_core::Var`s so the optimizer and the checkpoint
//! layer see one flat list of named parameters. Initialization is driven by
//! an explicit seeded RNG on the host, so a given seed produces the same
//! weights on every device.

use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{map_candle, CatsResult};

/// Draw a `[rows, cols]` matrix uniformly from ±1/sqrt(fan_in).
pub(crate) fn uniform_matrix(
    rng: &mut StdRng,
    rows: usize,
    cols: usize,
    fan_in: usize,
    device: &Device,
) -> CatsResult<Var> {
    let bound = 1.0 / (fan_in as f32).sqrt();
    let data: Vec<f32> = (0..rows * cols)
        .map(|_| rng.gen_range(-bound..bound))
        .collect();
    let tensor = Tensor::from_vec(data, (rows, cols), device).map_err(map_candle)?;
    Var::from_tensor(&tensor).map_err(map_candle)
}

/// Draw a `[len]` vector uniformly from ±1/sqrt(fan_in).
pub(crate) fn uniform_vector(
    rng: &mut StdRng,
    len: usize,
    fan_in: usize,
    device: &Device,
) -> CatsResult<Var> {
    let bound = 1.0 / (fan_in as f32).sqrt();
    let data: Vec<f32> = (0..len).map(|_| rng.gen_range(-bound..bound)).collect();
    let tensor = Tensor::from_vec(data, (len,), device).map_err(map_candle)?;
    Var::from_tensor(&tensor).map_err(map_candle)
}

/// A dense layer with trainable weight `[in, out]` and bias `[out]`.
#[derive(Debug)]
pub struct LinearVar {
    weight: Var,
    bias: Var,
}

impl LinearVar {
    pub fn new(
        in_dim: usize,
        out_dim: usize,
        rng: &mut StdRng,
        device: &Device,
    ) -> CatsResult<Self> {
        Ok(Self {
            weight: uniform_matrix(rng, in_dim, out_dim, in_dim, device)?,
            bias: uniform_vector(rng, out_dim, in_dim, device)?,
        })
    }

    /// `x · W + b` for `x: [N, in]`.
    pub fn forward(&self, x: &Tensor) -> CatsResult<Tensor> {
        x.matmul(self.weight.as_tensor())
            .map_err(map_candle)?
            .broadcast_add(self.bias.as_tensor())
            .map_err(map_candle)
    }

    /// Named parameters under `prefix` (`<prefix>.weight`, `<prefix>.bias`).
    pub fn named_vars(&self, prefix: &str) -> Vec<(String, Var)> {
        vec![
            (format!("{prefix}.weight"), self.weight.clone()),
            (format!("{prefix}.bias"), self.bias.clone()),
        ]
    }
}

/// The shared two-layer transform: `relu(L2(L1(x)))`.
///
/// Rectification happens once, after the second layer. Both layers map
/// width v to width v.
#[derive(Debug)]
pub struct StackedProjection {
    l1: LinearVar,
    l2: LinearVar,
}

impl StackedProjection {
    pub fn new(dim: usize, rng: &mut StdRng, device: &Device) -> CatsResult<Self> {
        Ok(Self {
            l1: LinearVar::new(dim, dim, rng, device)?,
            l2: LinearVar::new(dim, dim, rng, device)?,
        })
    }

    pub fn project(&self, x: &Tensor) -> CatsResult<Tensor> {
        self.l2
            .forward(&self.l1.forward(x)?)?
            .relu()
            .map_err(map_candle)
    }

    pub fn named_vars(&self, prefix: &str) -> Vec<(String, Var)> {
        let mut vars = self.l1.named_vars(&format!("{prefix}.l1"));
        vars.extend(self.l2.named_vars(&format!("{prefix}.l2")));
        vars
    }
}

/// The triamese scoring head shared by the base and attention variants.
///
/// Projects query and both passages through one [`StackedProjection`],
/// concatenates `[zp1, zp2, |zp1-zp2|, |zp1-zq|, |zp2-zq|]` (width 5v), and
/// maps to a rectified scalar per row.
#[derive(Debug)]
pub struct ScoringHead {
    proj: StackedProjection,
    out: LinearVar,
}

impl ScoringHead {
    pub fn new(dim: usize, rng: &mut StdRng, device: &Device) -> CatsResult<Self> {
        Ok(Self {
            proj: StackedProjection::new(dim, rng, device)?,
            out: LinearVar::new(5 * dim, 1, rng, device)?,
        })
    }

    /// Score pooled vectors `q, p1, p2: [N, v]` into `[N]` non-negative scores.
    pub fn score(&self, q: &Tensor, p1: &Tensor, p2: &Tensor) -> CatsResult<Tensor> {
        let zq = self.proj.project(q)?;
        let zp1 = self.proj.project(p1)?;
        let zp2 = self.proj.project(p2)?;
        let zd = abs_diff(&zp1, &zp2)?;
        let zdq1 = abs_diff(&zp1, &zq)?;
        let zdq2 = abs_diff(&zp2, &zq)?;
        let z = Tensor::cat(&[&zp1, &zp2, &zd, &zdq1, &zdq2], 1).map_err(map_candle)?;
        self.out
            .forward(&z)?
            .relu()
            .map_err(map_candle)?
            .squeeze(1)
            .map_err(map_candle)
    }

    pub fn named_vars(&self, prefix: &str) -> Vec<(String, Var)> {
        let mut vars = self.proj.named_vars(&format!("{prefix}.proj"));
        vars.extend(self.out.named_vars(&format!("{prefix}.out")));
        vars
    }
}

/// `|a - b|` elementwise.
pub(crate) fn abs_diff(a: &Tensor, b: &Tensor) -> CatsResult<Tensor> {
    a.sub(b).map_err(map_candle)?.abs().map_err(map_candle)
}

/// Row-wise cosine similarity between `[N, v]` tensors, epsilon-guarded.
pub(crate) fn batch_cosine(a: &Tensor, b: &Tensor) -> CatsResult<Tensor> {
    let dot = (a * b).map_err(map_candle)?.sum(1).map_err(map_candle)?;
    let norm_a = a
        .sqr()
        .map_err(map_candle)?
        .sum(1)
        .map_err(map_candle)?
        .sqrt()
        .map_err(map_candle)?;
    let norm_b = b
        .sqr()
        .map_err(map_candle)?
        .sum(1)
        .map_err(map_candle)?
        .sqrt()
        .map_err(map_candle)?;
    let denom = (norm_a * norm_b).map_err(map_candle)?;
    let eps = Tensor::ones_like(&denom)
        .map_err(map_candle)?
        .affine(1e-6, 0.0)
        .map_err(map_candle)?;
    let denom = denom.add(&eps).map_err(map_candle)?;
    dot.div(&denom).map_err(map_candle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::SeedableRng;

    #[test]
    fn test_linear_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LinearVar::new(4, 3, &mut rng, &Device::Cpu).unwrap();
        let x = Tensor::zeros((5, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.dims(), &[5, 3]);
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let make = || {
            let mut rng = StdRng::seed_from_u64(11);
            LinearVar::new(4, 4, &mut rng, &Device::Cpu).unwrap()
        };
        let a = make().named_vars("l")[0].1.as_tensor().to_vec2::<f32>().unwrap();
        let b = make().named_vars("l")[0].1.as_tensor().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_head_output_shape_and_sign() {
        let mut rng = StdRng::seed_from_u64(3);
        let head = ScoringHead::new(6, &mut rng, &Device::Cpu).unwrap();
        let q = Tensor::rand(-1.0f32, 1.0, (4, 6), &Device::Cpu).unwrap();
        let p1 = Tensor::rand(-1.0f32, 1.0, (4, 6), &Device::Cpu).unwrap();
        let p2 = Tensor::rand(-1.0f32, 1.0, (4, 6), &Device::Cpu).unwrap();
        let s = head.score(&q, &p1, &p2).unwrap();
        assert_eq!(s.dims(), &[4]);
        for v in s.to_vec1::<f32>().unwrap() {
            assert!(v >= 0.0, "rectified head must be non-negative, got {v}");
        }
    }

    #[test]
    fn test_batch_cosine_of_identical_rows_is_one() {
        let a = Tensor::from_vec(vec![3.0f32, 4.0, 1.0, 0.0], (2, 2), &Device::Cpu).unwrap();
        let cos = batch_cosine(&a, &a).unwrap().to_vec1::<f32>().unwrap();
        for v in cos {
            assert!((v - 1.0).abs() < 1e-4, "cos(x, x) should be 1, got {v}");
        }
    }

    #[test]
    fn test_batch_cosine_zero_norm_guarded() {
        let a = Tensor::zeros((1, 3), candle_core::DType::F32, &Device::Cpu).unwrap();
        let cos = batch_cosine(&a, &a).unwrap().to_vec1::<f32>().unwrap();
        assert!(cos[0].abs() < 1e-6, "zero vectors must not produce NaN");
    }
}
