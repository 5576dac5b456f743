//! The CATS comparison-network family.
//!
//! One capability, a pairwise score from a `[query | passage A | passage B]`
//! feature row, with each architecture as an independent strategy behind the
//! [`ComparisonNetwork`] tagged enum. Shared sub-transforms (the two-layer
//! rectified projection, the triamese scoring head) are composed components,
//! not inherited state. The sequence-level [`attention::AttentionScorer`]
//! lives outside the enum: it consumes masked token/sentence matrices rather
//! than pooled vectors and shares only the scoring head.
//!
//! All variants are deterministic at inference time; randomness exists only
//! in seeded weight initialization.

pub mod attention;
mod checkpoint;
mod manhattan;
pub mod projection;
mod query_scaler;
mod scaled;
mod triamese;

pub use attention::{AttentionScorer, SequenceBatch, DEFAULT_ATTENTION_DIM};
pub use checkpoint::CheckpointManifest;
pub use manhattan::ManhattanScorer;
pub use query_scaler::QueryScalerScorer;
pub use scaled::{ScaledScorer, DEFAULT_SCALE_RANK};
pub use triamese::TriameseScorer;

use candle_core::{Device, Tensor, Var};
use serde::{Deserialize, Serialize};

use crate::error::{map_candle, CatsError, CatsResult};

/// Architecture tag for the pooled-vector variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    Triamese,
    Scaled,
    QueryScaler,
    Manhattan,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Triamese => "triamese",
            Variant::Scaled => "scaled",
            Variant::QueryScaler => "query-scaler",
            Variant::Manhattan => "manhattan",
        }
    }

    /// Parse a CLI/manifest tag. The short aliases `triam` and `qscale`
    /// are accepted too.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "triamese" | "triam" => Some(Variant::Triamese),
            "scaled" => Some(Variant::Scaled),
            "query-scaler" | "qscale" => Some(Variant::QueryScaler),
            "manhattan" => Some(Variant::Manhattan),
            _ => None,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pooled-vector pairwise comparison network.
#[derive(Debug)]
pub enum ComparisonNetwork {
    Triamese(TriameseScorer),
    Scaled(ScaledScorer),
    QueryScaler(QueryScalerScorer),
    Manhattan(ManhattanScorer),
}

impl ComparisonNetwork {
    /// Construct a freshly initialized network of the given variant.
    pub fn new(
        variant: Variant,
        emb_dim: usize,
        seed: u64,
        device: &Device,
    ) -> CatsResult<Self> {
        Ok(match variant {
            Variant::Triamese => Self::Triamese(TriameseScorer::new(emb_dim, seed, device)?),
            Variant::Scaled => Self::Scaled(ScaledScorer::new(emb_dim, seed, device)?),
            Variant::QueryScaler => {
                Self::QueryScaler(QueryScalerScorer::new(emb_dim, seed, device)?)
            }
            Variant::Manhattan => Self::Manhattan(ManhattanScorer::new(emb_dim, seed, device)?),
        })
    }

    pub fn variant(&self) -> Variant {
        match self {
            Self::Triamese(_) => Variant::Triamese,
            Self::Scaled(_) => Variant::Scaled,
            Self::QueryScaler(_) => Variant::QueryScaler,
            Self::Manhattan(_) => Variant::Manhattan,
        }
    }

    pub fn emb_dim(&self) -> usize {
        match self {
            Self::Triamese(s) => s.emb_dim(),
            Self::Scaled(s) => s.emb_dim(),
            Self::QueryScaler(s) => s.emb_dim(),
            Self::Manhattan(s) => s.emb_dim(),
        }
    }

    /// Score a `[N, 3v]` feature batch into `[N]` pairwise scores.
    pub fn forward(&self, features: &Tensor) -> CatsResult<Tensor> {
        match self {
            Self::Triamese(s) => s.forward(features),
            Self::Scaled(s) => s.forward(features),
            Self::QueryScaler(s) => s.forward(features),
            Self::Manhattan(s) => s.forward(features),
        }
    }

    /// All trainable parameters with stable names for the optimizer and
    /// checkpoints. Clones share storage with the network weights.
    pub fn named_vars(&self) -> Vec<(String, Var)> {
        match self {
            Self::Triamese(s) => s.named_vars(),
            Self::Scaled(s) => s.named_vars(),
            Self::QueryScaler(s) => s.named_vars(),
            Self::Manhattan(s) => s.named_vars(),
        }
    }
}

/// Split a `[N, 3v]` feature batch into its query, passage-A, and passage-B
/// blocks. Fails when the feature width is not exactly 3v.
pub(crate) fn split_blocks(
    features: &Tensor,
    emb_dim: usize,
) -> CatsResult<(Tensor, Tensor, Tensor)> {
    let (_, width) = features.dims2().map_err(map_candle)?;
    if width != 3 * emb_dim {
        return Err(CatsError::DimensionMismatch {
            expected: 3 * emb_dim,
            actual: width,
        });
    }
    let q = features.narrow(1, 0, emb_dim).map_err(map_candle)?;
    let p1 = features.narrow(1, emb_dim, emb_dim).map_err(map_candle)?;
    let p2 = features
        .narrow(1, 2 * emb_dim, emb_dim)
        .map_err(map_candle)?;
    Ok((q, p1, p2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    const DIM: usize = 8;

    fn feature_batch(n: usize) -> Tensor {
        let data: Vec<f32> = (0..n * 3 * DIM)
            .map(|i| ((i as f32) * 0.37).sin())
            .collect();
        Tensor::from_vec(data, (n, 3 * DIM), &Device::Cpu).unwrap()
    }

    fn all_variants() -> Vec<Variant> {
        vec![
            Variant::Triamese,
            Variant::Scaled,
            Variant::QueryScaler,
            Variant::Manhattan,
        ]
    }

    #[test]
    fn test_forward_shapes() {
        let x = feature_batch(5);
        for variant in all_variants() {
            let net = ComparisonNetwork::new(variant, DIM, 42, &Device::Cpu).unwrap();
            let scores = net.forward(&x).unwrap();
            assert_eq!(scores.dims(), &[5], "variant {variant} shape");
        }
    }

    #[test]
    fn test_forward_is_deterministic() {
        let x = feature_batch(4);
        for variant in all_variants() {
            let net = ComparisonNetwork::new(variant, DIM, 42, &Device::Cpu).unwrap();
            let a = net.forward(&x).unwrap().to_vec1::<f32>().unwrap();
            let b = net.forward(&x).unwrap().to_vec1::<f32>().unwrap();
            assert_eq!(a, b, "variant {variant} must be deterministic at inference");
        }
    }

    #[test]
    fn test_score_ranges() {
        let x = feature_batch(6);
        let triamese = ComparisonNetwork::new(Variant::Triamese, DIM, 1, &Device::Cpu).unwrap();
        for s in triamese.forward(&x).unwrap().to_vec1::<f32>().unwrap() {
            assert!(s >= 0.0, "triamese scores are rectified, got {s}");
        }
        for variant in [Variant::Scaled, Variant::QueryScaler] {
            let net = ComparisonNetwork::new(variant, DIM, 1, &Device::Cpu).unwrap();
            for s in net.forward(&x).unwrap().to_vec1::<f32>().unwrap() {
                assert!(
                    (-1.0 - 1e-4..=1.0 + 1e-4).contains(&s),
                    "{variant} cosine scores must lie in [-1, 1], got {s}"
                );
            }
        }
        let manhattan = ComparisonNetwork::new(Variant::Manhattan, DIM, 1, &Device::Cpu).unwrap();
        for s in manhattan.forward(&x).unwrap().to_vec1::<f32>().unwrap() {
            assert!(s > 0.0 && s <= 1.0 + 1e-4, "manhattan scores lie in (0, 1], got {s}");
        }
    }

    #[test]
    fn test_wrong_feature_width_rejected() {
        let bad = Tensor::zeros((2, 3 * DIM + 1), candle_core::DType::F32, &Device::Cpu).unwrap();
        let net = ComparisonNetwork::new(Variant::Triamese, DIM, 42, &Device::Cpu).unwrap();
        let err = net.forward(&bad).unwrap_err();
        assert!(matches!(err, CatsError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_variant_parse_aliases() {
        assert_eq!(Variant::parse("triam"), Some(Variant::Triamese));
        assert_eq!(Variant::parse("qscale"), Some(Variant::QueryScaler));
        assert_eq!(Variant::parse("scaled"), Some(Variant::Scaled));
        assert_eq!(Variant::parse("nonsense"), None);
    }

    #[test]
    fn test_seed_changes_weights() {
        let x = feature_batch(3);
        let a = ComparisonNetwork::new(Variant::Triamese, DIM, 1, &Device::Cpu).unwrap();
        let b = ComparisonNetwork::new(Variant::Triamese, DIM, 2, &Device::Cpu).unwrap();
        let ya = a.forward(&x).unwrap().to_vec1::<f32>().unwrap();
        let yb = b.forward(&x).unwrap().to_vec1::<f32>().unwrap();
        assert_ne!(ya, yb, "different seeds should give different networks");
    }
}
