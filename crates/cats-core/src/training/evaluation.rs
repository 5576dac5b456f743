//! Training-time evaluation: ROC AUC, min-max normalization, and the
//! cosine/Euclidean baselines computed from the raw feature blocks.

use candle_core::Tensor;

use crate::error::{map_candle, CatsError, CatsResult};
use crate::model::projection::batch_cosine;

/// Rank-based ROC AUC of `scores` against binary labels (`> 0.5` = positive).
///
/// Trapezoidal accumulation over the score-sorted ROC curve. Degenerate
/// inputs (empty, single class) return 0.5.
pub fn roc_auc(scores: &[f32], labels: &[f32]) -> f64 {
    if scores.len() != labels.len() || scores.is_empty() {
        return 0.5;
    }
    let mut indexed: Vec<(f32, bool)> = scores
        .iter()
        .zip(labels.iter())
        .map(|(&s, &l)| (s, l > 0.5))
        .collect();
    indexed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let n_pos = indexed.iter().filter(|(_, p)| *p).count() as f64;
    let n_neg = indexed.len() as f64 - n_pos;
    if n_pos < f64::EPSILON || n_neg < f64::EPSILON {
        return 0.5;
    }

    let mut auc = 0.0;
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut prev_tp = 0.0;
    let mut prev_fp = 0.0;
    for (_, is_positive) in indexed {
        if is_positive {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        auc += (fp - prev_fp) * (tp + prev_tp) / 2.0;
        prev_tp = tp;
        prev_fp = fp;
    }
    auc / (n_pos * n_neg)
}

/// Min-max normalize into [0, 1].
///
/// A constant input (min == max) maps to 0.5 everywhere instead of dividing
/// by zero.
pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    let range = max - min;
    if values.is_empty() || range <= f32::EPSILON {
        return vec![0.5; values.len()];
    }
    values.iter().map(|&v| (v - min) / range).collect()
}

/// AUC of the untrained distance baselines on a `[N, 3v]` feature matrix.
#[derive(Debug, Clone)]
pub struct BaselineReport {
    /// AUC of raw cosine similarity between the two passage blocks.
    pub cosine_auc: f64,
    /// AUC of inverted min-max-normalized Euclidean distance.
    pub euclidean_auc: f64,
}

/// Compute the cosine and Euclidean baselines directly from the unprocessed
/// passage embeddings inside `features`.
///
/// Euclidean distances are unbounded, so they are min-max normalized to
/// [0, 1] and inverted (`1 - d`) before the AUC so that, as for every other
/// scored quantity, higher means "same cluster".
pub fn baseline_aucs(
    features: &Tensor,
    labels: &Tensor,
    emb_dim: usize,
) -> CatsResult<BaselineReport> {
    let (_, width) = features.dims2().map_err(map_candle)?;
    if width != 3 * emb_dim {
        return Err(CatsError::DimensionMismatch {
            expected: 3 * emb_dim,
            actual: width,
        });
    }
    let p1 = features.narrow(1, emb_dim, emb_dim).map_err(map_candle)?;
    let p2 = features
        .narrow(1, 2 * emb_dim, emb_dim)
        .map_err(map_candle)?;
    let y = labels.to_vec1::<f32>().map_err(map_candle)?;

    let cos = batch_cosine(&p1, &p2)?.to_vec1::<f32>().map_err(map_candle)?;
    let cosine_auc = roc_auc(&cos, &y);

    let dist = p1
        .sub(&p2)
        .map_err(map_candle)?
        .sqr()
        .map_err(map_candle)?
        .sum(1)
        .map_err(map_candle)?
        .sqrt()
        .map_err(map_candle)?
        .to_vec1::<f32>()
        .map_err(map_candle)?;
    let sims: Vec<f32> = min_max_normalize(&dist).iter().map(|d| 1.0 - d).collect();
    let euclidean_auc = roc_auc(&sims, &y);

    Ok(BaselineReport {
        cosine_auc,
        euclidean_auc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_auc_perfect_ranking_is_one() {
        let scores = [0.9f32, 0.8, 0.2, 0.1];
        let labels = [1.0f32, 1.0, 0.0, 0.0];
        assert!((roc_auc(&scores, &labels) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_auc_inverted_ranking_is_zero() {
        let scores = [0.1f32, 0.2, 0.8, 0.9];
        let labels = [1.0f32, 1.0, 0.0, 0.0];
        assert!(roc_auc(&scores, &labels) < 1e-12);
    }

    #[test]
    fn test_auc_single_class_is_half() {
        let scores = [0.9f32, 0.1];
        let labels = [1.0f32, 1.0];
        assert_eq!(roc_auc(&scores, &labels), 0.5);
    }

    #[test]
    fn test_min_max_constant_input() {
        let out = min_max_normalize(&[2.0, 2.0, 2.0]);
        assert_eq!(out, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_min_max_spans_unit_interval() {
        let out = min_max_normalize(&[1.0, 3.0, 2.0]);
        assert_eq!(out, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_baselines_separate_obvious_pairs() {
        // Positive pair: identical passages. Negative pair: orthogonal ones.
        let v = 4;
        let q = vec![0.5f32; v];
        let a = vec![1.0f32, 0.0, 0.0, 0.0];
        let b = vec![0.0f32, 1.0, 0.0, 0.0];
        let mut rows = Vec::new();
        rows.extend([q.clone(), a.clone(), a.clone()].concat()); // same → label 1
        rows.extend([q.clone(), a.clone(), b.clone()].concat()); // differ → label 0
        let features = Tensor::from_vec(rows, (2, 3 * v), &Device::Cpu).unwrap();
        let labels = Tensor::from_vec(vec![1.0f32, 0.0], (2,), &Device::Cpu).unwrap();

        let report = baseline_aucs(&features, &labels, v).unwrap();
        assert_eq!(report.cosine_auc, 1.0);
        assert_eq!(report.euclidean_auc, 1.0);
    }
}
