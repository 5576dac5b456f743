//! Clustering-based evaluation of pairwise scores.
//!
//! For every page the network's pair scores are arranged into a symmetric
//! zero-diagonal matrix, min-max normalized per page, converted to
//! distances, clustered with average linkage at the ground-truth cluster
//! count, and compared against the true partition via Adjusted Rand Index.
//! Cosine and Euclidean baselines run through the identical protocol, and
//! paired t-tests compare the model's per-page ARI against each baseline
//! over the same page ordering.

use std::collections::{BTreeMap, HashMap};

use candle_core::{Device, Tensor};
use tracing::{info, warn};

use cats_core::embedder::query_id;
use cats_core::model::ComparisonNetwork;
use cats_core::training::{min_max_normalize, roc_auc};
use cats_core::{PairDatasetBuilder, VectorStore};

use crate::baselines::{cosine_similarity, euclidean_distance};
use crate::clustering::average_linkage_labels;
use crate::error::{map_candle, BenchError, BenchResult};
use crate::loader::PagePairs;
use crate::metrics::clustering::{adjusted_rand_index, encode_labels};
use crate::metrics::stats::{paired_t_test, TTestResult};

/// Whether a raw pairwise matrix holds similarities or distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    /// Higher = more alike; converted to distance via `1 - normalized`.
    Similarity,
    /// Higher = further apart; only normalized.
    Distance,
}

/// Arrange per-pair scores into a symmetric matrix over the page's sorted
/// passage ordering. Entry (i, j) is filled from the `"<idA>_<idB>"` key of
/// the sorted pair and mirrored; the diagonal stays 0.
pub fn symmetric_from_pair_scores(
    sorted_ids: &[String],
    keys: &[String],
    scores: &[f32],
) -> BenchResult<Vec<Vec<f32>>> {
    if keys.len() != scores.len() {
        return Err(BenchError::InvalidClusterInput {
            message: format!("{} pair keys but {} scores", keys.len(), scores.len()),
        });
    }
    let by_key: HashMap<&str, f32> = keys
        .iter()
        .map(String::as_str)
        .zip(scores.iter().copied())
        .collect();
    let n = sorted_ids.len();
    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let forward = format!("{}_{}", sorted_ids[i], sorted_ids[j]);
            let backward = format!("{}_{}", sorted_ids[j], sorted_ids[i]);
            let score = by_key
                .get(forward.as_str())
                .or_else(|| by_key.get(backward.as_str()))
                .copied()
                .ok_or_else(|| BenchError::InvalidClusterInput {
                    message: format!("no score for pair {forward}"),
                })?;
            matrix[i][j] = score;
            matrix[j][i] = score;
        }
    }
    Ok(matrix)
}

/// Min-max normalize the off-diagonal entries of one page's matrix
/// independently of every other page, then orient as a distance matrix.
///
/// A constant matrix normalizes to 0.5 everywhere off the diagonal rather
/// than dividing by zero. The diagonal is always exactly 0.
pub fn to_distance_matrix(raw: &[Vec<f32>], kind: ScoreKind) -> Vec<Vec<f32>> {
    let n = raw.len();
    let mut off_diag = Vec::with_capacity(n * n.saturating_sub(1));
    for (i, row) in raw.iter().enumerate() {
        for (j, &value) in row.iter().enumerate() {
            if i != j {
                off_diag.push(value);
            }
        }
    }
    let normalized = min_max_normalize(&off_diag);
    let mut matrix = vec![vec![0.0f32; n]; n];
    let mut cursor = 0;
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let value = normalized[cursor];
            cursor += 1;
            matrix[i][j] = match kind {
                ScoreKind::Similarity => 1.0 - value,
                ScoreKind::Distance => value,
            };
        }
    }
    matrix
}

/// Per-page evaluation outcome.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: String,
    pub passages: usize,
    pub clusters: usize,
    pub model_ari: f64,
    pub cosine_ari: f64,
    pub euclidean_ari: f64,
}

/// Aggregated clustering evaluation.
#[derive(Debug, Clone)]
pub struct ClusterEvalReport {
    pub pages: Vec<PageResult>,
    pub mean_model_ari: f64,
    pub mean_cosine_ari: f64,
    pub mean_euclidean_ari: f64,
    /// Paired t-test of per-page ARI, model vs cosine (None with < 2 pages).
    pub model_vs_cosine: Option<TTestResult>,
    /// Paired t-test of per-page ARI, model vs Euclidean.
    pub model_vs_euclidean: Option<TTestResult>,
}

/// Per-page AUC over an explicit parapairs list.
#[derive(Debug, Clone)]
pub struct ParapairsReport {
    pub pages: Vec<(String, f64)>,
    pub mean_auc: f64,
}

/// Runs the clustering evaluation protocol for one network.
pub struct ClusterEvaluator<'a> {
    network: &'a ComparisonNetwork,
    queries: &'a VectorStore,
    passages: &'a VectorStore,
    builder: PairDatasetBuilder<'a>,
    device: Device,
}

impl<'a> ClusterEvaluator<'a> {
    pub fn new(
        network: &'a ComparisonNetwork,
        queries: &'a VectorStore,
        passages: &'a VectorStore,
        device: Device,
    ) -> BenchResult<Self> {
        let builder = PairDatasetBuilder::new(queries, passages, device.clone())?;
        Ok(Self {
            network,
            queries,
            passages,
            builder,
            device,
        })
    }

    /// Evaluate every page against one ground-truth granularity.
    ///
    /// `page_paras` maps page name → passage list; `para_labels` maps
    /// passage → section label. Pages whose query embedding, passage
    /// embeddings, or labels are missing are skipped with a diagnostic;
    /// a page demanding more clusters than it has passages aborts with an
    /// error naming the page.
    pub fn evaluate_pages(
        &self,
        page_paras: &BTreeMap<String, Vec<String>>,
        para_labels: &HashMap<String, String>,
    ) -> BenchResult<ClusterEvalReport> {
        let mut pages = Vec::new();
        for (page, paras) in page_paras {
            match self.evaluate_page(page, paras, para_labels)? {
                Some(result) => {
                    info!(
                        page = page.as_str(),
                        ari = result.model_ari,
                        cosine = result.cosine_ari,
                        euclidean = result.euclidean_ari,
                        "page clustered"
                    );
                    pages.push(result);
                }
                None => continue,
            }
        }
        if pages.is_empty() {
            return Err(BenchError::InvalidClusterInput {
                message: "no evaluable pages".to_string(),
            });
        }

        let model: Vec<f64> = pages.iter().map(|p| p.model_ari).collect();
        let cosine: Vec<f64> = pages.iter().map(|p| p.cosine_ari).collect();
        let euclid: Vec<f64> = pages.iter().map(|p| p.euclidean_ari).collect();
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let (model_vs_cosine, model_vs_euclidean) = if pages.len() >= 2 {
            (
                Some(paired_t_test(&model, &cosine)?),
                Some(paired_t_test(&model, &euclid)?),
            )
        } else {
            (None, None)
        };

        Ok(ClusterEvalReport {
            mean_model_ari: mean(&model),
            mean_cosine_ari: mean(&cosine),
            mean_euclidean_ari: mean(&euclid),
            model_vs_cosine,
            model_vs_euclidean,
            pages,
        })
    }

    fn evaluate_page(
        &self,
        page: &str,
        paras: &[String],
        para_labels: &HashMap<String, String>,
    ) -> BenchResult<Option<PageResult>> {
        if paras.len() < 2 {
            warn!(page, passages = paras.len(), "page too small to cluster, skipping");
            return Ok(None);
        }
        let qid = query_id(page);
        if !self.queries.contains(&qid) {
            warn!(page, "page query has no embedding, skipping");
            return Ok(None);
        }

        // Canonical page ordering: lexicographically sorted passage IDs.
        let mut sorted = paras.to_vec();
        sorted.sort();

        let mut true_labels = Vec::with_capacity(sorted.len());
        let mut vectors = Vec::with_capacity(sorted.len());
        for pid in &sorted {
            match (para_labels.get(pid), self.passages.get(pid)) {
                (Some(label), Ok(vector)) => {
                    true_labels.push(label.clone());
                    vectors.push(vector);
                }
                (None, _) => {
                    warn!(page, passage = pid.as_str(), "passage has no ground-truth label, skipping page");
                    return Ok(None);
                }
                (_, Err(_)) => {
                    warn!(page, passage = pid.as_str(), "passage has no embedding, skipping page");
                    return Ok(None);
                }
            }
        }

        let encoded_truth = encode_labels(&true_labels);
        let n_clusters = encoded_truth.iter().max().map(|m| m + 1).unwrap_or(0);
        if n_clusters > sorted.len() {
            return Err(BenchError::ClusterCount {
                page: page.to_string(),
                requested: n_clusters,
                items: sorted.len(),
            });
        }

        // Model scores over every unordered pair.
        let (features, keys) = self.builder.build_page_pairs(&qid, &sorted)?;
        let scores = self
            .network
            .forward(&features)?
            .to_vec1::<f32>()
            .map_err(map_candle)?;
        let model_raw = symmetric_from_pair_scores(&sorted, &keys, &scores)?;
        let model_dist = to_distance_matrix(&model_raw, ScoreKind::Similarity);

        // Baselines from the raw passage embeddings, same protocol.
        let n = sorted.len();
        let mut cosine_raw = vec![vec![0.0f32; n]; n];
        let mut euclid_raw = vec![vec![0.0f32; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let cos = cosine_similarity(vectors[i], vectors[j]);
                let euc = euclidean_distance(vectors[i], vectors[j]);
                cosine_raw[i][j] = cos;
                cosine_raw[j][i] = cos;
                euclid_raw[i][j] = euc;
                euclid_raw[j][i] = euc;
            }
        }
        let cosine_dist = to_distance_matrix(&cosine_raw, ScoreKind::Similarity);
        let euclid_dist = to_distance_matrix(&euclid_raw, ScoreKind::Distance);

        let model_pred = average_linkage_labels(&model_dist, n_clusters)?;
        let cosine_pred = average_linkage_labels(&cosine_dist, n_clusters)?;
        let euclid_pred = average_linkage_labels(&euclid_dist, n_clusters)?;

        Ok(Some(PageResult {
            page: page.to_string(),
            passages: n,
            clusters: n_clusters,
            model_ari: adjusted_rand_index(&model_pred, &encoded_truth),
            cosine_ari: adjusted_rand_index(&cosine_pred, &encoded_truth),
            euclidean_ari: adjusted_rand_index(&euclid_pred, &encoded_truth),
        }))
    }

    /// Per-page balanced AUC over an explicit parapairs listing: score each
    /// listed pair and rank against its binary label.
    pub fn parapairs_auc(
        &self,
        parapairs: &BTreeMap<String, PagePairs>,
    ) -> BenchResult<ParapairsReport> {
        let v = self.builder.emb_dim();
        let mut pages = Vec::new();
        for (page, page_pairs) in parapairs {
            let qid = query_id(page);
            let qvec = match self.queries.get(&qid) {
                Ok(vec) => vec,
                Err(_) => {
                    warn!(page = page.as_str(), "page query has no embedding, skipping");
                    continue;
                }
            };

            let mut rows = Vec::new();
            let mut labels = Vec::new();
            let mut skipped = 0usize;
            for (key, &label) in page_pairs.parapairs.iter().zip(page_pairs.labels.iter()) {
                let Some((a, b)) = key.split_once('_') else {
                    skipped += 1;
                    continue;
                };
                match (self.passages.get(a), self.passages.get(b)) {
                    (Ok(va), Ok(vb)) => {
                        rows.extend_from_slice(qvec);
                        rows.extend_from_slice(va);
                        rows.extend_from_slice(vb);
                        labels.push(label);
                    }
                    _ => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(page = page.as_str(), skipped, "pairs without embeddings skipped");
            }
            if labels.is_empty() {
                continue;
            }

            let features = Tensor::from_vec(rows, (labels.len(), 3 * v), &self.device)
                .map_err(map_candle)?;
            let scores = self
                .network
                .forward(&features)?
                .to_vec1::<f32>()
                .map_err(map_candle)?;
            pages.push((page.clone(), roc_auc(&scores, &labels)));
        }
        if pages.is_empty() {
            return Err(BenchError::InvalidClusterInput {
                message: "no evaluable parapairs pages".to_string(),
            });
        }
        let mean_auc = pages.iter().map(|(_, auc)| auc).sum::<f64>() / pages.len() as f64;
        Ok(ParapairsReport { pages, mean_auc })
    }
}
