//! Pair dataset construction from labeled tuples and embedding stores.
//!
//! Three entry points, all producing `[.., 3v]` feature rows laid out as
//! `[query | passage A | passage B]` with the source vectors' f32 precision
//! preserved and no normalization applied:
//!
//! - [`PairDatasetBuilder::build_grouped`]: fixed-m cluster-grouped input,
//!   `[n, C(m,2), 3v]` features with match/mismatch labels.
//! - [`PairDatasetBuilder::build_flat`]: arbitrary labeled tuples,
//!   `[N, 3v]` features, skipping tuples whose IDs have no embedding.
//! - [`PairDatasetBuilder::build_page_pairs`]: the full combinatorial pair
//!   set for one page, with canonical `"<pidA>_<pidB>"` keys.

use std::collections::BTreeSet;

use candle_core::{Device, Tensor};
use tracing::{debug, warn};

use crate::error::{map_candle, CatsError, CatsResult};
use crate::store::VectorStore;

/// One labeled (query, passage A, passage B) tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPair {
    pub query_id: String,
    pub passage_a: String,
    pub passage_b: String,
    /// 1.0 = same ground-truth cluster, 0.0 = different. Continuous labels
    /// are accepted as-is.
    pub label: f32,
}

/// Cluster-grouped input for one query: parallel passage and label lists.
#[derive(Debug, Clone)]
pub struct GroupedPage {
    pub query_id: String,
    pub passages: Vec<String>,
    pub cluster_labels: Vec<String>,
}

/// Output of [`PairDatasetBuilder::build_flat`].
#[derive(Debug)]
pub struct FlatDataset {
    /// `[N, 3v]` feature matrix.
    pub features: Tensor,
    /// `[N]` label vector.
    pub labels: Tensor,
    /// Distinct query IDs that had no embedding (their tuples were skipped).
    pub missing_queries: Vec<String>,
    /// Distinct passage IDs that had no embedding (their tuples were skipped).
    pub missing_passages: Vec<String>,
}

/// Output of [`PairDatasetBuilder::build_grouped`].
#[derive(Debug)]
pub struct GroupedDataset {
    /// `[n, C(m,2), 3v]` feature tensor.
    pub features: Tensor,
    /// `[n, C(m,2)]` label tensor.
    pub labels: Tensor,
    /// Query IDs in row order.
    pub queries: Vec<String>,
    /// C(m,2) for the shared per-query passage count m.
    pub pairs_per_query: usize,
}

impl GroupedDataset {
    /// Collapse the per-query grouping into the flat `[n * C(m,2), 3v]`
    /// layout the trainer consumes.
    pub fn flatten(&self) -> CatsResult<(Tensor, Tensor)> {
        let (n, p, width) = self.features.dims3().map_err(map_candle)?;
        Ok((
            self.features
                .reshape((n * p, width))
                .map_err(map_candle)?,
            self.labels.reshape((n * p,)).map_err(map_candle)?,
        ))
    }
}

/// Builds numeric pair datasets from two embedding stores.
#[derive(Debug)]
pub struct PairDatasetBuilder<'a> {
    queries: &'a VectorStore,
    passages: &'a VectorStore,
    device: Device,
}

impl<'a> PairDatasetBuilder<'a> {
    /// Create a builder over a query store and a passage store.
    ///
    /// The two stores must agree on the embedding dimension.
    pub fn new(
        queries: &'a VectorStore,
        passages: &'a VectorStore,
        device: Device,
    ) -> CatsResult<Self> {
        if queries.dim() != passages.dim() {
            return Err(CatsError::DimensionMismatch {
                expected: queries.dim(),
                actual: passages.dim(),
            });
        }
        Ok(Self {
            queries,
            passages,
            device,
        })
    }

    /// Embedding dimension v shared by both stores.
    pub fn emb_dim(&self) -> usize {
        self.queries.dim()
    }

    /// Build the cluster-grouped dataset: one row of C(m,2) pairs per query.
    ///
    /// Every page must carry the same passage count m, and each page's
    /// passage and cluster-label lists must be parallel; violations abort the
    /// build. Pair (i, j) gets label 1.0 iff the two passages' cluster labels
    /// are equal. Pairs are enumerated in ascending (i, j) index order.
    pub fn build_grouped(&self, pages: &[GroupedPage]) -> CatsResult<GroupedDataset> {
        let first = pages.first().ok_or(CatsError::EmptyInput {
            what: "grouped pages",
        })?;
        let m = first.passages.len();
        for page in pages {
            if page.passages.len() != page.cluster_labels.len() {
                return Err(CatsError::GroupSizeMismatch {
                    query: page.query_id.clone(),
                    passages: page.passages.len(),
                    labels: page.cluster_labels.len(),
                });
            }
            if page.passages.len() != m {
                return Err(CatsError::UnevenGroups {
                    query: page.query_id.clone(),
                    expected: m,
                    actual: page.passages.len(),
                });
            }
        }
        if m < 2 {
            return Err(CatsError::EmptyInput {
                what: "passages per query (need at least 2)",
            });
        }

        let pair_indices = index_pairs(m);
        let v = self.emb_dim();
        let width = 3 * v;
        let mut features = Vec::with_capacity(pages.len() * pair_indices.len() * width);
        let mut labels: Vec<f32> = Vec::with_capacity(pages.len() * pair_indices.len());
        let mut queries = Vec::with_capacity(pages.len());

        for page in pages {
            let qvec = self.queries.get(&page.query_id)?;
            for &(i, j) in &pair_indices {
                features.extend_from_slice(qvec);
                features.extend_from_slice(self.passages.get(&page.passages[i])?);
                features.extend_from_slice(self.passages.get(&page.passages[j])?);
                let same = page.cluster_labels[i] == page.cluster_labels[j];
                labels.push(if same { 1.0 } else { 0.0 });
            }
            queries.push(page.query_id.clone());
        }

        let n = pages.len();
        let p = pair_indices.len();
        let features = Tensor::from_vec(features, (n, p, width), &self.device)
            .map_err(map_candle)?;
        let labels = Tensor::from_vec(labels, (n, p), &self.device).map_err(map_candle)?;
        debug!(queries = n, pairs_per_query = p, "grouped dataset built");
        Ok(GroupedDataset {
            features,
            labels,
            queries,
            pairs_per_query: p,
        })
    }

    /// Build the flat dataset from arbitrary labeled tuples.
    ///
    /// Tuples whose query or passage IDs have no embedding are skipped and
    /// the distinct missing IDs reported; this is the expected ID-namespace
    /// divergence between data sources, not corruption, so the rest of the
    /// batch proceeds.
    pub fn build_flat(&self, pairs: &[LabeledPair]) -> CatsResult<FlatDataset> {
        if pairs.is_empty() {
            return Err(CatsError::EmptyInput {
                what: "labeled pairs",
            });
        }
        let v = self.emb_dim();
        let width = 3 * v;
        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut missing_queries = BTreeSet::new();
        let mut missing_passages = BTreeSet::new();

        for pair in pairs {
            if !self.queries.contains(&pair.query_id) {
                missing_queries.insert(pair.query_id.clone());
                continue;
            }
            let mut absent = false;
            for pid in [&pair.passage_a, &pair.passage_b] {
                if !self.passages.contains(pid) {
                    missing_passages.insert(pid.clone());
                    absent = true;
                }
            }
            if absent {
                continue;
            }
            features.extend_from_slice(self.queries.get(&pair.query_id)?);
            features.extend_from_slice(self.passages.get(&pair.passage_a)?);
            features.extend_from_slice(self.passages.get(&pair.passage_b)?);
            labels.push(pair.label);
        }

        if !missing_queries.is_empty() {
            warn!(
                count = missing_queries.len(),
                "query ids in the pairs data have no embedding; their pairs were skipped"
            );
            for id in &missing_queries {
                debug!(id = id.as_str(), "missing query embedding");
            }
        }
        if !missing_passages.is_empty() {
            warn!(
                count = missing_passages.len(),
                "passage ids in the pairs data have no embedding; their pairs were skipped"
            );
            for id in &missing_passages {
                debug!(id = id.as_str(), "missing passage embedding");
            }
        }
        if labels.is_empty() {
            return Err(CatsError::EmptyInput {
                what: "labeled pairs after skipping missing ids",
            });
        }

        let n = labels.len();
        let features =
            Tensor::from_vec(features, (n, width), &self.device).map_err(map_candle)?;
        let labels = Tensor::from_vec(labels, (n,), &self.device).map_err(map_candle)?;
        Ok(FlatDataset {
            features,
            labels,
            missing_queries: missing_queries.into_iter().collect(),
            missing_passages: missing_passages.into_iter().collect(),
        })
    }

    /// Build the full unordered pair set for one page.
    ///
    /// `passage_ids` is an explicit, already deduplicated candidate list.
    /// Passages are sorted lexicographically and pairs enumerated (i < j)
    /// over the sorted list, so the returned `"<pidA>_<pidB>"` keys are
    /// reproducible and each unordered pair appears exactly once.
    pub fn build_page_pairs(
        &self,
        query_id: &str,
        passage_ids: &[String],
    ) -> CatsResult<(Tensor, Vec<String>)> {
        if passage_ids.len() < 2 {
            return Err(CatsError::EmptyInput {
                what: "page passages (need at least 2)",
            });
        }
        let mut sorted: Vec<&String> = passage_ids.iter().collect();
        sorted.sort();

        let qvec = self.queries.get(query_id)?;
        let v = self.emb_dim();
        let width = 3 * v;
        let pair_indices = index_pairs(sorted.len());
        let mut features = Vec::with_capacity(pair_indices.len() * width);
        let mut keys = Vec::with_capacity(pair_indices.len());

        for &(i, j) in &pair_indices {
            features.extend_from_slice(qvec);
            features.extend_from_slice(self.passages.get(sorted[i])?);
            features.extend_from_slice(self.passages.get(sorted[j])?);
            keys.push(format!("{}_{}", sorted[i], sorted[j]));
        }

        let features = Tensor::from_vec(features, (keys.len(), width), &self.device)
            .map_err(map_candle)?;
        Ok((features, keys))
    }
}

/// All unordered index pairs (i, j) with i < j, in ascending order.
pub fn index_pairs(m: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(m * m.saturating_sub(1) / 2);
    for i in 0..m {
        for j in (i + 1)..m {
            pairs.push((i, j));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis(dim: usize, hot: usize, scale: f32) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot % dim] = scale;
        v
    }

    fn stores(dim: usize) -> (VectorStore, VectorStore) {
        let qids = vec!["q1".to_string(), "q2".to_string()];
        let qrows = vec![basis(dim, 0, 1.0), basis(dim, 1, 1.0)];
        let pids: Vec<String> = (0..6).map(|i| format!("p{i}")).collect();
        let prows: Vec<Vec<f32>> = (0..6).map(|i| basis(dim, i, (i + 1) as f32)).collect();
        (
            VectorStore::from_rows(qids, qrows).unwrap(),
            VectorStore::from_rows(pids, prows).unwrap(),
        )
    }

    fn builder<'a>(
        q: &'a VectorStore,
        p: &'a VectorStore,
    ) -> PairDatasetBuilder<'a> {
        PairDatasetBuilder::new(q, p, Device::Cpu).unwrap()
    }

    #[test]
    fn test_index_pairs_count() {
        assert_eq!(index_pairs(4).len(), 6);
        assert_eq!(index_pairs(2), vec![(0, 1)]);
        assert!(index_pairs(1).is_empty());
    }

    #[test]
    fn test_grouped_labels_match_cluster_pattern() {
        // Labels [A, A, B, B] over pairs (0,1)..(2,3) must yield [1,0,0,0,0,1].
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        let pages = vec![GroupedPage {
            query_id: "q1".into(),
            passages: vec!["p0".into(), "p1".into(), "p2".into(), "p3".into()],
            cluster_labels: vec!["A".into(), "A".into(), "B".into(), "B".into()],
        }];
        let ds = b.build_grouped(&pages).unwrap();
        assert_eq!(ds.pairs_per_query, 6);
        assert_eq!(ds.features.dims(), &[1, 6, 12]);
        let labels = ds.labels.to_vec2::<f32>().unwrap();
        assert_eq!(labels[0], vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);

        let (flat_x, flat_y) = ds.flatten().unwrap();
        assert_eq!(flat_x.dims(), &[6, 12]);
        assert_eq!(
            flat_y.to_vec1::<f32>().unwrap(),
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_grouped_uneven_counts_rejected() {
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        let pages = vec![
            GroupedPage {
                query_id: "q1".into(),
                passages: vec!["p0".into(), "p1".into()],
                cluster_labels: vec!["A".into(), "B".into()],
            },
            GroupedPage {
                query_id: "q2".into(),
                passages: vec!["p0".into(), "p1".into(), "p2".into()],
                cluster_labels: vec!["A".into(), "B".into(), "B".into()],
            },
        ];
        let err = b.build_grouped(&pages).unwrap_err();
        assert!(matches!(err, CatsError::UnevenGroups { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_grouped_parallel_list_mismatch_rejected() {
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        let pages = vec![GroupedPage {
            query_id: "q1".into(),
            passages: vec!["p0".into(), "p1".into()],
            cluster_labels: vec!["A".into()],
        }];
        let err = b.build_grouped(&pages).unwrap_err();
        assert!(matches!(err, CatsError::GroupSizeMismatch { passages: 2, labels: 1, .. }));
    }

    #[test]
    fn test_flat_skips_missing_query_with_listing() {
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        let pairs = vec![
            LabeledPair {
                query_id: "q1".into(),
                passage_a: "p0".into(),
                passage_b: "p1".into(),
                label: 1.0,
            },
            LabeledPair {
                query_id: "enwiki:ghost".into(),
                passage_a: "p0".into(),
                passage_b: "p2".into(),
                label: 0.0,
            },
        ];
        let ds = b.build_flat(&pairs).unwrap();
        assert_eq!(ds.features.dims(), &[1, 12]);
        assert_eq!(ds.missing_queries, vec!["enwiki:ghost".to_string()]);
        assert!(ds.missing_passages.is_empty());
    }

    #[test]
    fn test_flat_feature_row_is_concatenation() {
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        let pairs = vec![LabeledPair {
            query_id: "q1".into(),
            passage_a: "p0".into(),
            passage_b: "p1".into(),
            label: 1.0,
        }];
        let ds = b.build_flat(&pairs).unwrap();
        let row = &ds.features.to_vec2::<f32>().unwrap()[0];
        let expected: Vec<f32> = [
            q.get("q1").unwrap(),
            p.get("p0").unwrap(),
            p.get("p1").unwrap(),
        ]
        .concat();
        assert_eq!(row, &expected);
    }

    #[test]
    fn test_flat_all_skipped_is_empty_input() {
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        let pairs = vec![LabeledPair {
            query_id: "nope".into(),
            passage_a: "p0".into(),
            passage_b: "p1".into(),
            label: 1.0,
        }];
        let err = b.build_flat(&pairs).unwrap_err();
        assert!(matches!(err, CatsError::EmptyInput { .. }));
    }

    #[test]
    fn test_page_pairs_canonical_keys() {
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        // Unsorted input; keys must come out over the sorted id list.
        let pids = vec!["p2".to_string(), "p0".to_string(), "p1".to_string()];
        let (features, keys) = b.build_page_pairs("q1", &pids).unwrap();
        assert_eq!(features.dims(), &[3, 12]);
        assert_eq!(keys, vec!["p0_p1", "p0_p2", "p1_p2"]);
    }

    #[test]
    fn test_page_pairs_single_passage_rejected() {
        let (q, p) = stores(4);
        let b = builder(&q, &p);
        let err = b
            .build_page_pairs("q1", &["p0".to_string()])
            .unwrap_err();
        assert!(matches!(err, CatsError::EmptyInput { .. }));
    }

    #[test]
    fn test_dimension_mismatch_between_stores() {
        let q = VectorStore::from_rows(vec!["q".into()], vec![vec![0.0; 4]]).unwrap();
        let p = VectorStore::from_rows(vec!["p".into()], vec![vec![0.0; 5]]).unwrap();
        let err = PairDatasetBuilder::new(&q, &p, Device::Cpu).unwrap_err();
        assert!(matches!(err, CatsError::DimensionMismatch { expected: 4, actual: 5 }));
    }
}
