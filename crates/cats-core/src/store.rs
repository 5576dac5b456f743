//! Read-only embedding lookup built from two parallel arrays.
//!
//! A [`VectorStore`] is constructed once per run from an ordered ID list and
//! a `[n, v]` matrix where row `i` belongs to ID `i`. Construction validates
//! the parallel-array contract; afterwards lookups go by ID value through an
//! index map built once, never by position.

use std::collections::HashMap;

use candle_core::Tensor;
use tracing::warn;

use crate::error::{map_candle, CatsError, CatsResult};

/// Read-only mapping from entity ID (query or passage) to embedding vector.
#[derive(Debug, Clone)]
pub struct VectorStore {
    ids: Vec<String>,
    /// Row-major `[len, dim]` storage.
    data: Vec<f32>,
    dim: usize,
    index: HashMap<String, usize>,
}

impl VectorStore {
    /// Build a store from an ID list and a `[len(ids), v]` f32 matrix.
    ///
    /// Fails with [`CatsError::ShapeMismatch`] when the ID count and the
    /// matrix row count differ. Duplicate IDs keep their first row; later
    /// occurrences are dropped with a warning.
    pub fn build(ids: Vec<String>, vectors: Tensor) -> CatsResult<Self> {
        let (rows, dim) = vectors.dims2().map_err(map_candle)?;
        if rows != ids.len() {
            return Err(CatsError::ShapeMismatch {
                ids: ids.len(),
                rows,
            });
        }
        if dim == 0 {
            return Err(CatsError::EmptyInput {
                what: "embedding dimension",
            });
        }
        let data = vectors
            .flatten_all()
            .map_err(map_candle)?
            .to_vec1::<f32>()
            .map_err(map_candle)?;

        let mut index = HashMap::with_capacity(ids.len());
        let mut duplicates = 0usize;
        for (i, id) in ids.iter().enumerate() {
            if index.contains_key(id.as_str()) {
                duplicates += 1;
            } else {
                index.insert(id.clone(), i);
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "duplicate ids in embedding table, keeping first occurrence");
        }

        Ok(Self {
            ids,
            data,
            dim,
            index,
        })
    }

    /// Build from row vectors instead of a tensor. Rows must share one length.
    pub fn from_rows(ids: Vec<String>, rows: Vec<Vec<f32>>) -> CatsResult<Self> {
        if ids.len() != rows.len() {
            return Err(CatsError::ShapeMismatch {
                ids: ids.len(),
                rows: rows.len(),
            });
        }
        let dim = rows.first().map(Vec::len).ok_or(CatsError::EmptyInput {
            what: "vector rows",
        })?;
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in &rows {
            if row.len() != dim {
                return Err(CatsError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        let mut index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            index.entry(id.clone()).or_insert(i);
        }
        Ok(Self {
            ids,
            data,
            dim,
            index,
        })
    }

    /// Look up the embedding for `id`.
    ///
    /// Returns [`CatsError::KeyNotFound`] for unknown IDs. Callers treat this
    /// as recoverable (log + skip): partial coverage across ID namespaces is
    /// an expected condition, not corruption.
    pub fn get(&self, id: &str) -> CatsResult<&[f32]> {
        let row = *self
            .index
            .get(id)
            .ok_or_else(|| CatsError::KeyNotFound {
                kind: "entity",
                id: id.to_string(),
            })?;
        Ok(&self.data[row * self.dim..(row + 1) * self.dim])
    }

    /// Whether `id` has a vector.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Embedding dimension `v`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored rows (including rows shadowed by duplicate IDs).
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The ID list in construction order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn store_of(ids: &[&str], rows: &[&[f32]]) -> VectorStore {
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let tensor =
            Tensor::from_vec(flat, (rows.len(), rows[0].len()), &Device::Cpu).unwrap();
        VectorStore::build(ids.iter().map(|s| s.to_string()).collect(), tensor).unwrap()
    }

    #[test]
    fn test_get_returns_positional_row() {
        let store = store_of(&["a", "b", "c"], &[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        assert_eq!(store.get("a").unwrap(), &[1.0, 2.0]);
        assert_eq!(store.get("c").unwrap(), &[5.0, 6.0]);
        assert_eq!(store.dim(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_missing_id_is_key_not_found() {
        let store = store_of(&["a"], &[&[1.0, 2.0]]);
        let err = store.get("zzz").unwrap_err();
        assert!(err.is_missing_key(), "expected KeyNotFound, got {err}");
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let tensor = Tensor::zeros((3, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        let err = VectorStore::build(vec!["only".into()], tensor).unwrap_err();
        assert!(matches!(err, CatsError::ShapeMismatch { ids: 1, rows: 3 }));
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let store = store_of(&["a", "a"], &[&[1.0, 1.0], &[9.0, 9.0]]);
        assert_eq!(store.get("a").unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_from_rows_ragged_rejected() {
        let err = VectorStore::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, CatsError::DimensionMismatch { expected: 2, actual: 1 }));
    }
}
