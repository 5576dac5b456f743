//! Query-embedding precomputation.
//!
//! The sentence-embedding model itself is an external collaborator behind
//! the [`SentenceEncoder`] trait; this module owns the deterministic ID
//! scheme and the dedup-then-encode-once bookkeeping around it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::CatsResult;

/// Fixed tag prefixed onto every hashed query ID.
pub const QUERY_ID_PREFIX: &str = "Query:";

/// Black-box sentence embedding: text in, dense vector out.
pub trait SentenceEncoder {
    /// Encode a batch of texts into equal-length vectors.
    fn encode(&self, texts: &[String]) -> CatsResult<Vec<Vec<f32>>>;
}

/// Deterministic content-hash ID for a raw query text.
///
/// The same text always maps to the same ID; collisions are astronomically
/// unlikely.
pub fn query_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut id = String::with_capacity(QUERY_ID_PREFIX.len() + digest.len() * 2);
    id.push_str(QUERY_ID_PREFIX);
    for byte in digest {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// A precomputed query embedding with its source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEmbedding {
    pub text: String,
    pub vector: Vec<f32>,
}

/// Deduplicate queries by content-hash ID, encode each unique text once,
/// and return ID → {text, vector}.
pub fn embed_queries<E: SentenceEncoder>(
    queries: &[String],
    encoder: &E,
) -> CatsResult<BTreeMap<String, QueryEmbedding>> {
    let mut ids = Vec::new();
    let mut unique_texts = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for text in queries {
        let id = query_id(text);
        if seen.insert(id.clone()) {
            ids.push(id);
            unique_texts.push(text.clone());
        }
    }
    info!(
        total = queries.len(),
        unique = unique_texts.len(),
        "embedding queries"
    );

    let vectors = encoder.encode(&unique_texts)?;
    let mut out = BTreeMap::new();
    for ((id, text), vector) in ids.into_iter().zip(unique_texts).zip(vectors) {
        out.insert(id, QueryEmbedding { text, vector });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEncoder;

    impl SentenceEncoder for CountingEncoder {
        fn encode(&self, texts: &[String]) -> CatsResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    #[test]
    fn test_query_id_is_deterministic_and_prefixed() {
        let a = query_id("green sea turtle");
        let b = query_id("green sea turtle");
        assert_eq!(a, b);
        assert!(a.starts_with(QUERY_ID_PREFIX));
        assert_ne!(a, query_id("green sea turtles"));
    }

    #[test]
    fn test_embed_queries_deduplicates() {
        let queries = vec![
            "solar power".to_string(),
            "wind power".to_string(),
            "solar power".to_string(),
        ];
        let embedded = embed_queries(&queries, &CountingEncoder).unwrap();
        assert_eq!(embedded.len(), 2);
        let entry = &embedded[&query_id("solar power")];
        assert_eq!(entry.text, "solar power");
        assert_eq!(entry.vector, vec![11.0, 1.0]);
    }
}
