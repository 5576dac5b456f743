//! Agglomerative clustering over a precomputed distance matrix.
//!
//! Average linkage: the distance between two clusters is the mean pairwise
//! distance between their members. Pages hold tens of passages, so the
//! naive merge loop is plenty.

use tracing::debug;

use crate::error::{BenchError, BenchResult};

/// Cluster `n` items into exactly `n_clusters` groups by repeatedly merging
/// the pair of clusters with the smallest average linkage.
///
/// `distances` must be a square symmetric matrix with a zero diagonal.
/// Returns one label per item; labels are dense and ordered by each final
/// cluster's smallest member index, so the assignment is deterministic.
pub fn average_linkage_labels(
    distances: &[Vec<f32>],
    n_clusters: usize,
) -> BenchResult<Vec<usize>> {
    let n = distances.len();
    if n == 0 {
        return Err(BenchError::InvalidClusterInput {
            message: "empty distance matrix".to_string(),
        });
    }
    for (i, row) in distances.iter().enumerate() {
        if row.len() != n {
            return Err(BenchError::InvalidClusterInput {
                message: format!("row {i} has {} entries in a {n}x{n} matrix", row.len()),
            });
        }
    }
    if n_clusters == 0 || n_clusters > n {
        return Err(BenchError::InvalidClusterInput {
            message: format!("cannot form {n_clusters} clusters from {n} items"),
        });
    }

    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    while clusters.len() > n_clusters {
        let mut best = (0usize, 1usize);
        let mut best_dist = f32::INFINITY;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let dist = average_distance(distances, &clusters[a], &clusters[b]);
                if dist < best_dist {
                    best_dist = dist;
                    best = (a, b);
                }
            }
        }
        let merged = clusters.swap_remove(best.1);
        clusters[best.0].extend(merged);
        debug!(
            remaining = clusters.len(),
            linkage = best_dist,
            "merged closest clusters"
        );
    }

    // Deterministic labeling: order clusters by smallest member.
    clusters.sort_by_key(|members| *members.iter().min().unwrap_or(&usize::MAX));
    let mut labels = vec![0usize; n];
    for (label, members) in clusters.iter().enumerate() {
        for &item in members {
            labels[item] = label;
        }
    }
    Ok(labels)
}

/// Mean pairwise distance between two member sets.
fn average_distance(distances: &[Vec<f32>], a: &[usize], b: &[usize]) -> f32 {
    let mut total = 0.0f32;
    for &i in a {
        for &j in b {
            total += distances[i][j];
        }
    }
    total / (a.len() * b.len()) as f32
}
