//! Clustering agreement metrics.

use std::collections::HashMap;
use std::hash::Hash;

/// Map arbitrary labels onto dense 0..k indices, preserving first-seen order.
pub fn encode_labels<T: Eq + Hash>(labels: &[T]) -> Vec<usize> {
    let mut codes: HashMap<&T, usize> = HashMap::new();
    labels
        .iter()
        .map(|l| {
            let next = codes.len();
            *codes.entry(l).or_insert(next)
        })
        .collect()
}

/// Adjusted Rand Index between two partitions of the same item set.
///
/// Chance-corrected: 1 = identical partitions, ~0 = random agreement,
/// negative = worse than random. Empty or mismatched inputs yield 0.
pub fn adjusted_rand_index(cluster_labels: &[usize], true_labels: &[usize]) -> f64 {
    if cluster_labels.is_empty() || cluster_labels.len() != true_labels.len() {
        return 0.0;
    }
    let n = cluster_labels.len();

    let mut contingency: HashMap<(usize, usize), usize> = HashMap::new();
    let mut row_sums: HashMap<usize, usize> = HashMap::new();
    let mut col_sums: HashMap<usize, usize> = HashMap::new();
    for (&cluster, &class) in cluster_labels.iter().zip(true_labels.iter()) {
        *contingency.entry((cluster, class)).or_insert(0) += 1;
        *row_sums.entry(cluster).or_insert(0) += 1;
        *col_sums.entry(class).or_insert(0) += 1;
    }

    let sum_comb_ij: f64 = contingency.values().map(|&x| comb2(x)).sum();
    let sum_comb_a: f64 = row_sums.values().map(|&x| comb2(x)).sum();
    let sum_comb_b: f64 = col_sums.values().map(|&x| comb2(x)).sum();
    let comb_n = comb2(n);

    let expected = sum_comb_a * sum_comb_b / comb_n;
    let max_index = 0.5 * (sum_comb_a + sum_comb_b);
    let denom = max_index - expected;
    if denom.abs() < f64::EPSILON {
        // Both partitions are all-singletons or one cluster; treat exact
        // agreement as 1, anything else as 0.
        return if cluster_labels_match(cluster_labels, true_labels) {
            1.0
        } else {
            0.0
        };
    }
    (sum_comb_ij - expected) / denom
}

/// Whether two labelings induce the same partition (up to renaming).
fn cluster_labels_match(a: &[usize], b: &[usize]) -> bool {
    encode_labels(a) == encode_labels(b)
}

/// C(n, 2) as f64.
fn comb2(n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        (n * (n - 1)) as f64 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ari_perfect() {
        let a = vec![0, 0, 0, 1, 1, 1];
        let b = vec![1, 1, 1, 0, 0, 0];
        assert!((adjusted_rand_index(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ari_one_misplaced() {
        let a = vec![0, 0, 1, 1, 1, 1];
        let b = vec![0, 0, 0, 1, 1, 1];
        let ari = adjusted_rand_index(&a, &b);
        assert!(ari > 0.0 && ari < 1.0, "partial agreement, got {ari}");
    }

    #[test]
    fn test_ari_independent_is_near_zero() {
        let a = vec![0, 1, 0, 1, 0, 1, 0, 1];
        let b = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let ari = adjusted_rand_index(&a, &b);
        assert!(ari.abs() < 0.35, "independent partitions should be near 0, got {ari}");
    }

    #[test]
    fn test_ari_empty_and_mismatched() {
        assert_eq!(adjusted_rand_index(&[], &[]), 0.0);
        assert_eq!(adjusted_rand_index(&[0], &[0, 1]), 0.0);
    }

    #[test]
    fn test_ari_all_singletons_identical() {
        let a = vec![0, 1, 2, 3];
        let b = vec![3, 2, 1, 0];
        assert_eq!(adjusted_rand_index(&a, &b), 1.0);
    }

    #[test]
    fn test_encode_labels_first_seen_order() {
        let labels = vec!["b", "a", "b", "c"];
        assert_eq!(encode_labels(&labels), vec![0, 1, 0, 2]);
    }
}
