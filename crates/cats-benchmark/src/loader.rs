//! Ground-truth and pair-list loaders.
//!
//! - Article qrels: whitespace-separated, column 0 = page, column 2 =
//!   passage ID; defines which passages belong to each page.
//! - Section qrels: same layout, column 0 = section label; defines the
//!   ground-truth cluster for each passage at one granularity.
//! - Parapairs: JSON mapping page name → parallel pair-key and label lists.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BenchError, BenchResult};

/// Page → ordered, deduplicated passage list.
pub fn read_article_qrels(path: &Path) -> BenchResult<BTreeMap<String, Vec<String>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut pages: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(BenchError::Parse {
                path: path.display().to_string(),
                line: line_no + 1,
                message: format!("expected at least 3 columns, got {}", fields.len()),
            });
        }
        let paras = pages.entry(fields[0].to_string()).or_default();
        let pid = fields[2];
        if !paras.iter().any(|p| p == pid) {
            paras.push(pid.to_string());
        }
    }
    info!(pages = pages.len(), path = %path.display(), "article qrels loaded");
    Ok(pages)
}

/// Passage → section label at one ground-truth granularity.
pub fn read_section_qrels(path: &Path) -> BenchResult<HashMap<String, String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut labels = HashMap::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(BenchError::Parse {
                path: path.display().to_string(),
                line: line_no + 1,
                message: format!("expected at least 3 columns, got {}", fields.len()),
            });
        }
        labels.insert(fields[2].to_string(), fields[0].to_string());
    }
    info!(passages = labels.len(), path = %path.display(), "section qrels loaded");
    Ok(labels)
}

/// Pair keys and parallel binary labels for one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePairs {
    /// `"<pidA>_<pidB>"` keys.
    pub parapairs: Vec<String>,
    /// Parallel integer labels (1 = same cluster).
    pub labels: Vec<f32>,
}

/// Read a parapairs JSON file: page name → [`PagePairs`].
pub fn read_parapairs(path: &Path) -> BenchResult<BTreeMap<String, PagePairs>> {
    let pages: BTreeMap<String, PagePairs> =
        serde_json::from_reader(BufReader::new(File::open(path)?))?;
    for (page, pairs) in &pages {
        if pairs.parapairs.len() != pairs.labels.len() {
            return Err(BenchError::PairLabelMismatch {
                page: page.clone(),
                pairs: pairs.parapairs.len(),
                labels: pairs.labels.len(),
            });
        }
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_qrels_groups_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("article.qrels");
        std::fs::write(
            &path,
            "PageA 0 p1 1\nPageA 0 p2 1\nPageA 0 p1 1\nPageB 0 p3 1\n",
        )
        .unwrap();
        let pages = read_article_qrels(&path).unwrap();
        assert_eq!(pages["PageA"], vec!["p1", "p2"]);
        assert_eq!(pages["PageB"], vec!["p3"]);
    }

    #[test]
    fn test_section_qrels_maps_passage_to_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.qrels");
        std::fs::write(&path, "PageA/Intro 0 p1 1\nPageA/History 0 p2 1\n").unwrap();
        let labels = read_section_qrels(&path).unwrap();
        assert_eq!(labels["p1"], "PageA/Intro");
        assert_eq!(labels["p2"], "PageA/History");
    }

    #[test]
    fn test_short_line_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.qrels");
        std::fs::write(&path, "PageA p1\n").unwrap();
        assert!(matches!(
            read_article_qrels(&path).unwrap_err(),
            BenchError::Parse { line: 1, .. }
        ));
    }

    #[test]
    fn test_parapairs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parapairs.json");
        std::fs::write(
            &path,
            r#"{"PageA": {"parapairs": ["p1_p2", "p1_p3"], "labels": [1, 0]}}"#,
        )
        .unwrap();
        let pages = read_parapairs(&path).unwrap();
        assert_eq!(pages["PageA"].parapairs.len(), 2);
        assert_eq!(pages["PageA"].labels, vec![1.0, 0.0]);
    }

    #[test]
    fn test_parapairs_length_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parapairs.json");
        std::fs::write(
            &path,
            r#"{"PageA": {"parapairs": ["p1_p2"], "labels": [1, 0]}}"#,
        )
        .unwrap();
        assert!(matches!(
            read_parapairs(&path).unwrap_err(),
            BenchError::PairLabelMismatch { .. }
        ));
    }
}
