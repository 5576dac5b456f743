//! File-format glue for the offline pipeline.
//!
//! Embedding tables are a JSON array of IDs next to an `.npy` f32 matrix,
//! loaded whole into memory. Labeled pairs come from tab-separated text with
//! one header line. Built feature tensors can be cached to `.npy` and
//! reloaded to skip dataset construction on repeat runs.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use tracing::{info, warn};

use crate::dataset::LabeledPair;
use crate::embedder::query_id;
use crate::error::{map_candle, CatsError, CatsResult};
use crate::store::VectorStore;

/// Load one embedding table: a JSON ID array plus an `.npy` vector matrix.
pub fn load_embedding_table(
    ids_path: &Path,
    vectors_path: &Path,
    device: &Device,
) -> CatsResult<VectorStore> {
    let ids: Vec<String> = serde_json::from_reader(BufReader::new(File::open(ids_path)?))?;
    let vectors = Tensor::read_npy(vectors_path)
        .map_err(map_candle)?
        .to_dtype(DType::F32)
        .map_err(map_candle)?
        .to_device(device)
        .map_err(map_candle)?;
    info!(
        ids = ids.len(),
        path = %vectors_path.display(),
        "embedding table loaded"
    );
    VectorStore::build(ids, vectors)
}

/// Read labeled pairs from tab-separated text.
///
/// The first line is a header and is skipped. Expected columns: query ID,
/// passage A, passage B, integer label. Malformed lines are skipped with a
/// warning rather than aborting the run.
pub fn read_pairs_tsv(path: &Path) -> CatsResult<Vec<LabeledPair>> {
    let reader = BufReader::new(File::open(path)?);
    let mut pairs = Vec::new();
    let mut malformed = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line_no == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            malformed += 1;
            continue;
        }
        let label: f32 = match fields[3].trim().parse::<i64>() {
            Ok(v) => v as f32,
            Err(_) => {
                malformed += 1;
                continue;
            }
        };
        pairs.push(LabeledPair {
            query_id: fields[0].trim().to_string(),
            passage_a: fields[1].trim().to_string(),
            passage_b: fields[2].trim().to_string(),
            label,
        });
    }
    if malformed > 0 {
        warn!(malformed, path = %path.display(), "skipped malformed pair lines");
    }
    if pairs.is_empty() {
        return Err(CatsError::EmptyInput {
            what: "labeled pairs file",
        });
    }
    Ok(pairs)
}

/// Rewrite a pairs TSV whose first column is raw query text into the hashed
/// query-ID form. The header line passes through untouched. Returns the
/// number of rewritten rows.
pub fn rewrite_pairs_with_query_ids(input: &Path, output: &Path) -> CatsResult<usize> {
    let reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);
    let mut rewritten = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line_no == 0 {
            writeln!(writer, "{line}")?;
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(CatsError::Parse {
                path: input.display().to_string(),
                line: line_no + 1,
                message: format!("expected 4 tab-separated columns, got {}", fields.len()),
            });
        }
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            query_id(fields[0]),
            fields[1],
            fields[2],
            fields[3]
        )?;
        rewritten += 1;
    }
    Ok(rewritten)
}

/// Cache a built (features, labels) pair under `dir` as `X_<name>.npy` and
/// `y_<name>.npy`.
pub fn save_feature_cache(
    dir: &Path,
    name: &str,
    features: &Tensor,
    labels: &Tensor,
) -> CatsResult<()> {
    std::fs::create_dir_all(dir)?;
    features
        .write_npy(dir.join(format!("X_{name}.npy")))
        .map_err(map_candle)?;
    labels
        .write_npy(dir.join(format!("y_{name}.npy")))
        .map_err(map_candle)?;
    Ok(())
}

/// Load a cached (features, labels) pair written by [`save_feature_cache`].
pub fn load_feature_cache(
    dir: &Path,
    name: &str,
    device: &Device,
) -> CatsResult<(Tensor, Tensor)> {
    let features = Tensor::read_npy(dir.join(format!("X_{name}.npy")))
        .map_err(map_candle)?
        .to_device(device)
        .map_err(map_candle)?;
    let labels = Tensor::read_npy(dir.join(format!("y_{name}.npy")))
        .map_err(map_candle)?
        .to_device(device)
        .map_err(map_candle)?;
    Ok((features, labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ids_path = dir.path().join("ids.json");
        let vecs_path = dir.path().join("vecs.npy");

        serde_json::to_writer(File::create(&ids_path).unwrap(), &vec!["a", "b"]).unwrap();
        let matrix =
            Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], (2, 2), &Device::Cpu).unwrap();
        matrix.write_npy(&vecs_path).unwrap();

        let store = load_embedding_table(&ids_path, &vecs_path, &Device::Cpu).unwrap();
        assert_eq!(store.get("b").unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_read_pairs_tsv_skips_header_and_junk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.tsv");
        std::fs::write(
            &path,
            "query\tp1\tp2\tlabel\nQ1\tpa\tpb\t1\nbroken line\nQ2\tpc\tpd\t0\n",
        )
        .unwrap();
        let pairs = read_pairs_tsv(&path).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].query_id, "Q1");
        assert_eq!(pairs[0].label, 1.0);
        assert_eq!(pairs[1].label, 0.0);
    }

    #[test]
    fn test_rewrite_replaces_query_text() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.tsv");
        let output = dir.path().join("hashed.tsv");
        std::fs::write(&input, "query\tp1\tp2\tlabel\nsea turtles\tpa\tpb\t1\n").unwrap();

        let n = rewrite_pairs_with_query_ids(&input, &output).unwrap();
        assert_eq!(n, 1);
        let text = std::fs::read_to_string(&output).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with(&query_id("sea turtles")));
        assert!(row.ends_with("pa\tpb\t1"));
    }

    #[test]
    fn test_feature_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let x = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), &Device::Cpu)
            .unwrap();
        let y = Tensor::from_vec(vec![1.0f32, 0.0], (2,), &Device::Cpu).unwrap();
        save_feature_cache(dir.path(), "train", &x, &y).unwrap();
        let (x2, y2) = load_feature_cache(dir.path(), "train", &Device::Cpu).unwrap();
        assert_eq!(x2.to_vec2::<f32>().unwrap(), x.to_vec2::<f32>().unwrap());
        assert_eq!(y2.to_vec1::<f32>().unwrap(), y.to_vec1::<f32>().unwrap());
    }
}
