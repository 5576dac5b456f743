//! Self-describing checkpoints for the comparison networks.
//!
//! A checkpoint is a directory holding `weights.safetensors` plus a
//! `manifest.json` recording the format version, the architecture variant,
//! and the embedding dimension. Loading reads the manifest first and
//! constructs the matching architecture, so weights can never be silently
//! poured into the wrong variant.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use candle_core::{Device, Tensor, Var};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{map_candle, CatsError, CatsResult};

use super::attention::AttentionScorer;
use super::scaled::ScaledScorer;
use super::{ComparisonNetwork, Variant};

const WEIGHTS_FILE: &str = "weights.safetensors";
const MANIFEST_FILE: &str = "manifest.json";
const FORMAT_VERSION: u32 = 1;

/// Variant tag stored for the sequence-level attention architecture, which
/// lives outside the [`Variant`] enum.
const ATTENTION_TAG: &str = "attention";

/// Checkpoint sidecar describing what the weight file contains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub format_version: u32,
    pub variant: String,
    pub emb_dim: usize,
    /// Query-projection rank of the scaled variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_rank: Option<usize>,
    /// Hidden width of the attention variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attn_dim: Option<usize>,
}

impl CheckpointManifest {
    /// Read the manifest from a checkpoint directory.
    pub fn read(dir: &Path) -> CatsResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let manifest: CheckpointManifest = serde_json::from_reader(File::open(&path)?)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(CatsError::Checkpoint {
                message: format!(
                    "unsupported checkpoint format version {} (expected {})",
                    manifest.format_version, FORMAT_VERSION
                ),
            });
        }
        Ok(manifest)
    }
}

fn write_checkpoint(
    dir: &Path,
    manifest: &CheckpointManifest,
    vars: &[(String, Var)],
) -> CatsResult<()> {
    std::fs::create_dir_all(dir)?;
    let tensors: HashMap<String, Tensor> = vars
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
        .collect();
    candle_core::safetensors::save(&tensors, dir.join(WEIGHTS_FILE)).map_err(map_candle)?;
    serde_json::to_writer_pretty(File::create(dir.join(MANIFEST_FILE))?, manifest)?;
    info!(dir = %dir.display(), variant = manifest.variant.as_str(), "checkpoint saved");
    Ok(())
}

/// Fill `vars` from the checkpoint weight file, insisting on an exact match
/// between stored and expected tensor names and shapes.
fn restore_vars(dir: &Path, device: &Device, vars: &[(String, Var)]) -> CatsResult<()> {
    let mut stored =
        candle_core::safetensors::load(dir.join(WEIGHTS_FILE), device).map_err(map_candle)?;
    for (name, var) in vars {
        let tensor = stored.remove(name).ok_or_else(|| CatsError::Checkpoint {
            message: format!("missing tensor {name} in {}", dir.display()),
        })?;
        if tensor.dims() != var.as_tensor().dims() {
            return Err(CatsError::Checkpoint {
                message: format!(
                    "tensor {name} has shape {:?}, expected {:?}",
                    tensor.dims(),
                    var.as_tensor().dims()
                ),
            });
        }
        let tensor = tensor
            .to_dtype(candle_core::DType::F32)
            .map_err(map_candle)?;
        var.set(&tensor).map_err(map_candle)?;
    }
    if let Some(extra) = stored.keys().next() {
        return Err(CatsError::Checkpoint {
            message: format!("unexpected tensor {extra} in {}", dir.display()),
        });
    }
    Ok(())
}

impl ComparisonNetwork {
    /// Persist weights and manifest into `dir`.
    pub fn save(&self, dir: &Path) -> CatsResult<()> {
        let scale_rank = match self {
            ComparisonNetwork::Scaled(s) => Some(s.rank()),
            _ => None,
        };
        let manifest = CheckpointManifest {
            format_version: FORMAT_VERSION,
            variant: self.variant().as_str().to_string(),
            emb_dim: self.emb_dim(),
            scale_rank,
            attn_dim: None,
        };
        write_checkpoint(dir, &manifest, &self.named_vars())
    }

    /// Restore a network from `dir`, deciding the architecture from the
    /// manifest rather than from the caller.
    pub fn load(dir: &Path, device: &Device) -> CatsResult<Self> {
        let manifest = CheckpointManifest::read(dir)?;
        if manifest.variant == ATTENTION_TAG {
            return Err(CatsError::Checkpoint {
                message: format!(
                    "{} holds an attention checkpoint; load it with AttentionScorer::load",
                    dir.display()
                ),
            });
        }
        let variant = Variant::parse(&manifest.variant).ok_or_else(|| CatsError::Checkpoint {
            message: format!("unknown variant {:?} in manifest", manifest.variant),
        })?;
        let network = match (variant, manifest.scale_rank) {
            (Variant::Scaled, Some(rank)) => ComparisonNetwork::Scaled(
                ScaledScorer::with_rank(manifest.emb_dim, rank, 0, device)?,
            ),
            _ => ComparisonNetwork::new(variant, manifest.emb_dim, 0, device)?,
        };
        restore_vars(dir, device, &network.named_vars())?;
        info!(variant = %variant, emb_dim = manifest.emb_dim, "checkpoint loaded");
        Ok(network)
    }
}

impl AttentionScorer {
    /// Persist weights and manifest into `dir`.
    pub fn save(&self, dir: &Path) -> CatsResult<()> {
        let manifest = CheckpointManifest {
            format_version: FORMAT_VERSION,
            variant: ATTENTION_TAG.to_string(),
            emb_dim: self.emb_dim(),
            scale_rank: None,
            attn_dim: Some(self.attn_dim()),
        };
        write_checkpoint(dir, &manifest, &self.named_vars())
    }

    /// Restore an attention scorer from `dir`.
    pub fn load(dir: &Path, device: &Device) -> CatsResult<Self> {
        let manifest = CheckpointManifest::read(dir)?;
        if manifest.variant != ATTENTION_TAG {
            return Err(CatsError::Checkpoint {
                message: format!(
                    "{} holds a {:?} checkpoint, not an attention one",
                    dir.display(),
                    manifest.variant
                ),
            });
        }
        let attn_dim = manifest.attn_dim.ok_or_else(|| CatsError::Checkpoint {
            message: "attention manifest is missing attn_dim".to_string(),
        })?;
        let scorer = AttentionScorer::new(manifest.emb_dim, attn_dim, 0, device)?;
        restore_vars(dir, device, &scorer.named_vars())?;
        Ok(scorer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    const DIM: usize = 8;

    fn feature_batch(n: usize) -> Tensor {
        let data: Vec<f32> = (0..n * 3 * DIM)
            .map(|i| ((i as f32) * 0.19).sin())
            .collect();
        Tensor::from_vec(data, (n, 3 * DIM), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_outputs() {
        let x = feature_batch(5);
        for variant in [
            Variant::Triamese,
            Variant::Scaled,
            Variant::QueryScaler,
            Variant::Manhattan,
        ] {
            let dir = tempfile::tempdir().unwrap();
            let net = ComparisonNetwork::new(variant, DIM, 99, &Device::Cpu).unwrap();
            let before = net.forward(&x).unwrap().to_vec1::<f32>().unwrap();

            net.save(dir.path()).unwrap();
            let restored = ComparisonNetwork::load(dir.path(), &Device::Cpu).unwrap();
            assert_eq!(restored.variant(), variant);
            let after = restored.forward(&x).unwrap().to_vec1::<f32>().unwrap();
            assert_eq!(before, after, "round trip must be exact for {variant}");
        }
    }

    #[test]
    fn test_manifest_names_variant() {
        let dir = tempfile::tempdir().unwrap();
        let net = ComparisonNetwork::new(Variant::Manhattan, DIM, 1, &Device::Cpu).unwrap();
        net.save(dir.path()).unwrap();
        let manifest = CheckpointManifest::read(dir.path()).unwrap();
        assert_eq!(manifest.variant, "manhattan");
        assert_eq!(manifest.emb_dim, DIM);
    }

    #[test]
    fn test_scaled_custom_rank_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let net = ComparisonNetwork::Scaled(
            super::ScaledScorer::with_rank(DIM, 8, 5, &Device::Cpu).unwrap(),
        );
        let x = feature_batch(3);
        let before = net.forward(&x).unwrap().to_vec1::<f32>().unwrap();
        net.save(dir.path()).unwrap();

        let manifest = CheckpointManifest::read(dir.path()).unwrap();
        assert_eq!(manifest.scale_rank, Some(8));
        let restored = ComparisonNetwork::load(dir.path(), &Device::Cpu).unwrap();
        let after = restored.forward(&x).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_attention_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = AttentionScorer::new(DIM, 16, 7, &Device::Cpu).unwrap();
        scorer.save(dir.path()).unwrap();
        let restored = AttentionScorer::load(dir.path(), &Device::Cpu).unwrap();
        assert_eq!(restored.emb_dim(), DIM);
        assert_eq!(restored.attn_dim(), 16);

        // Pooled-variant loader must refuse an attention checkpoint.
        let err = ComparisonNetwork::load(dir.path(), &Device::Cpu).unwrap_err();
        assert!(matches!(err, CatsError::Checkpoint { .. }));
    }

    #[test]
    fn test_missing_checkpoint_dir_errors() {
        let err = ComparisonNetwork::load(Path::new("/nonexistent/ckpt"), &Device::Cpu);
        assert!(err.is_err());
    }
}
