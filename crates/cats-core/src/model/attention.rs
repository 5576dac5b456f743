//! Sequence-level attention variant.
//!
//! Operates on per-position passage vectors with a validity mask instead of
//! pooled embeddings: an additive attention conditioned on the query weighs
//! the positions, the weighted sum becomes the pooled passage vector, and
//! scoring reuses the triamese [`ScoringHead`].
//!
//! Masking semantics: the validity bit multiplies the raw attention score
//! (not the logit), and the exponential normalization runs over all
//! positions. Masked positions therefore contribute `exp(0)` weight.

use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{map_candle, CatsError, CatsResult};

use super::projection::{uniform_matrix, ScoringHead};

/// Default width of the additive-attention hidden layer.
pub const DEFAULT_ATTENTION_DIM: usize = 32;

/// One batch of sequence-level inputs.
///
/// `query`: `[b, v]`. Each passage: `[b, v, s]` position vectors with a
/// `[b, s]` validity mask (1.0 = real position, 0.0 = padding).
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    pub query: Tensor,
    pub passage_a: Tensor,
    pub mask_a: Tensor,
    pub passage_b: Tensor,
    pub mask_b: Tensor,
}

impl SequenceBatch {
    /// Validate that all members agree on batch size, width, and length.
    pub fn validate(&self, emb_dim: usize) -> CatsResult<()> {
        let (b, v) = self.query.dims2().map_err(map_candle)?;
        if v != emb_dim {
            return Err(CatsError::DimensionMismatch {
                expected: emb_dim,
                actual: v,
            });
        }
        for (p, mask) in [
            (&self.passage_a, &self.mask_a),
            (&self.passage_b, &self.mask_b),
        ] {
            let (pb, pv, ps) = p.dims3().map_err(map_candle)?;
            let (mb, ms) = mask.dims2().map_err(map_candle)?;
            if pb != b || mb != b {
                return Err(CatsError::DimensionMismatch {
                    expected: b,
                    actual: if pb != b { pb } else { mb },
                });
            }
            if pv != emb_dim {
                return Err(CatsError::DimensionMismatch {
                    expected: emb_dim,
                    actual: pv,
                });
            }
            if ms != ps {
                return Err(CatsError::DimensionMismatch {
                    expected: ps,
                    actual: ms,
                });
            }
        }
        Ok(())
    }
}

/// Additive-attention pooling plus the shared triamese scoring head.
#[derive(Debug)]
pub struct AttentionScorer {
    emb_dim: usize,
    attn_dim: usize,
    /// Additive attention weights `[2v, n]` over the concatenated
    /// (query, position) vector.
    wa: Var,
    /// Attention output vector `[n, 1]`.
    va: Var,
    head: ScoringHead,
}

impl AttentionScorer {
    pub fn new(
        emb_dim: usize,
        attn_dim: usize,
        seed: u64,
        device: &Device,
    ) -> CatsResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Self {
            emb_dim,
            attn_dim,
            wa: uniform_matrix(&mut rng, 2 * emb_dim, attn_dim, 2 * emb_dim, device)?,
            va: uniform_matrix(&mut rng, attn_dim, 1, attn_dim, device)?,
            head: ScoringHead::new(emb_dim, &mut rng, device)?,
        })
    }

    pub fn emb_dim(&self) -> usize {
        self.emb_dim
    }

    pub fn attn_dim(&self) -> usize {
        self.attn_dim
    }

    /// Pool one passage: `tanh([q; p]·Wa)·va` scores, validity-multiplied,
    /// exp-normalized, then the weighted position sum.
    fn pool(&self, q: &Tensor, p: &Tensor, mask: &Tensor) -> CatsResult<Tensor> {
        let (b, v, s) = p.dims3().map_err(map_candle)?;
        // [q; p]·Wa decomposes into q·Wa_q + p·Wa_p, avoiding the repeated
        // query concatenation.
        let wa = self.wa.as_tensor();
        let wa_q = wa.narrow(0, 0, v).map_err(map_candle)?;
        let wa_p = wa.narrow(0, v, v).map_err(map_candle)?;

        let q_term = q.matmul(&wa_q).map_err(map_candle)?; // [b, n]
        let p_term = p
            .permute((0, 2, 1))
            .map_err(map_candle)?
            .contiguous()
            .map_err(map_candle)?
            .reshape((b * s, v))
            .map_err(map_candle)?
            .matmul(&wa_p)
            .map_err(map_candle)?
            .reshape((b, s, self.attn_dim))
            .map_err(map_candle)?;

        let scores = p_term
            .broadcast_add(&q_term.unsqueeze(1).map_err(map_candle)?)
            .map_err(map_candle)?
            .tanh()
            .map_err(map_candle)?
            .reshape((b * s, self.attn_dim))
            .map_err(map_candle)?
            .matmul(self.va.as_tensor())
            .map_err(map_candle)?
            .reshape((b, s))
            .map_err(map_candle)?;
        let scores = (scores * mask).map_err(map_candle)?;

        let weights = scores.exp().map_err(map_candle)?;
        let total = weights.sum_keepdim(1).map_err(map_candle)?;
        let weights = weights.broadcast_div(&total).map_err(map_candle)?;

        p.broadcast_mul(&weights.unsqueeze(1).map_err(map_candle)?)
            .map_err(map_candle)?
            .sum(2)
            .map_err(map_candle)
    }

    /// Score a sequence batch into `[b]` pairwise scores.
    pub fn forward(&self, batch: &SequenceBatch) -> CatsResult<Tensor> {
        batch.validate(self.emb_dim)?;
        let pooled_a = self.pool(&batch.query, &batch.passage_a, &batch.mask_a)?;
        let pooled_b = self.pool(&batch.query, &batch.passage_b, &batch.mask_b)?;
        self.head.score(&batch.query, &pooled_a, &pooled_b)
    }

    pub fn named_vars(&self) -> Vec<(String, Var)> {
        let mut vars = vec![
            ("attn.wa".to_string(), self.wa.clone()),
            ("attn.va".to_string(), self.va.clone()),
        ];
        vars.extend(self.head.named_vars("head"));
        vars
    }
}
