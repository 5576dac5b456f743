//! Adam optimizer over candle `Var` parameters.
//!
//! Per-parameter first/second moment estimates with bias correction,
//! optional global-norm gradient clipping, and optional decoupled weight
//! decay. The learning rate is constant.

use candle_core::{Tensor, Var};

use crate::error::{map_candle, CatsResult};

/// Adam configuration.
#[derive(Debug, Clone)]
pub struct AdamConfig {
    /// Learning rate.
    pub lr: f64,
    /// First moment exponential decay rate.
    pub beta1: f64,
    /// Second moment exponential decay rate.
    pub beta2: f64,
    /// Numerical stability constant.
    pub epsilon: f64,
    /// Decoupled weight decay coefficient (0 disables).
    pub weight_decay: f64,
    /// Maximum global gradient norm; `None` disables clipping.
    pub max_grad_norm: Option<f64>,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            max_grad_norm: None,
        }
    }
}

/// A tracked parameter with its moment estimates.
struct TrackedParam {
    var: Var,
    m: Tensor,
    v: Tensor,
}

/// Adam optimizer.
pub struct Adam {
    config: AdamConfig,
    params: Vec<TrackedParam>,
    step: usize,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            params: Vec::new(),
            step: 0,
        }
    }

    /// Register a trainable parameter. The `Var` clone shares storage with
    /// the model weights, so updates are visible to the network.
    pub fn add_param(&mut self, var: Var) -> CatsResult<()> {
        let shape = var.as_tensor().shape().clone();
        let dtype = var.as_tensor().dtype();
        let device = var.as_tensor().device().clone();
        let m = Tensor::zeros(&shape, dtype, &device).map_err(map_candle)?;
        let v = Tensor::zeros(&shape, dtype, &device).map_err(map_candle)?;
        self.params.push(TrackedParam { var, m, v });
        Ok(())
    }

    /// Perform one optimization step: backward pass on `loss`, then the Adam
    /// update for every registered parameter.
    pub fn step(&mut self, loss: &Tensor) -> CatsResult<()> {
        self.step += 1;
        let t = self.step as i32;
        let grads = loss.backward().map_err(map_candle)?;

        // Global gradient norm for clipping, computed before any update.
        let clip_scale = match self.config.max_grad_norm {
            None => 1.0,
            Some(max_norm) => {
                let mut total_sq = 0.0f64;
                for param in &self.params {
                    if let Some(grad) = grads.get(param.var.as_tensor()) {
                        let sq: f32 = grad
                            .sqr()
                            .map_err(map_candle)?
                            .sum_all()
                            .map_err(map_candle)?
                            .to_scalar()
                            .map_err(map_candle)?;
                        total_sq += sq as f64;
                    }
                }
                let total_norm = total_sq.sqrt();
                if total_norm > max_norm {
                    max_norm / (total_norm + self.config.epsilon)
                } else {
                    1.0
                }
            }
        };

        let bc1 = 1.0 - self.config.beta1.powi(t);
        let bc2 = 1.0 - self.config.beta2.powi(t);

        for param in &mut self.params {
            let grad = match grads.get(param.var.as_tensor()) {
                Some(g) => g,
                None => continue,
            };
            let grad = if (clip_scale - 1.0).abs() > 1e-12 {
                grad.affine(clip_scale, 0.0).map_err(map_candle)?
            } else {
                grad.clone()
            };

            // m = β1·m + (1-β1)·g; detached so optimizer state never joins
            // the autograd graph.
            param.m = param
                .m
                .affine(self.config.beta1, 0.0)
                .map_err(map_candle)?
                .add(&grad.affine(1.0 - self.config.beta1, 0.0).map_err(map_candle)?)
                .map_err(map_candle)?
                .detach();

            // v = β2·v + (1-β2)·g²
            let grad_sq = grad.sqr().map_err(map_candle)?;
            param.v = param
                .v
                .affine(self.config.beta2, 0.0)
                .map_err(map_candle)?
                .add(&grad_sq.affine(1.0 - self.config.beta2, 0.0).map_err(map_candle)?)
                .map_err(map_candle)?
                .detach();

            let m_hat = param.m.affine(1.0 / bc1, 0.0).map_err(map_candle)?;
            let v_hat = param.v.affine(1.0 / bc2, 0.0).map_err(map_candle)?;

            let denom = v_hat
                .sqrt()
                .map_err(map_candle)?
                .affine(1.0, self.config.epsilon)
                .map_err(map_candle)?;
            let update = m_hat
                .div(&denom)
                .map_err(map_candle)?
                .affine(-self.config.lr, 0.0)
                .map_err(map_candle)?;

            let current = param.var.as_tensor().clone();
            let mut new_val = current.add(&update).map_err(map_candle)?;
            if self.config.weight_decay > 0.0 {
                let decay = current
                    .affine(-self.config.lr * self.config.weight_decay, 0.0)
                    .map_err(map_candle)?;
                new_val = new_val.add(&decay).map_err(map_candle)?;
            }
            param.var.set(&new_val.detach()).map_err(map_candle)?;
        }
        Ok(())
    }

    /// Global step counter.
    pub fn global_step(&self) -> usize {
        self.step
    }

    /// Number of tracked parameters.
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }
}
