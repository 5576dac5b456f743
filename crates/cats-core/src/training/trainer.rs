//! Mini-batch regression training for the comparison networks.
//!
//! A fixed 10% prefix of the training matrix is held out for validation
//! before any shuffling, batches run in fixed order unless shuffling is
//! enabled, the loss is mean squared error against the binary labels, and
//! every `eval_interval` batches the validation split is scored alongside
//! the current batch.

use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::error::{map_candle, CatsError, CatsResult};
use crate::model::ComparisonNetwork;

use super::evaluation::{baseline_aucs, roc_auc, BaselineReport};
use super::optimizer::{Adam, AdamConfig};

/// Trainer configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Mini-batch size.
    pub batch_size: usize,
    /// Number of passes over the training split.
    pub epochs: usize,
    /// Validate every N batches.
    pub eval_interval: usize,
    /// Fraction of the input held out as the validation prefix.
    pub val_fraction: f32,
    /// Shuffle the training split each epoch (the validation prefix is
    /// carved off first either way).
    pub shuffle: bool,
    /// Seed for the shuffling RNG.
    pub seed: u64,
    /// Optimizer settings (learning rate lives here).
    pub optimizer: AdamConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            epochs: 20,
            eval_interval: 10,
            val_fraction: 0.1,
            shuffle: false,
            seed: 42,
            optimizer: AdamConfig::default(),
        }
    }
}

/// One logged training checkpoint.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub epoch: usize,
    pub batch: usize,
    pub train_loss: f32,
    pub train_auc: f64,
    pub val_loss: Option<f32>,
    pub val_auc: Option<f64>,
}

/// Accumulated training history.
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub records: Vec<ProgressRecord>,
    pub total_steps: usize,
}

/// Terminal test-set report with the untrained baselines.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub loss: f32,
    pub auc: f64,
    pub baselines: BaselineReport,
}

/// Minimizes MSE between pairwise scores and binary labels.
pub struct Trainer {
    network: ComparisonNetwork,
    optimizer: Adam,
    config: TrainConfig,
    history: TrainingHistory,
}

impl Trainer {
    /// Create a trainer and register the network's parameters.
    pub fn new(network: ComparisonNetwork, config: TrainConfig) -> CatsResult<Self> {
        let mut optimizer = Adam::new(config.optimizer.clone());
        for (_, var) in network.named_vars() {
            optimizer.add_param(var)?;
        }
        Ok(Self {
            network,
            optimizer,
            config,
            history: TrainingHistory::default(),
        })
    }

    pub fn network(&self) -> &ComparisonNetwork {
        &self.network
    }

    /// Consume the trainer, handing back the trained network.
    pub fn into_network(self) -> ComparisonNetwork {
        self.network
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Run the full training loop over `[N, 3v]` features and `[N]` labels.
    pub fn fit(&mut self, features: &Tensor, labels: &Tensor) -> CatsResult<()> {
        let n = features.dims2().map_err(map_candle)?.0;
        if labels.dims1().map_err(map_candle)? != n {
            return Err(CatsError::ShapeMismatch {
                ids: n,
                rows: labels.dims1().map_err(map_candle)?,
            });
        }
        if self.config.batch_size == 0 {
            return Err(CatsError::EmptyInput { what: "batch size" });
        }

        // Validation split: fixed prefix, taken before any shuffling.
        let val_n = (n as f32 * self.config.val_fraction) as usize;
        let train_n = n - val_n;
        if train_n == 0 {
            return Err(CatsError::EmptyInput {
                what: "training rows after validation split",
            });
        }
        let (x_val, y_val) = if val_n > 0 {
            (
                Some(features.narrow(0, 0, val_n).map_err(map_candle)?),
                Some(labels.narrow(0, 0, val_n).map_err(map_candle)?),
            )
        } else {
            warn!("validation split is empty; reporting train metrics only");
            (None, None)
        };
        let x_train = features.narrow(0, val_n, train_n).map_err(map_candle)?;
        let y_train = labels.narrow(0, val_n, train_n).map_err(map_candle)?;

        let num_batches = train_n.div_ceil(self.config.batch_size);
        let mut order: Vec<u32> = (0..train_n as u32).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        info!(
            samples = train_n,
            validation = val_n,
            batches = num_batches,
            epochs = self.config.epochs,
            "training started"
        );

        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                order.shuffle(&mut rng);
            }
            for batch in 0..num_batches {
                let start = batch * self.config.batch_size;
                let len = self.config.batch_size.min(train_n - start);
                let (xb, yb) = if self.config.shuffle {
                    let idx = Tensor::from_vec(
                        order[start..start + len].to_vec(),
                        (len,),
                        features.device(),
                    )
                    .map_err(map_candle)?;
                    (
                        x_train.index_select(&idx, 0).map_err(map_candle)?,
                        y_train.index_select(&idx, 0).map_err(map_candle)?,
                    )
                } else {
                    (
                        x_train.narrow(0, start, len).map_err(map_candle)?,
                        y_train.narrow(0, start, len).map_err(map_candle)?,
                    )
                };

                let pred = self.network.forward(&xb)?;
                let loss = candle_nn::loss::mse(&pred, &yb).map_err(map_candle)?;
                let train_loss: f32 = loss.to_scalar().map_err(map_candle)?;
                let train_auc = roc_auc(
                    &pred.to_vec1::<f32>().map_err(map_candle)?,
                    &yb.to_vec1::<f32>().map_err(map_candle)?,
                );
                self.optimizer.step(&loss)?;
                self.history.total_steps += 1;

                if batch % self.config.eval_interval == 0 {
                    let (val_loss, val_auc) = match (&x_val, &y_val) {
                        (Some(xv), Some(yv)) => {
                            let (l, a) = self.evaluate(xv, yv)?;
                            (Some(l), Some(a))
                        }
                        _ => (None, None),
                    };
                    info!(
                        epoch = epoch + 1,
                        batch,
                        train_loss,
                        train_auc,
                        val_loss = val_loss.unwrap_or(f32::NAN),
                        val_auc = val_auc.unwrap_or(f64::NAN),
                        "checkpoint"
                    );
                    self.history.records.push(ProgressRecord {
                        epoch: epoch + 1,
                        batch,
                        train_loss,
                        train_auc,
                        val_loss,
                        val_auc,
                    });
                }
            }
        }
        Ok(())
    }

    /// Score a dataset: (MSE loss, AUC).
    pub fn evaluate(&self, features: &Tensor, labels: &Tensor) -> CatsResult<(f32, f64)> {
        let pred = self.network.forward(features)?;
        let loss: f32 = candle_nn::loss::mse(&pred, labels)
            .map_err(map_candle)?
            .to_scalar()
            .map_err(map_candle)?;
        let auc = roc_auc(
            &pred.to_vec1::<f32>().map_err(map_candle)?,
            &labels.to_vec1::<f32>().map_err(map_candle)?,
        );
        Ok((loss, auc))
    }

    /// Terminal report: test loss/AUC plus the cosine and Euclidean
    /// baselines computed from the raw passage blocks.
    pub fn test_report(&self, features: &Tensor, labels: &Tensor) -> CatsResult<TestReport> {
        let (loss, auc) = self.evaluate(features, labels)?;
        let baselines = baseline_aucs(features, labels, self.network.emb_dim())?;
        Ok(TestReport {
            loss,
            auc,
            baselines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Variant;
    use candle_core::Device;

    const DIM: usize = 2;

    /// Tiny synthetic set where a query-dependent rescaling can separate the
    /// classes: p1=(1,1), p2=(1,-1) pairs labeled by whether the first or
    /// second axis should dominate.
    fn toy_data(n: usize) -> (Tensor, Tensor) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let label = if i % 2 == 0 { 1.0f32 } else { 0.0 };
            rows.extend_from_slice(&[1.0, 1.0]); // query
            rows.extend_from_slice(&[1.0, 1.0]); // p1
            if label > 0.5 {
                rows.extend_from_slice(&[1.0, 1.0]); // identical → similar
            } else {
                rows.extend_from_slice(&[1.0, -1.0]); // flipped axis → dissimilar
            }
            labels.push(label);
        }
        (
            Tensor::from_vec(rows, (n, 3 * DIM), &Device::Cpu).unwrap(),
            Tensor::from_vec(labels, (n,), &Device::Cpu).unwrap(),
        )
    }

    fn trainer(epochs: usize, lr: f64) -> Trainer {
        let network = ComparisonNetwork::new(Variant::Scaled, DIM, 42, &Device::Cpu).unwrap();
        Trainer::new(
            network,
            TrainConfig {
                batch_size: 4,
                epochs,
                eval_interval: 2,
                val_fraction: 0.1,
                shuffle: false,
                seed: 42,
                optimizer: AdamConfig {
                    lr,
                    ..Default::default()
                },
            },
        )
        .unwrap()
    }

    #[test]
    fn test_fit_records_history() {
        let (x, y) = toy_data(20);
        let mut t = trainer(2, 1e-3);
        t.fit(&x, &y).unwrap();
        assert!(!t.history().records.is_empty());
        // 18 train rows, batch 4 → 5 batches per epoch, 2 epochs.
        assert_eq!(t.history().total_steps, 10);
        for record in &t.history().records {
            assert!(record.train_loss.is_finite());
            assert!(record.val_loss.unwrap().is_finite());
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        // Every row wants cos(scale⊙(1,1), scale⊙(1,-1)) pushed to 1; the
        // rescaling can only approach that from below, so the loss must
        // shrink monotonically toward the optimum.
        let n = 20;
        let mut rows = Vec::new();
        for _ in 0..n {
            rows.extend_from_slice(&[1.0, 1.0]); // query
            rows.extend_from_slice(&[1.0, 1.0]); // p1
            rows.extend_from_slice(&[1.0, -1.0]); // p2
        }
        let x = Tensor::from_vec(rows, (n, 3 * DIM), &Device::Cpu).unwrap();
        let y = Tensor::from_vec(vec![1.0f32; n], (n,), &Device::Cpu).unwrap();

        let mut t = trainer(0, 0.05);
        let (initial, _) = t.evaluate(&x, &y).unwrap();
        t.config.epochs = 30;
        t.fit(&x, &y).unwrap();
        let (trained, _) = t.evaluate(&x, &y).unwrap();
        assert!(
            trained < initial,
            "training should reduce loss: {initial} -> {trained}"
        );
    }

    #[test]
    fn test_label_length_mismatch_rejected() {
        let (x, _) = toy_data(8);
        let bad = Tensor::zeros((3,), candle_core::DType::F32, &Device::Cpu).unwrap();
        let mut t = trainer(1, 1e-3);
        assert!(t.fit(&x, &bad).is_err());
    }

    #[test]
    fn test_test_report_includes_baselines() {
        let (x, y) = toy_data(12);
        let t = trainer(1, 1e-3);
        let report = t.test_report(&x, &y).unwrap();
        assert!(report.loss.is_finite());
        // Identical vs flipped passages are perfectly separable by cosine.
        assert_eq!(report.baselines.cosine_auc, 1.0);
    }

    #[test]
    fn test_shuffled_fit_runs() {
        let (x, y) = toy_data(16);
        let network = ComparisonNetwork::new(Variant::Triamese, DIM, 7, &Device::Cpu).unwrap();
        let mut t = Trainer::new(
            network,
            TrainConfig {
                batch_size: 4,
                epochs: 2,
                shuffle: true,
                ..Default::default()
            },
        )
        .unwrap();
        t.fit(&x, &y).unwrap();
        assert_eq!(t.history().total_steps, 8);
    }
}
