//! Mini-batch training loop with validation monitoring.

use anyhow::Result;
use candle_core::{Device, Tensor};
use capsurr_core::CapsurrError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Partition;
use crate::network::{to_tensor, Mlp};
use crate::optimizer::Optimizer;

/// Minimum decrease of the monitored loss that counts as an improvement
/// for the learning-rate schedule.
const PLATEAU_MIN_DELTA: f64 = 1e-4;

/// Learning-rate decay applied when the validation loss stalls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateauSchedule {
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
}

impl Default for PlateauSchedule {
    fn default() -> Self {
        Self {
            factor: 0.1,
            patience: 5,
            min_lr: 1e-9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    /// Stop after this many epochs without a new best validation loss
    pub early_stopping: Option<usize>,
    pub plateau: Option<PlateauSchedule>,
    pub seed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub learning_rate: Vec<f64>,
    /// Zero-based epoch of the best validation loss
    pub best_epoch: usize,
    pub best_val_loss: f64,
}

impl History {
    pub fn epochs_run(&self) -> usize {
        self.val_loss.len()
    }
}

/// Mean squared error of `model` on a partition, dropout inactive.
pub fn evaluate(model: &Mlp, data: &Partition) -> Result<f64> {
    if data.is_empty() {
        return Ok(f64::NAN);
    }
    let predicted = model.forward(&to_tensor(&data.x)?)?;
    let loss = candle_nn::loss::mse(&predicted, &to_tensor(&data.y)?)?;
    Ok(loss.to_scalar::<f64>()?)
}

/// Train `model` in place and leave it holding the weights of the epoch with
/// the lowest validation loss.
pub fn fit(
    model: &Mlp,
    optimizer: &mut Optimizer,
    train: &Partition,
    val: &Partition,
    options: &FitOptions,
) -> Result<History> {
    if train.is_empty() || val.is_empty() {
        return Err(
            CapsurrError::Training("training and validation rows are required".into()).into(),
        );
    }
    let batch_size = options.batch_size.max(1);
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut order: Vec<usize> = (0..train.len()).collect();

    let mut history = History {
        best_val_loss: f64::INFINITY,
        ..Default::default()
    };
    let train_x = to_tensor(&train.x)?;
    let train_y = to_tensor(&train.y)?;
    let mut best: Option<Vec<Tensor>> = None;
    let mut since_best = 0usize;
    let mut plateau_best = f64::INFINITY;
    let mut plateau_wait = 0usize;

    for epoch in 0..options.epochs {
        order.shuffle(&mut rng);
        let mut weighted = 0.0;
        for batch in order.chunks(batch_size) {
            let ids: Vec<u32> = batch.iter().map(|&i| i as u32).collect();
            let ids = Tensor::from_vec(ids, batch.len(), &Device::Cpu)?;
            let x = train_x.index_select(&ids, 0)?;
            let y = train_y.index_select(&ids, 0)?;
            let loss = candle_nn::loss::mse(&model.forward_train(&x, &mut rng)?, &y)?;
            optimizer.step(&loss)?;
            weighted += loss.to_scalar::<f64>()? * batch.len() as f64;
        }
        let train_loss = weighted / train.len() as f64;
        let val_loss = evaluate(model, val)?;
        history.train_loss.push(train_loss);
        history.val_loss.push(val_loss);
        history.learning_rate.push(optimizer.learning_rate());
        debug!(
            epoch,
            train_loss,
            val_loss,
            lr = optimizer.learning_rate(),
            "epoch finished"
        );

        if val_loss < history.best_val_loss {
            history.best_val_loss = val_loss;
            history.best_epoch = epoch;
            best = Some(model.snapshot()?);
            since_best = 0;
        } else {
            since_best += 1;
        }

        if let Some(schedule) = options.plateau {
            if val_loss < plateau_best - PLATEAU_MIN_DELTA {
                plateau_best = val_loss;
                plateau_wait = 0;
            } else {
                plateau_wait += 1;
                if plateau_wait >= schedule.patience {
                    let lr = optimizer.learning_rate();
                    let reduced = (lr * schedule.factor).max(schedule.min_lr);
                    if reduced < lr {
                        debug!(epoch, from = lr, to = reduced, "reducing learning rate");
                        optimizer.set_learning_rate(reduced);
                    }
                    plateau_wait = 0;
                }
            }
        }

        if let Some(patience) = options.early_stopping {
            if since_best >= patience {
                debug!(epoch, "early stopping");
                break;
            }
        }
    }

    match best {
        Some(weights) => {
            model.restore(&weights)?;
            Ok(history)
        }
        None => Err(CapsurrError::Training(
            "validation loss never became finite; training diverged".into(),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Activation, LayerSpec};
    use crate::optimizer::OptimizerKind;
    use ndarray::Array2;

    fn partition(n: usize, offset: f64) -> Partition {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let t = (i as f64 + offset) / n as f64;
            if j == 0 {
                t * 2.0 - 1.0
            } else {
                (t * 7.0).sin()
            }
        });
        let y = Array2::from_shape_fn((n, 1), |(i, _)| {
            0.8 * x[[i, 0]] - 0.5 * x[[i, 1]] * x[[i, 0]]
        });
        Partition { x, y }
    }

    fn model(seed: u64) -> Mlp {
        let mut rng = StdRng::seed_from_u64(seed);
        let hidden = [LayerSpec {
            units: 16,
            activation: Activation::Tanh,
            dropout: 0.0,
        }];
        Mlp::new(2, &hidden, 1, &mut rng).unwrap()
    }

    fn options(epochs: usize) -> FitOptions {
        FitOptions {
            epochs,
            batch_size: 8,
            early_stopping: None,
            plateau: None,
            seed: 1,
        }
    }

    #[test]
    fn training_reduces_validation_loss() {
        let train = partition(64, 0.0);
        let val = partition(16, 0.5);
        let mlp = model(2);
        let before = evaluate(&mlp, &val).unwrap();
        let mut opt = Optimizer::new(OptimizerKind::Adam, 0.01, &mlp).unwrap();
        let history = fit(&mlp, &mut opt, &train, &val, &options(60)).unwrap();
        assert_eq!(history.epochs_run(), 60);
        assert!(history.best_val_loss < before * 0.2, "{before} -> {}", history.best_val_loss);
        // the model keeps the best epoch's weights
        let after = evaluate(&mlp, &val).unwrap();
        assert!((after - history.best_val_loss).abs() < 1e-12);
    }

    #[test]
    fn fit_is_deterministic_for_a_seed() {
        let train = partition(32, 0.0);
        let val = partition(8, 0.5);
        let run = || {
            let mlp = model(4);
            let mut opt = Optimizer::new(OptimizerKind::RmsProp, 0.005, &mlp).unwrap();
            fit(&mlp, &mut opt, &train, &val, &options(5)).unwrap()
        };
        assert_eq!(run().val_loss, run().val_loss);
    }

    #[test]
    fn early_stopping_ends_a_stalled_run() {
        let train = partition(32, 0.0);
        let val = partition(8, 0.5);
        let mlp = model(6);
        // a zero learning rate never improves on the first epoch
        let mut opt = Optimizer::new(OptimizerKind::Adam, 0.0, &mlp).unwrap();
        let mut opts = options(100);
        opts.early_stopping = Some(3);
        let history = fit(&mlp, &mut opt, &train, &val, &opts).unwrap();
        assert_eq!(history.epochs_run(), 4);
        assert_eq!(history.best_epoch, 0);
    }

    #[test]
    fn plateau_reduces_learning_rate() {
        let train = partition(32, 0.0);
        let val = partition(8, 0.5);
        let mlp = model(8);
        let mut opt = Optimizer::new(OptimizerKind::Adam, 1e-9, &mlp).unwrap();
        let mut opts = options(7);
        opts.plateau = Some(PlateauSchedule {
            factor: 0.1,
            patience: 2,
            min_lr: 1e-11,
        });
        let history = fit(&mlp, &mut opt, &train, &val, &opts).unwrap();
        assert_eq!(history.learning_rate[0], 1e-9);
        assert!((opt.learning_rate() - 1e-11).abs() < 1e-20);
    }

    #[test]
    fn empty_validation_is_rejected() {
        let train = partition(8, 0.0);
        let val = Partition {
            x: Array2::zeros((0, 2)),
            y: Array2::zeros((0, 1)),
        };
        let mlp = model(1);
        let mut opt = Optimizer::new(OptimizerKind::Adam, 0.01, &mlp).unwrap();
        assert!(fit(&mlp, &mut opt, &train, &val, &options(1)).is_err());
    }
}
