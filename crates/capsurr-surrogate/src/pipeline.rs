//! End-to-end surrogate training: load, split, normalize, search, refit,
//! evaluate, persist.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use capsurr_core::config::SurrogateConfig;
use chrono::Utc;
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{load_dataset, split_dataset, Dataset, Partition, Split, SplitRatios};
use crate::model::{SurrogateModel, TrainingMetrics, MODEL_FORMAT_VERSION};
use crate::network::{Activation, LayerSpec, Mlp};
use crate::normalize::{Denormalizer, Normalizer};
use crate::optimizer::Optimizer;
use crate::search::{Hyperparameters, SearchSpace};
use crate::train::{evaluate, fit, FitOptions, History, PlateauSchedule};
use crate::tuner::{tune, Trial, TunerOptions};

/// Tuner trials are written next to the model under this name.
pub const TRIALS_FILE: &str = "tuner_trials.json";
/// Baseline results are written next to the model under this name.
pub const BASELINES_FILE: &str = "baselines.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model_path: PathBuf,
    pub trials_path: PathBuf,
    pub metrics: TrainingMetrics,
    pub elapsed_secs: f64,
}

/// Split of a dataset with normalizers fitted on its training rows.
struct Prepared {
    dataset: Dataset,
    split: Split,
    normalizer: Normalizer,
    output_normalizer: Normalizer,
    train: Partition,
    val: Partition,
    test: Partition,
}

fn prepare(config: &SurrogateConfig, dataset_path: &Path) -> Result<Prepared> {
    let dataset = load_dataset(dataset_path, &config.features, &config.outputs)?;
    let ratios = SplitRatios {
        train: config.train_ratio,
        val: config.val_ratio,
        test: config.test_ratio,
    };
    let split = split_dataset(&dataset, ratios, config.seed)?;

    let normalizer = Normalizer::fit(&split.train.x)?;
    let output_normalizer = Normalizer::fit(&split.train.y)?;
    let normalize = |part: &Partition| -> Result<Partition> {
        Ok(Partition {
            x: normalizer.transform(&part.x)?,
            y: output_normalizer.transform(&part.y)?,
        })
    };
    let train = normalize(&split.train)?;
    let val = normalize(&split.val)?;
    let test = normalize(&split.test)?;
    Ok(Prepared {
        dataset,
        split,
        normalizer,
        output_normalizer,
        train,
        val,
        test,
    })
}

/// Fit `hp` on train+validation with the test rows as monitor and a
/// reduce-on-plateau schedule, keeping the best epoch's weights.
fn refit(config: &SurrogateConfig, hp: &Hyperparameters, data: &Prepared) -> Result<(Mlp, History)> {
    info!(
        "fitting {} on {} rows for up to {} epochs",
        hp.describe(),
        data.train.len() + data.val.len(),
        config.epochs
    );
    let mut rng = StdRng::seed_from_u64(config.seed);
    let network = Mlp::new(data.train.x.ncols(), &hp.layers, data.train.y.ncols(), &mut rng)?;
    let mut optimizer = Optimizer::new(hp.optimizer, hp.learning_rate, &network)?;
    let history = fit(
        &network,
        &mut optimizer,
        &data.train.concat(&data.val)?,
        &data.test,
        &FitOptions {
            epochs: config.epochs,
            batch_size: config.batch_size,
            early_stopping: None,
            plateau: Some(PlateauSchedule {
                patience: config.patience,
                ..PlateauSchedule::default()
            }),
            seed: config.seed,
        },
    )?;
    Ok((network, history))
}

/// Test MSE in physical units: over all outputs, then per output.
fn physical_test_mse(
    normalizer: &Normalizer,
    network: &Mlp,
    denormalizer: &Denormalizer,
    test: &Partition,
) -> Result<(f64, Vec<f64>)> {
    let predicted = denormalizer.apply(&network.predict(&normalizer.transform(&test.x)?)?)?;
    let squared = (&predicted - &test.y).mapv(|d| d * d);
    let per_output = squared
        .mean_axis(Axis(0))
        .map(|means| means.to_vec())
        .unwrap_or_default();
    Ok((squared.mean().unwrap_or(f64::NAN), per_output))
}

/// Train a surrogate on `dataset_path` without writing anything.
pub fn train_surrogate(
    config: &SurrogateConfig,
    space: &SearchSpace,
    dataset_path: &Path,
) -> Result<(SurrogateModel, Vec<Trial>)> {
    let data = prepare(config, dataset_path)?;
    let outcome = tune(space, TunerOptions::from_config(config), &data.train, &data.val)?;
    let best = outcome.best.hyperparameters.clone();
    let (network, history) = refit(config, &best, &data)?;

    let test_mse_normalized = evaluate(&network, &data.test)?;
    let denormalizer = data.output_normalizer.denormalizer()?;
    let (test_mse, test_mse_per_output) =
        physical_test_mse(&data.normalizer, &network, &denormalizer, &data.split.test)?;
    let model = SurrogateModel {
        version: MODEL_FORMAT_VERSION,
        created_at: Utc::now(),
        features: data.dataset.features.clone(),
        outputs: data.dataset.outputs.clone(),
        normalizer: data.normalizer,
        network,
        denormalizer,
        hyperparameters: best,
        metrics: TrainingMetrics {
            tuner: config.tuner,
            trials: outcome.trials.len(),
            best_trial_score: outcome.best.score,
            best_epoch: history.best_epoch,
            epochs_run: history.epochs_run(),
            train_rows: data.split.train.len(),
            val_rows: data.split.val.len(),
            test_rows: data.split.test.len(),
            test_mse_normalized,
            test_mse,
            test_mse_per_output,
        },
    };
    info!(
        "test mse {:.6} (normalized {:.6}), best epoch {}",
        model.metrics.test_mse, model.metrics.test_mse_normalized, model.metrics.best_epoch
    );
    Ok((model, outcome.trials))
}

/// Train with the configured search space and persist the model and its
/// tuner trials.
pub fn train_and_save(config: &SurrogateConfig, dataset_path: &Path) -> Result<TrainingReport> {
    let started = Instant::now();
    let space = SearchSpace::from_config(config);
    let (model, trials) = train_surrogate(config, &space, dataset_path)?;
    model.save(&config.model_path)?;
    let trials_path = config.model_path.with_file_name(TRIALS_FILE);
    capsurr_io::write_json(&trials_path, &trials)
        .with_context(|| format!("writing tuner trials '{}'", trials_path.display()))?;
    info!("surrogate written to {}", config.model_path.display());
    Ok(TrainingReport {
        model_path: config.model_path.clone(),
        trials_path,
        metrics: model.metrics,
        elapsed_secs: started.elapsed().as_secs_f64(),
    })
}

/// Fixed architecture trained outside the tuner for comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineResult {
    pub layers: Vec<LayerSpec>,
    pub best_epoch: usize,
    pub epochs_run: usize,
    pub test_mse_normalized: f64,
    pub test_mse: f64,
    pub test_mse_per_output: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineReport {
    pub path: PathBuf,
    pub results: Vec<BaselineResult>,
}

fn relu_layers(shape: &[(usize, f64)]) -> Vec<LayerSpec> {
    shape
        .iter()
        .map(|&(units, dropout)| LayerSpec {
            units,
            activation: Activation::Relu,
            dropout,
        })
        .collect()
}

/// Hand-picked architectures used as reference points for tuned models.
pub fn default_baselines() -> Vec<Vec<LayerSpec>> {
    let mut archs = vec![
        relu_layers(&[(70, 0.5), (70, 0.5)]),
        relu_layers(&[(100, 0.4), (100, 0.4)]),
        relu_layers(&[(100, 0.5), (100, 0.5)]),
        relu_layers(&[(100, 0.6), (100, 0.6)]),
        relu_layers(&[(250, 0.4), (125, 0.4)]),
    ];
    let mut tanh = relu_layers(&[(250, 0.4), (125, 0.4)]);
    for layer in &mut tanh {
        layer.activation = Activation::Tanh;
    }
    archs.push(tanh);
    archs.push(relu_layers(&[(200, 0.4), (150, 0.4), (100, 0.4)]));
    archs.push(relu_layers(&[
        (120, 0.4),
        (120, 0.4),
        (120, 0.4),
        (120, 0.4),
        (80, 0.4),
    ]));
    archs
}

/// Train every architecture with Adam at a fixed learning rate, using the
/// same split, normalization and final-fit schedule as the tuned model.
pub fn train_baselines(
    config: &SurrogateConfig,
    architectures: &[Vec<LayerSpec>],
    dataset_path: &Path,
) -> Result<Vec<BaselineResult>> {
    let data = prepare(config, dataset_path)?;
    let denormalizer = data.output_normalizer.denormalizer()?;
    let mut results = Vec::with_capacity(architectures.len());
    for layers in architectures {
        let hp = Hyperparameters::baseline(layers.clone());
        let (network, history) = refit(config, &hp, &data)?;
        let (test_mse, test_mse_per_output) =
            physical_test_mse(&data.normalizer, &network, &denormalizer, &data.split.test)?;
        let result = BaselineResult {
            layers: layers.clone(),
            best_epoch: history.best_epoch,
            epochs_run: history.epochs_run(),
            test_mse_normalized: evaluate(&network, &data.test)?,
            test_mse,
            test_mse_per_output,
        };
        info!(
            "baseline {}: test mse {:.6}, best epoch {} / {}",
            hp.describe(),
            result.test_mse,
            result.best_epoch,
            result.epochs_run
        );
        results.push(result);
    }
    Ok(results)
}

/// Train the baselines and write them next to the configured model path.
pub fn train_baselines_and_save(
    config: &SurrogateConfig,
    architectures: &[Vec<LayerSpec>],
    dataset_path: &Path,
) -> Result<BaselineReport> {
    let results = train_baselines(config, architectures, dataset_path)?;
    let path = config.model_path.with_file_name(BASELINES_FILE);
    capsurr_io::write_json(&path, &results)
        .with_context(|| format!("writing baselines '{}'", path.display()))?;
    Ok(BaselineReport { path, results })
}
