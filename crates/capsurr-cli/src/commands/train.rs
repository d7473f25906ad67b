use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use capsurr_core::TunerStrategy;
use capsurr_surrogate::train_and_save;

use super::load_study;
use super::telemetry::record_run_timed;

pub fn handle(
    config_path: &Path,
    tuner: Option<TunerStrategy>,
    dataset: Option<&PathBuf>,
    model: Option<&PathBuf>,
) -> Result<()> {
    let study = load_study(config_path)?;
    let mut config = study.surrogate.clone();
    if let Some(tuner) = tuner {
        config.tuner = tuner;
    }
    if let Some(model) = model {
        config.model_path = model.clone();
    }
    let dataset = dataset
        .cloned()
        .unwrap_or_else(|| study.dataset.dataset_file.clone());

    let start = Instant::now();
    let res = (|| -> Result<()> {
        let report = train_and_save(&config, &dataset)?;
        let metrics = &report.metrics;
        println!(
            "Trained surrogate with {} tuner over {} trial(s): test mse {:.6} (normalized {:.6}) on {} rows",
            metrics.tuner,
            metrics.trials,
            metrics.test_mse,
            metrics.test_mse_normalized,
            metrics.test_rows
        );
        println!(
            "Model written to {} in {:.1}s; trials in {}",
            report.model_path.display(),
            report.elapsed_secs,
            report.trials_path.display()
        );
        Ok(())
    })();
    let tuner_param = config.tuner.to_string();
    let dataset_param = dataset.display().to_string();
    let seed_param = config.seed.to_string();
    record_run_timed(
        &config.model_path,
        "train",
        &[
            ("tuner", tuner_param.as_str()),
            ("dataset", dataset_param.as_str()),
            ("seed", seed_param.as_str()),
        ],
        start,
        &res,
    );
    res
}
