use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use capsurr_surrogate::{default_baselines, train_baselines_and_save, Hyperparameters};

use super::load_study;
use super::telemetry::record_run_timed;

pub fn handle(config_path: &Path, dataset: Option<&PathBuf>, model: Option<&PathBuf>) -> Result<()> {
    let study = load_study(config_path)?;
    let mut config = study.surrogate.clone();
    if let Some(model) = model {
        config.model_path = model.clone();
    }
    let dataset = dataset
        .cloned()
        .unwrap_or_else(|| study.dataset.dataset_file.clone());
    let architectures = default_baselines();

    let start = Instant::now();
    let res = (|| -> Result<()> {
        let report = train_baselines_and_save(&config, &architectures, &dataset)?;
        for result in &report.results {
            let arch = Hyperparameters::baseline(result.layers.clone());
            println!("{} -> test mse {:.6}", arch.describe(), result.test_mse);
        }
        println!(
            "Trained {} baseline(s); results in {}",
            report.results.len(),
            report.path.display()
        );
        Ok(())
    })();
    let dataset_param = dataset.display().to_string();
    let count_param = architectures.len().to_string();
    record_run_timed(
        &config.model_path,
        "baselines",
        &[
            ("dataset", dataset_param.as_str()),
            ("architectures", count_param.as_str()),
        ],
        start,
        &res,
    );
    res
}
