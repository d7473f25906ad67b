use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use capsurr_core::{SamplePoint, StudyConfig};
use capsurr_scenarios::{draw_sample_points, load_or_draw_samples, materialize_samples};
use tracing::info;

use super::telemetry::record_run_timed;
use super::{load_study, reference};

pub fn handle(config_path: &Path, only_samples: bool, index: Option<usize>) -> Result<()> {
    let config = load_study(config_path)?;
    let start = Instant::now();
    let res = run(&config, only_samples, index);
    let n_samples = config.sampling.n_samples.to_string();
    let index_param = index.map(|i| i.to_string()).unwrap_or_else(|| "all".into());
    let only = only_samples.to_string();
    record_run_timed(
        &config.sampling.samples_file,
        "sample",
        &[
            ("n_samples", n_samples.as_str()),
            ("index", index_param.as_str()),
            ("only_samples", only.as_str()),
        ],
        start,
        &res,
    );
    res
}

fn run(config: &StudyConfig, only_samples: bool, index: Option<usize>) -> Result<()> {
    let points = match index {
        // Single-index runs share one design, so the saved file wins.
        Some(_) => load_or_draw_samples(&config.sampling)?,
        None => draw_sample_points(&config.sampling)?,
    };
    let samples_file = &config.sampling.samples_file;
    if config.sampling.write_samples && (index.is_none() || !samples_file.is_file()) {
        capsurr_io::write_samples(samples_file, &points)?;
        info!("{} samples written to {}", points.len(), samples_file.display());
    }
    if only_samples {
        println!("Wrote {} samples", points.len());
        return Ok(());
    }

    let selected: Vec<SamplePoint> = match index {
        Some(i) => vec![points
            .iter()
            .find(|point| point.index == i)
            .copied()
            .ok_or_else(|| {
                anyhow!("sample index {} out of range (design has {} samples)", i, points.len())
            })?],
        None => points,
    };
    let reference = reference::ensure(config)?;
    let summary = materialize_samples(config, &reference, &selected)?;
    println!(
        "Materialized {} bundle(s) in {}",
        summary.records.len(),
        config.simulation.simulations_dir.display()
    );
    if !summary.failures.is_empty() {
        let failed: Vec<String> = summary
            .failures
            .iter()
            .map(|(i, _)| i.to_string())
            .collect();
        return Err(anyhow!(
            "{} sample(s) failed to materialize: {}",
            failed.len(),
            failed.join(", ")
        ));
    }
    Ok(())
}
