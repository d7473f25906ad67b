use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use capsurr_scenarios::{load_or_draw_samples, load_reference_info, materialize_samples};

use super::load_study;
use super::telemetry::record_run_timed;

pub fn handle(config_path: &Path, index: usize) -> Result<()> {
    let config = load_study(config_path)?;
    let start = Instant::now();
    let res = (|| -> Result<()> {
        let points = load_or_draw_samples(&config.sampling)?;
        let point = points
            .iter()
            .find(|point| point.index == index)
            .copied()
            .ok_or_else(|| {
                anyhow!(
                    "sample index {} out of range (design has {} samples)",
                    index,
                    points.len()
                )
            })?;
        let reference = load_reference_info(&config.simulation.reference_info)?;
        let summary = materialize_samples(&config, &reference, &[point])?;
        if let Some((_, err)) = summary.failures.first() {
            return Err(anyhow!("sample {} failed to materialize: {}", index, err));
        }
        println!(
            "Materialized {}",
            config
                .simulation
                .simulations_dir
                .join(point.bundle_name())
                .display()
        );
        Ok(())
    })();
    let index_param = index.to_string();
    let manifest = config
        .simulation
        .simulations_dir
        .join(&config.dataset.manifest_file);
    record_run_timed(
        &manifest,
        "materialize",
        &[("index", index_param.as_str())],
        start,
        &res,
    );
    res
}
