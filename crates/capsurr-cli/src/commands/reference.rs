use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use capsurr_core::StudyConfig;
use capsurr_scenarios::{
    build_reference, load_reference_info, FileSimulationBuilder, ReferenceInfo,
};
use tracing::info;

use super::load_study;
use super::telemetry::record_run_timed;

pub fn handle(config_path: &Path) -> Result<()> {
    let config = load_study(config_path)?;
    let start = Instant::now();
    let res = (|| -> Result<()> {
        let info = build(&config)?;
        println!(
            "Reference built: peak load {:.2} MW, cf wind {:.3}, cf pv {:.3}",
            info.peak_load, info.cf_wind, info.cf_pv
        );
        Ok(())
    })();
    let baseline = config.simulation.baseline_inputs.display().to_string();
    record_run_timed(
        &config.simulation.reference_info,
        "reference",
        &[("baseline_inputs", baseline.as_str())],
        start,
        &res,
    );
    res
}

pub(crate) fn build(config: &StudyConfig) -> Result<ReferenceInfo> {
    let builder = FileSimulationBuilder::from_config(&config.simulation);
    build_reference(&builder, config)
}

/// Reference summary of the study, building the reference first when its
/// bundle or summary is missing.
pub(crate) fn ensure(config: &StudyConfig) -> Result<ReferenceInfo> {
    let inputs = config
        .reference_bundle()
        .join(&config.dataset.inputs_file);
    if inputs.is_file() && config.simulation.reference_info.is_file() {
        return load_reference_info(&config.simulation.reference_info);
    }
    info!("reference missing; building it from the baseline");
    build(config)
}
