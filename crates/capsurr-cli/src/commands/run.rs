use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use capsurr_batch::{collect_single, CollectorConfig};
use capsurr_scenarios::{CommandRunner, SimulatorRunner};
use tracing::warn;

use super::load_study;
use super::telemetry::record_run_timed;

/// Run the configured simulator on one bundle, then append the bundle's
/// row with the simulator's exit status as error flag.
pub fn handle(config_path: &Path, bundle: &Path) -> Result<()> {
    let config = load_study(config_path)?;
    let start = Instant::now();
    let res = (|| -> Result<()> {
        let runner = CommandRunner::from_config(&config.simulation)?;
        let outcome = runner.run(bundle)?;
        if !outcome.success() {
            warn!(
                "simulator failed on {}; collecting with error flag {}",
                bundle.display(),
                outcome.error_flag()
            );
        }
        let collector = CollectorConfig::from_study(&config, 1);
        let row = collect_single(&collector, bundle, outcome.error_flag())?;
        println!(
            "Sample {} simulated (error flag {}) and appended to {}",
            row.index,
            row.error_flag,
            config.dataset.dataset_file.display()
        );
        Ok(())
    })();
    let bundle_param = bundle.display().to_string();
    record_run_timed(
        &config.dataset.dataset_file,
        "run",
        &[("bundle", bundle_param.as_str())],
        start,
        &res,
    );
    res
}
