use std::path::Path;

use anyhow::{Context, Result};
use capsurr_core::{load_config_from_path, StudyConfig};

pub mod baselines;
pub mod collect;
pub mod config;
pub mod materialize;
pub mod predict;
pub mod reference;
pub mod run;
pub mod sample;
pub mod telemetry;
pub mod train;
pub mod util;

/// Load the study configuration every stage command works from.
pub fn load_study(path: &Path) -> Result<StudyConfig> {
    load_config_from_path(path)
        .with_context(|| format!("loading study configuration '{}'", path.display()))
}
