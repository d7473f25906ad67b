use std::path::Path;

use anyhow::{Context, Result};
use capsurr_core::StudyConfig;
use tracing::info;

use super::load_study;

/// Print the effective configuration as TOML. Without a config file the
/// defaults are printed.
pub fn handle(path: &Path) -> Result<()> {
    let config = if path.exists() {
        load_study(path)?
    } else {
        info!("{} not found; showing defaults", path.display());
        StudyConfig::default()
    };
    let text = toml::to_string_pretty(&config).context("rendering configuration as toml")?;
    print!("{text}");
    Ok(())
}
