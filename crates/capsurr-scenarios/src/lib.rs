//! Sampling, reference and materialization stages of the study.
//!
//! The stages run in order: [`sampler`] draws the design, [`reference`]
//! builds and summarises the baseline bundle, and [`materialize`] turns each
//! sample point into a simulator input bundle recorded in the
//! [`manifest`].

pub mod manifest;
pub mod materialize;
pub mod reference;
pub mod sampler;
pub mod simulator;

use anyhow::{Context, Result};
use capsurr_core::config::SamplingConfig;
use capsurr_core::SamplePoint;
use tracing::info;

pub use manifest::{load_bundle_manifest, BundleManifest, BundleRecord};
pub use materialize::{apply_sample, materialize_sample, materialize_samples, MaterializeOptions};
pub use reference::{build_reference, load_reference_info, ReferenceInfo};
pub use sampler::{draw_sample_points, draw_samples, SamplerOptions};
pub use simulator::{
    CommandRunner, FileSimulationBuilder, RunOutcome, SimulationBuilder, SimulatorRunner,
};

/// Sample design of the study: the saved samples file when it exists,
/// otherwise a fresh draw.
pub fn load_or_draw_samples(config: &SamplingConfig) -> Result<Vec<SamplePoint>> {
    if config.samples_file.is_file() {
        info!("reusing samples from {}", config.samples_file.display());
        return capsurr_io::read_samples(&config.samples_file)
            .with_context(|| format!("loading samples '{}'", config.samples_file.display()));
    }
    draw_sample_points(config)
}
