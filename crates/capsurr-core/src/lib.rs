//! Core data model of the capacity-expansion sampling pipeline: simulator
//! inputs and results, capacity adjustments, sample points, and the study
//! configuration.

pub mod adjust;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod model;
pub mod results;
pub mod sample;

pub use adjust::{
    adjust_capacity, adjust_flexibility, adjust_ntc, adjust_unit_capacity, AdjustOptions,
    CapacityTarget, TechFuel,
};
pub use config::{load_config_from_path, LhsCriterion, StudyConfig, TunerStrategy};
pub use error::{CapsurrError, CapsurrResult};
pub use model::{SimulationInputs, StorageParams, Unit};
pub use results::SimulationResults;
pub use sample::{SamplePoint, SAMPLE_COLUMNS};
