//! Study configuration.
//!
//! One [`StudyConfig`] describes a whole study: how to sample the design,
//! where the baseline and the simulation bundles live, how results are
//! collected, and how the surrogate is trained. It is loaded once by the
//! CLI and handed to each stage explicitly.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adjust::TechFuel;
use crate::error::CapsurrError;
use crate::sample::SAMPLE_COLUMNS;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub surrogate: SurrogateConfig,
}

/// Latin-hypercube design criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LhsCriterion {
    /// Random point inside each stratum
    Random,
    /// Stratum centres
    #[serde(alias = "c")]
    Center,
    /// Maximise the minimum pairwise distance
    #[default]
    #[serde(alias = "m")]
    Maximin,
    /// Maximin over centred designs
    #[serde(alias = "cm")]
    CenterMaximin,
    /// Minimise the maximum column correlation
    #[serde(alias = "corr")]
    Correlation,
}

impl FromStr for LhsCriterion {
    type Err = CapsurrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(LhsCriterion::Random),
            "center" | "c" => Ok(LhsCriterion::Center),
            "maximin" | "m" => Ok(LhsCriterion::Maximin),
            "centermaximin" | "cm" => Ok(LhsCriterion::CenterMaximin),
            "correlation" | "corr" => Ok(LhsCriterion::Correlation),
            other => Err(CapsurrError::Config(format!(
                "unknown sampling criterion '{other}' (expected random, center, maximin, centermaximin or correlation)"
            ))),
        }
    }
}

impl fmt::Display for LhsCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LhsCriterion::Random => "random",
            LhsCriterion::Center => "center",
            LhsCriterion::Maximin => "maximin",
            LhsCriterion::CenterMaximin => "centermaximin",
            LhsCriterion::Correlation => "correlation",
        };
        f.write_str(name)
    }
}

/// Hyperparameter search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunerStrategy {
    Random,
    #[default]
    Bayesian,
    Hyperband,
}

impl FromStr for TunerStrategy {
    type Err = CapsurrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(TunerStrategy::Random),
            "bayesian" => Ok(TunerStrategy::Bayesian),
            "hyperband" => Ok(TunerStrategy::Hyperband),
            other => Err(CapsurrError::Config(format!(
                "unknown tuner '{other}' (expected random, bayesian or hyperband)"
            ))),
        }
    }
}

impl fmt::Display for TunerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TunerStrategy::Random => "random",
            TunerStrategy::Bayesian => "bayesian",
            TunerStrategy::Hyperband => "hyperband",
        };
        f.write_str(name)
    }
}

/// Bounds of one design dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl DimensionRange {
    pub fn new(name: &str, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
        }
    }
}

/// The six study parameters with their default bounds.
pub fn default_ranges() -> Vec<DimensionRange> {
    let bounds = [
        (0.5, 1.8),
        (0.01, 0.99),
        (0.0, 0.5),
        (0.0, 0.5),
        (0.2, 0.5),
        (0.0, 0.7),
    ];
    SAMPLE_COLUMNS
        .iter()
        .zip(bounds)
        .map(|(name, (min, max))| DimensionRange::new(name, min, max))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    #[serde(default)]
    pub criterion: LhsCriterion,
    /// Candidate designs drawn by the optimising criteria
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Seed for the design; `None` draws from entropy
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_ranges")]
    pub ranges: Vec<DimensionRange>,
    #[serde(default = "default_true")]
    pub write_samples: bool,
    #[serde(default = "default_samples_file")]
    pub samples_file: PathBuf,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            n_samples: default_n_samples(),
            criterion: LhsCriterion::default(),
            iterations: default_iterations(),
            seed: None,
            ranges: default_ranges(),
            write_samples: true,
            samples_file: default_samples_file(),
        }
    }
}

fn default_n_samples() -> usize {
    2400
}

fn default_iterations() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_samples_file() -> PathBuf {
    PathBuf::from("samples.csv")
}

/// How reference units are classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitClasses {
    #[serde(default = "default_thermal_fuels")]
    pub thermal_fuels: Vec<String>,
    #[serde(default = "default_storage_fuel")]
    pub storage_fuel: String,
    #[serde(default = "default_wind_fuel")]
    pub wind_fuel: String,
    #[serde(default = "default_pv_technology")]
    pub pv_technology: String,
    /// Substrings of unit ids whose availability defines `cf_wind`
    #[serde(default = "default_wind_patterns")]
    pub wind_patterns: Vec<String>,
    /// Substrings of unit ids whose availability defines `cf_pv`
    #[serde(default = "default_pv_patterns")]
    pub pv_patterns: Vec<String>,
    /// Fuel whose mean variable cost is logged
    #[serde(default = "default_coal_fuel")]
    pub coal_fuel: String,
}

impl Default for UnitClasses {
    fn default() -> Self {
        Self {
            thermal_fuels: default_thermal_fuels(),
            storage_fuel: default_storage_fuel(),
            wind_fuel: default_wind_fuel(),
            pv_technology: default_pv_technology(),
            wind_patterns: default_wind_patterns(),
            pv_patterns: default_pv_patterns(),
            coal_fuel: default_coal_fuel(),
        }
    }
}

fn default_thermal_fuels() -> Vec<String> {
    ["GAS", "HRD", "OIL", "BIO", "LIG", "PEA", "NUC", "GEO"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_storage_fuel() -> String {
    "OTH".to_string()
}

fn default_wind_fuel() -> String {
    "WIN".to_string()
}

fn default_pv_technology() -> String {
    "PHOT".to_string()
}

fn default_wind_patterns() -> Vec<String> {
    vec!["WindOn".to_string(), "WTON".to_string()]
}

fn default_pv_patterns() -> Vec<String> {
    vec!["PHOT".to_string()]
}

fn default_coal_fuel() -> String {
    "HRD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Baseline simulator inputs every bundle is derived from
    #[serde(default = "default_baseline_inputs")]
    pub baseline_inputs: PathBuf,
    #[serde(default = "default_simulations_dir")]
    pub simulations_dir: PathBuf,
    /// Name of the reference bundle inside `simulations_dir`
    #[serde(default = "default_reference_dir")]
    pub reference_dir: String,
    #[serde(default = "default_reference_info")]
    pub reference_info: PathBuf,
    /// First hour of the simulated window (inclusive)
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// End of the simulated window (exclusive)
    #[serde(default)]
    pub stop: Option<DateTime<Utc>>,
    #[serde(default = "default_storage_tech")]
    pub storage: TechFuel,
    #[serde(default = "default_wind_tech")]
    pub wind: TechFuel,
    #[serde(default = "default_pv_tech")]
    pub pv: TechFuel,
    /// Full-power time window (hours) for storage selection
    #[serde(default)]
    pub storage_full_power_time: Option<(f64, f64)>,
    #[serde(default = "default_true")]
    pub singleunit: bool,
    #[serde(default)]
    pub classes: UnitClasses,
    /// Simulator executable and leading arguments; the bundle directory is
    /// appended as the last argument.
    #[serde(default)]
    pub simulator_command: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            baseline_inputs: default_baseline_inputs(),
            simulations_dir: default_simulations_dir(),
            reference_dir: default_reference_dir(),
            reference_info: default_reference_info(),
            start: None,
            stop: None,
            storage: default_storage_tech(),
            wind: default_wind_tech(),
            pv: default_pv_tech(),
            storage_full_power_time: None,
            singleunit: true,
            classes: UnitClasses::default(),
            simulator_command: Vec::new(),
        }
    }
}

fn default_baseline_inputs() -> PathBuf {
    PathBuf::from("baseline/Inputs.json")
}

fn default_simulations_dir() -> PathBuf {
    PathBuf::from("simulations")
}

fn default_reference_dir() -> String {
    "reference".to_string()
}

fn default_reference_info() -> PathBuf {
    PathBuf::from("reference-info.json")
}

fn default_storage_tech() -> TechFuel {
    TechFuel::new("BATS", "OTH")
}

fn default_wind_tech() -> TechFuel {
    TechFuel::new("WTON", "WIN")
}

fn default_pv_tech() -> TechFuel {
    TechFuel::new("PHOT", "SUN")
}

/// File names inside a bundle and the dataset destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_file")]
    pub dataset_file: PathBuf,
    #[serde(default = "default_inputs_file")]
    pub inputs_file: String,
    #[serde(default = "default_results_file")]
    pub results_file: String,
    /// Written by the simulator when a run fails; its presence excludes the
    /// bundle from collection.
    #[serde(default = "default_debug_file")]
    pub debug_file: String,
    #[serde(default = "default_coordinate_file")]
    pub coordinate_file: String,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dataset_file: default_dataset_file(),
            inputs_file: default_inputs_file(),
            results_file: default_results_file(),
            debug_file: default_debug_file(),
            coordinate_file: default_coordinate_file(),
            manifest_file: default_manifest_file(),
        }
    }
}

fn default_dataset_file() -> PathBuf {
    PathBuf::from("dataset.csv")
}

fn default_inputs_file() -> String {
    "Inputs.json".to_string()
}

fn default_results_file() -> String {
    "Results.json".to_string()
}

fn default_debug_file() -> String {
    "debug.json".to_string()
}

fn default_coordinate_file() -> String {
    "sample.csv".to_string()
}

fn default_manifest_file() -> String {
    "bundle_manifest.json".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateConfig {
    #[serde(default)]
    pub tuner: TunerStrategy,
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,
    #[serde(default = "default_executions_per_trial")]
    pub executions_per_trial: usize,
    /// Epochs of the final fit
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Epochs per tuner trial
    #[serde(default = "default_tuner_epochs")]
    pub tuner_epochs: usize,
    /// Maximum epochs per hyperband bracket; defaults to `tuner_epochs + 15`
    #[serde(default)]
    pub hyperband_max_epochs: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Early-stopping patience during the search
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,
    #[serde(default = "default_val_ratio")]
    pub val_ratio: f64,
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    #[serde(default = "default_features")]
    pub features: Vec<String>,
    #[serde(default = "default_outputs")]
    pub outputs: Vec<String>,
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_surrogate_seed")]
    pub seed: u64,
    /// Bounds of the architecture search
    #[serde(default = "default_min_layers")]
    pub min_layers: usize,
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,
    #[serde(default = "default_max_units")]
    pub max_units: usize,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            tuner: TunerStrategy::default(),
            max_trials: default_max_trials(),
            executions_per_trial: default_executions_per_trial(),
            epochs: default_epochs(),
            tuner_epochs: default_tuner_epochs(),
            hyperband_max_epochs: None,
            batch_size: default_batch_size(),
            patience: default_patience(),
            train_ratio: default_train_ratio(),
            val_ratio: default_val_ratio(),
            test_ratio: default_test_ratio(),
            features: default_features(),
            outputs: default_outputs(),
            model_path: default_model_path(),
            seed: default_surrogate_seed(),
            min_layers: default_min_layers(),
            max_layers: default_max_layers(),
            max_units: default_max_units(),
        }
    }
}

fn default_max_trials() -> usize {
    64
}

fn default_executions_per_trial() -> usize {
    5
}

fn default_epochs() -> usize {
    200
}

fn default_tuner_epochs() -> usize {
    75
}

fn default_batch_size() -> usize {
    32
}

fn default_patience() -> usize {
    5
}

fn default_train_ratio() -> f64 {
    0.7
}

fn default_val_ratio() -> f64 {
    0.1
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_features() -> Vec<String> {
    SAMPLE_COLUMNS.iter().map(|s| s.to_string()).collect()
}

fn default_outputs() -> Vec<String> {
    vec![
        "Curtailment_[TWh]".to_string(),
        "MaxLoadShedding_[MW]".to_string(),
    ]
}

fn default_model_path() -> PathBuf {
    PathBuf::from("surrogate/model.json")
}

fn default_surrogate_seed() -> u64 {
    42
}

fn default_min_layers() -> usize {
    2
}

fn default_max_layers() -> usize {
    10
}

fn default_max_units() -> usize {
    512
}

impl StudyConfig {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let sampling = &self.sampling;
        if sampling.n_samples == 0 {
            return Err(CapsurrError::Config("sampling.n_samples must be positive".into()).into());
        }
        if sampling.ranges.len() != SAMPLE_COLUMNS.len() {
            return Err(CapsurrError::Config(format!(
                "sampling.ranges must list {} dimensions ({}), got {}",
                SAMPLE_COLUMNS.len(),
                SAMPLE_COLUMNS.join(", "),
                sampling.ranges.len()
            ))
            .into());
        }
        for range in &sampling.ranges {
            if !(range.min <= range.max) {
                return Err(CapsurrError::Config(format!(
                    "range '{}' has min {} > max {}",
                    range.name, range.min, range.max
                ))
                .into());
            }
        }
        let s = &self.surrogate;
        let ratios = [s.train_ratio, s.val_ratio, s.test_ratio];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) || s.train_ratio == 0.0 {
            return Err(CapsurrError::Config(format!(
                "split ratios must lie in [0, 1] with a non-empty training share, got {ratios:?}"
            ))
            .into());
        }
        if (ratios.iter().sum::<f64>() - 1.0).abs() > 1e-6 {
            return Err(CapsurrError::Config(format!(
                "split ratios must sum to 1, got {ratios:?}"
            ))
            .into());
        }
        if s.features.is_empty() || s.outputs.is_empty() {
            return Err(
                CapsurrError::Config("surrogate features and outputs must be set".into()).into(),
            );
        }
        if s.min_layers == 0 || s.min_layers > s.max_layers || s.max_units < 32 {
            return Err(CapsurrError::Config(format!(
                "invalid search bounds: layers {}..={}, max_units {} (at least 32)",
                s.min_layers, s.max_layers, s.max_units
            ))
            .into());
        }
        if s.batch_size == 0 || s.max_trials == 0 || s.executions_per_trial == 0 {
            return Err(CapsurrError::Config(
                "batch_size, max_trials and executions_per_trial must be positive".into(),
            )
            .into());
        }
        Ok(())
    }

    /// Resolve every relative path against `base` (the config file's
    /// directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        join(&mut self.sampling.samples_file);
        join(&mut self.simulation.baseline_inputs);
        join(&mut self.simulation.simulations_dir);
        join(&mut self.simulation.reference_info);
        join(&mut self.dataset.dataset_file);
        join(&mut self.surrogate.model_path);
    }

    /// Directory of the reference bundle.
    pub fn reference_bundle(&self) -> PathBuf {
        self.simulation
            .simulations_dir
            .join(&self.simulation.reference_dir)
    }
}

/// Load a study configuration; the format follows the file extension
/// (`.toml`, `.json`, `.yaml`/`.yml`). Relative paths inside the file are
/// resolved against the file's directory.
pub fn load_config_from_path(path: &Path) -> Result<StudyConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading study config '{}'", path.display()))?;
    let mut config: StudyConfig = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing study config yaml")?
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing study config json")?
        }
        _ => toml::from_str(&data).context("parsing study config toml")?,
    };
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;
    Ok(config)
}
