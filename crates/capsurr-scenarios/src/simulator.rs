//! Collaborators standing in for the external dispatch simulator.
//!
//! [`SimulationBuilder`] produces the simulator inputs of a study (the
//! reference bundle is built from them) and [`SimulatorRunner`] executes the
//! simulator on one bundle directory. Both are traits so tests and other
//! front-ends can substitute their own.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use capsurr_core::config::SimulationConfig;
use capsurr_core::{CapsurrError, SimulationInputs};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Builds the simulator inputs of a study from its configuration.
pub trait SimulationBuilder {
    fn build_simulation(&self) -> Result<SimulationInputs>;
}

/// Loads a baseline inputs file and cuts it to the configured window.
#[derive(Debug, Clone)]
pub struct FileSimulationBuilder {
    pub baseline: PathBuf,
    pub start: Option<DateTime<Utc>>,
    pub stop: Option<DateTime<Utc>>,
}

impl FileSimulationBuilder {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            baseline: config.baseline_inputs.clone(),
            start: config.start,
            stop: config.stop,
        }
    }
}

impl SimulationBuilder for FileSimulationBuilder {
    fn build_simulation(&self) -> Result<SimulationInputs> {
        if !self.baseline.is_file() {
            return Err(CapsurrError::Config(format!(
                "baseline inputs '{}' not found",
                self.baseline.display()
            ))
            .into());
        }
        let inputs = capsurr_io::read_inputs(&self.baseline)?;
        if self.start.is_none() && self.stop.is_none() {
            return Ok(inputs);
        }
        inputs
            .window(self.start, self.stop)
            .with_context(|| format!("cutting '{}' to the study window", self.baseline.display()))
    }
}

/// Outcome of one simulator execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Process exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Error flag recorded in the dataset: the exit code, or -1 when killed.
    pub fn error_flag(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }
}

/// Runs the simulator on one bundle directory.
pub trait SimulatorRunner {
    fn run(&self, bundle: &Path) -> Result<RunOutcome>;
}

/// Shells out to a configured executable; the bundle directory is appended
/// as the final argument.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandRunner {
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let (program, args) = config.simulator_command.split_first().ok_or_else(|| {
            CapsurrError::Config("simulation.simulator_command is not configured".into())
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl SimulatorRunner for CommandRunner {
    fn run(&self, bundle: &Path) -> Result<RunOutcome> {
        if !bundle.is_dir() {
            return Err(CapsurrError::Simulation(format!(
                "bundle '{}' does not exist",
                bundle.display()
            ))
            .into());
        }
        info!("running {} on {}", self.program, bundle.display());
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(bundle)
            .status()
            .with_context(|| format!("launching simulator '{}'", self.program))?;
        let outcome = RunOutcome {
            exit_code: status.code(),
        };
        if !outcome.success() {
            warn!(
                "simulator exited with {} for {}",
                status,
                bundle.display()
            );
        }
        Ok(outcome)
    }
}
