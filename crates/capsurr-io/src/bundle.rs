//! Simulation bundle files.
//!
//! A bundle directory holds the simulator inputs, the results once the
//! simulator has run, and a coordinate file with the exact sample point the
//! bundle was built from. The coordinate file is a two-column CSV:
//!
//! ```text
//! ,LHS-sample
//! CapacityRatio,1.2345
//! ShareFlex,0.5
//! ...
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use capsurr_core::{CapsurrError, SamplePoint, SimulationInputs, SimulationResults, SAMPLE_COLUMNS};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::staged::write_file_staged;

/// Header of the coordinate file's value column.
pub const COORDINATE_HEADER: &str = "LHS-sample";

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading {what} '{}'", path.display()))?;
    serde_json::from_str(&data)
        .map_err(CapsurrError::from)
        .with_context(|| format!("parsing {what} '{}'", path.display()))
}

/// Pretty-printed JSON written through a staging file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_file_staged(path, "json", |writer| {
        serde_json::to_writer_pretty(&mut *writer, value)
            .with_context(|| format!("serializing '{}'", path.display()))?;
        writeln!(writer)?;
        Ok(())
    })
}

pub fn read_inputs(path: &Path) -> Result<SimulationInputs> {
    let inputs: SimulationInputs = read_json(path, "simulation inputs")?;
    inputs
        .validate()
        .with_context(|| format!("validating simulation inputs '{}'", path.display()))?;
    Ok(inputs)
}

pub fn write_inputs(path: &Path, inputs: &SimulationInputs) -> Result<()> {
    write_json(path, inputs)
}

pub fn read_results(path: &Path) -> Result<SimulationResults> {
    read_json(path, "simulation results")
}

pub fn write_results(path: &Path, results: &SimulationResults) -> Result<()> {
    write_json(path, results)
}

/// Write the coordinate file of one sample point.
pub fn write_coordinates(path: &Path, point: &SamplePoint) -> Result<()> {
    write_file_staged(path, "coords", |writer| {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["", COORDINATE_HEADER])?;
        for (name, value) in SAMPLE_COLUMNS.iter().zip(point.values()) {
            csv.write_record([name.to_string(), value.to_string()])?;
        }
        csv.flush()?;
        Ok(())
    })
    .with_context(|| format!("writing coordinate file '{}'", path.display()))
}

/// Read a coordinate file back into the sample point with the given index.
///
/// Rows may appear in any order; every study parameter must be present.
pub fn read_coordinates(path: &Path, index: usize) -> Result<SamplePoint> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening coordinate file '{}'", path.display()))?;
    let mut values = [f64::NAN; 6];
    let mut seen = [false; 6];
    for record in reader.records() {
        let record =
            record.with_context(|| format!("reading coordinate file '{}'", path.display()))?;
        let name = record.get(0).unwrap_or_default().trim();
        let raw = record.get(1).unwrap_or_default().trim();
        let Some(pos) = SAMPLE_COLUMNS.iter().position(|column| *column == name) else {
            continue;
        };
        values[pos] = raw.parse().map_err(|err| {
            anyhow!(
                "invalid value '{}' for {} in '{}': {}",
                raw,
                name,
                path.display(),
                err
            )
        })?;
        seen[pos] = true;
    }
    if let Some(missing) = seen.iter().position(|present| !present) {
        return Err(CapsurrError::Parse(format!(
            "coordinate file '{}' lacks {}",
            path.display(),
            SAMPLE_COLUMNS[missing]
        ))
        .into());
    }
    SamplePoint::from_values(index, &values)
}
