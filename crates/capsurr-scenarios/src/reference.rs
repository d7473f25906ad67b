//! Reference (baseline) bundle and its summary record.
//!
//! The reference record captures what the materializer needs to turn a
//! relative sample point into absolute capacities: the peak load, the
//! flexible/slow unit split, the mean capacity factors of wind and PV, and
//! the ratios the baseline itself sits at.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use capsurr_core::config::{StudyConfig, UnitClasses};
use capsurr_core::{CapsurrError, SimulationInputs, Unit};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::simulator::SimulationBuilder;

pub const REFERENCE_INFO_VERSION: u32 = 1;

/// Ratios of the reference system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRatios {
    /// Dispatchable plus storage capacity over peak load
    pub overcapacity: f64,
    pub share_flex: f64,
    pub share_sto: f64,
    pub share_wind: f64,
    pub share_pv: f64,
    pub rntc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceInfo {
    pub version: u32,
    pub peak_load: f64,
    pub flex_units: Vec<String>,
    pub slow_units: Vec<String>,
    pub cf_wind: f64,
    pub cf_pv: f64,
    pub ratios: ReferenceRatios,
}

fn is_flexible(unit: &Unit) -> bool {
    unit.part_load_min < 0.5 && unit.time_up_minimum < 5.0 && unit.ramp_up_rate > 0.01
}

/// Mean availability over the units whose id contains any of `patterns`.
fn capacity_factor(inputs: &SimulationInputs, patterns: &[String], label: &str) -> Result<f64> {
    let means = inputs.mean_availability();
    let matched: Vec<f64> = means
        .iter()
        .filter(|(id, _)| patterns.iter().any(|p| id.contains(p.as_str())))
        .map(|(_, mean)| *mean)
        .collect();
    if matched.is_empty() {
        return Err(CapsurrError::Validation(format!(
            "no {label} units with availability factors match {patterns:?}"
        ))
        .into());
    }
    Ok(matched.iter().sum::<f64>() / matched.len() as f64)
}

/// Summarise simulator inputs into a reference record.
pub fn summarize_reference(inputs: &SimulationInputs, classes: &UnitClasses) -> Result<ReferenceInfo> {
    let peak_load = inputs.peak_load();
    if peak_load <= 0.0 {
        return Err(CapsurrError::Validation("reference peak load is not positive".into()).into());
    }
    let cf_pv = capacity_factor(inputs, &classes.pv_patterns, "PV")?;
    let cf_wind = capacity_factor(inputs, &classes.wind_patterns, "wind")?;

    let thermal = |unit: &Unit| classes.thermal_fuels.iter().any(|f| *f == unit.fuel);
    let flex_units = inputs.select_units(|unit| thermal(unit) && is_flexible(unit));
    let slow_units = inputs.select_units(|unit| thermal(unit) && !is_flexible(unit));
    let sto_units = inputs.select_units(|unit| unit.fuel == classes.storage_fuel);
    let wind_units = inputs.select_units(|unit| unit.fuel == classes.wind_fuel);
    let pv_units = inputs.select_units(|unit| unit.technology == classes.pv_technology);

    let flex = inputs.installed_capacity(&flex_units);
    let slow = inputs.installed_capacity(&slow_units);
    let sto = inputs.installed_capacity(&sto_units);
    let wind = inputs.installed_capacity(&wind_units);
    let pv = inputs.installed_capacity(&pv_units);

    let share_flex = if flex + slow > 0.0 {
        flex / (flex + slow)
    } else {
        warn!("reference has no thermal capacity; flexible share set to 0");
        0.0
    };
    let ratios = ReferenceRatios {
        overcapacity: (flex + slow + sto) / peak_load,
        share_flex,
        share_sto: sto / peak_load,
        share_wind: wind / peak_load * cf_wind,
        share_pv: pv / peak_load * cf_pv,
        rntc: inputs.rntc(),
    };

    let coal: Vec<f64> = inputs
        .units
        .iter()
        .filter(|unit| unit.fuel == classes.coal_fuel)
        .filter_map(|unit| inputs.cost_variable.get(&unit.id))
        .filter(|series| !series.is_empty())
        .map(|series| series.iter().sum::<f64>() / series.len() as f64)
        .collect();
    if !coal.is_empty() {
        debug!(
            "mean variable cost of {} units: {:.2}",
            classes.coal_fuel,
            coal.iter().sum::<f64>() / coal.len() as f64
        );
    }

    info!(
        "reference: peak {:.1} MW, overcapacity {:.3}, flex share {:.3}, cf wind {:.3}, cf pv {:.3}",
        peak_load, ratios.overcapacity, ratios.share_flex, cf_wind, cf_pv
    );
    Ok(ReferenceInfo {
        version: REFERENCE_INFO_VERSION,
        peak_load,
        flex_units,
        slow_units,
        cf_wind,
        cf_pv,
        ratios,
    })
}

pub fn write_reference_info(path: &Path, info: &ReferenceInfo) -> Result<()> {
    capsurr_io::write_json(path, info)
        .with_context(|| format!("writing reference info '{}'", path.display()))
}

pub fn load_reference_info(path: &Path) -> Result<ReferenceInfo> {
    let data = fs::read_to_string(path).with_context(|| {
        format!(
            "reading reference info '{}'; run the reference stage first",
            path.display()
        )
    })?;
    let info: ReferenceInfo = serde_json::from_str(&data)
        .with_context(|| format!("parsing reference info '{}'", path.display()))?;
    if info.version != REFERENCE_INFO_VERSION {
        return Err(CapsurrError::Parse(format!(
            "reference info '{}' has version {}, expected {}",
            path.display(),
            info.version,
            REFERENCE_INFO_VERSION
        ))
        .into());
    }
    Ok(info)
}

/// Build the reference bundle and persist its summary.
///
/// The bundle lands in `<simulations_dir>/<reference_dir>`, replacing any
/// previous one.
pub fn build_reference(
    builder: &dyn SimulationBuilder,
    config: &StudyConfig,
) -> Result<ReferenceInfo> {
    let inputs = builder.build_simulation()?;
    let info = summarize_reference(&inputs, &config.simulation.classes)?;
    let bundle = config.reference_bundle();
    let inputs_file = config.dataset.inputs_file.clone();
    capsurr_io::replace_dir_staged(&bundle, |staging| {
        capsurr_io::write_inputs(&staging.join(&inputs_file), &inputs)
    })
    .with_context(|| format!("writing reference bundle '{}'", bundle.display()))?;
    write_reference_info(&config.simulation.reference_info, &info)?;
    info!(
        "reference bundle written to {} ({} units)",
        bundle.display(),
        inputs.units.len()
    );
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsurr_core::fixtures::{toy_inputs, GAS_UNIT, NUC_UNIT, PV_UNIT};
    use tempfile::tempdir;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn toy_reference_summary() {
        let info = summarize_reference(&toy_inputs(), &UnitClasses::default()).unwrap();
        assert!(close(info.peak_load, 100.0));
        assert!(close(info.cf_wind, 0.3));
        assert!(close(info.cf_pv, 0.2));
        assert_eq!(info.flex_units, vec![GAS_UNIT.to_string()]);
        assert_eq!(info.slow_units, vec![NUC_UNIT.to_string()]);
        assert!(close(info.ratios.overcapacity, 2.2));
        assert!(close(info.ratios.share_flex, 0.6));
        assert!(close(info.ratios.share_sto, 0.2));
        assert!(close(info.ratios.share_wind, 0.15));
        assert!(close(info.ratios.share_pv, 0.08));
        assert_eq!(info.ratios.rntc, 0.0);
    }

    #[test]
    fn missing_pv_units_fail() {
        let mut inputs = toy_inputs();
        inputs.availability_factor.remove(PV_UNIT);
        let err = summarize_reference(&inputs, &UnitClasses::default()).unwrap_err();
        assert!(err.to_string().contains("PV"));
    }

    #[test]
    fn reference_info_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reference-info.json");
        let info = summarize_reference(&toy_inputs(), &UnitClasses::default()).unwrap();
        write_reference_info(&path, &info).unwrap();
        assert_eq!(load_reference_info(&path).unwrap(), info);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reference-info.json");
        let mut info = summarize_reference(&toy_inputs(), &UnitClasses::default()).unwrap();
        info.version = 99;
        write_reference_info(&path, &info).unwrap();
        assert!(load_reference_info(&path).is_err());
    }

    #[test]
    fn absent_reference_info_names_the_stage() {
        let err = load_reference_info(Path::new("/nonexistent/reference-info.json")).unwrap_err();
        assert!(err.to_string().contains("reference stage"));
    }
}
