use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use capsurr_core::config::StudyConfig;
use capsurr_core::{
    adjust_capacity, adjust_flexibility, adjust_ntc, AdjustOptions, CapacityTarget, CapsurrError,
    SamplePoint, SimulationInputs, TechFuel,
};
use chrono::Utc;
use tracing::{error, info};

use crate::manifest::{self, BundleRecord};
use crate::reference::ReferenceInfo;

/// How a sample point is turned into a bundle.
#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    pub storage: TechFuel,
    pub wind: TechFuel,
    pub pv: TechFuel,
    pub singleunit: bool,
    pub storage_full_power_time: Option<(f64, f64)>,
    pub inputs_file: String,
    pub coordinate_file: String,
}

impl From<&StudyConfig> for MaterializeOptions {
    fn from(config: &StudyConfig) -> Self {
        Self {
            storage: config.simulation.storage.clone(),
            wind: config.simulation.wind.clone(),
            pv: config.simulation.pv.clone(),
            singleunit: config.simulation.singleunit,
            storage_full_power_time: config.simulation.storage_full_power_time,
            inputs_file: config.dataset.inputs_file.clone(),
            coordinate_file: config.dataset.coordinate_file.clone(),
        }
    }
}

/// Rescale reference inputs to one sample point.
///
/// **Algorithm:**
/// 1. Storage capacity set to `peak * share_storage`.
/// 2. Flexible/slow split set to `share_flex`, total conserved.
/// 3. Interconnection rescaled so that rNTC equals the sample's `rntc`.
/// 4. Wind set to `peak * capacity_ratio * share_wind / cf_wind`, PV to
///    `peak * capacity_ratio * share_pv / cf_pv`.
pub fn apply_sample(
    inputs: &mut SimulationInputs,
    point: &SamplePoint,
    reference: &ReferenceInfo,
    options: &MaterializeOptions,
) -> Result<()> {
    if reference.cf_wind <= 0.0 || reference.cf_pv <= 0.0 {
        return Err(CapsurrError::Validation(format!(
            "reference capacity factors must be positive (wind {}, pv {})",
            reference.cf_wind, reference.cf_pv
        ))
        .into());
    }
    let peak = reference.peak_load;
    let storage_options = AdjustOptions {
        singleunit: options.singleunit,
        full_power_time: options.storage_full_power_time,
    };
    let plain = AdjustOptions {
        singleunit: options.singleunit,
        full_power_time: None,
    };

    adjust_capacity(
        inputs,
        &options.storage,
        CapacityTarget::Value(peak * point.share_storage),
        &storage_options,
    )
    .context("adjusting storage capacity")?;
    adjust_flexibility(
        inputs,
        &reference.flex_units,
        &reference.slow_units,
        point.share_flex,
        options.singleunit,
    )
    .context("adjusting flexibility")?;
    adjust_ntc(inputs, CapacityTarget::Value(point.rntc)).context("adjusting NTC")?;
    adjust_capacity(
        inputs,
        &options.wind,
        CapacityTarget::Value(peak * point.capacity_ratio * point.share_wind / reference.cf_wind),
        &plain,
    )
    .context("adjusting wind capacity")?;
    adjust_capacity(
        inputs,
        &options.pv,
        CapacityTarget::Value(peak * point.capacity_ratio * point.share_pv / reference.cf_pv),
        &plain,
    )
    .context("adjusting PV capacity")?;
    inputs
        .metadata
        .insert("sample_index".to_string(), point.index.to_string());
    Ok(())
}

/// Build the bundle of one sample under `simulations_dir`.
///
/// The bundle is assembled in a staging directory and moved into place, so
/// repeating the call replaces the bundle with identical content.
pub fn materialize_sample(
    reference_inputs: &SimulationInputs,
    point: &SamplePoint,
    reference: &ReferenceInfo,
    simulations_dir: &Path,
    options: &MaterializeOptions,
) -> Result<BundleRecord> {
    let mut inputs = reference_inputs.clone();
    apply_sample(&mut inputs, point, reference, options)
        .with_context(|| format!("materializing sample {}", point.index))?;
    let name = point.bundle_name();
    let dest = simulations_dir.join(&name);
    capsurr_io::replace_dir_staged(&dest, |staging| {
        capsurr_io::write_inputs(&staging.join(&options.inputs_file), &inputs)?;
        capsurr_io::write_coordinates(&staging.join(&options.coordinate_file), point)
    })?;
    info!("sample {} materialized in {}", point.index, dest.display());
    Ok(BundleRecord {
        index: point.index,
        bundle: name,
        sample: *point,
        created_at: Utc::now(),
    })
}

#[derive(Debug, Default)]
pub struct MaterializeSummary {
    pub records: Vec<BundleRecord>,
    /// Sample indices that failed, with the error message
    pub failures: Vec<(usize, String)>,
}

/// Materialize `points` from the study's reference bundle and record them
/// in the bundle manifest.
///
/// A failing sample is logged and skipped; the caller decides what the
/// failures mean for the run's exit status.
pub fn materialize_samples(
    config: &StudyConfig,
    reference: &ReferenceInfo,
    points: &[SamplePoint],
) -> Result<MaterializeSummary> {
    let reference_inputs_path: PathBuf = config
        .reference_bundle()
        .join(&config.dataset.inputs_file);
    if !reference_inputs_path.is_file() {
        return Err(CapsurrError::Config(format!(
            "reference bundle '{}' not found; run the reference stage first",
            reference_inputs_path.display()
        ))
        .into());
    }
    let reference_inputs = capsurr_io::read_inputs(&reference_inputs_path)?;
    let options = MaterializeOptions::from(config);
    let simulations_dir = &config.simulation.simulations_dir;

    let mut summary = MaterializeSummary::default();
    for point in points {
        match materialize_sample(&reference_inputs, point, reference, simulations_dir, &options) {
            Ok(record) => summary.records.push(record),
            Err(err) => {
                error!("sample {} failed: {:#}", point.index, err);
                summary.failures.push((point.index, format!("{err:#}")));
            }
        }
    }

    // Re-read right before writing so concurrent single-index runs lose as
    // little as possible.
    let manifest_path = simulations_dir.join(&config.dataset.manifest_file);
    let mut bundle_manifest = manifest::load_or_default(&manifest_path)?;
    for record in &summary.records {
        bundle_manifest.upsert(record.clone());
    }
    manifest::write_bundle_manifest(&manifest_path, &bundle_manifest)?;
    info!(
        "{} bundle(s) materialized, {} failed",
        summary.records.len(),
        summary.failures.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::summarize_reference;
    use capsurr_core::config::UnitClasses;
    use capsurr_core::fixtures::{toy_inputs, GAS_UNIT, NUC_UNIT, PV_UNIT, STO_UNIT, WIND_UNIT};
    use tempfile::tempdir;

    fn options() -> MaterializeOptions {
        MaterializeOptions::from(&StudyConfig::default())
    }

    fn toy_point() -> SamplePoint {
        SamplePoint::from_values(0, &[1.0, 0.5, 0.1, 0.2, 0.3, 0.4]).unwrap()
    }

    #[test]
    fn toy_sample_hits_target_capacities() {
        let base = toy_inputs();
        let reference = summarize_reference(&base, &UnitClasses::default()).unwrap();
        let mut inputs = base.clone();
        apply_sample(&mut inputs, &toy_point(), &reference, &options()).unwrap();

        let cap = |id: &str| inputs.unit(id).unwrap().installed_capacity();
        assert!((cap(STO_UNIT) - 10.0).abs() < 1e-9);
        assert!((cap(WIND_UNIT) - 200.0 / 3.0).abs() < 1e-9);
        assert!((cap(PV_UNIT) - 150.0).abs() < 1e-9);
        // 200 MW of thermal split evenly
        assert!((cap(GAS_UNIT) - 100.0).abs() < 1e-9);
        assert!((cap(NUC_UNIT) - 100.0).abs() < 1e-9);
        // storage energy follows power
        let storage = inputs.unit(STO_UNIT).unwrap().storage.as_ref().unwrap();
        assert!((storage.capacity - 40.0).abs() < 1e-9);
        // the toy zone has no lines, so the rNTC target of 0.4 leaves it at zero
        assert!(inputs.flow_maximum.is_empty());
        assert_eq!(inputs.rntc(), 0.0);
    }

    #[test]
    fn zero_wind_capacity_factor_is_rejected() {
        let base = toy_inputs();
        let mut reference = summarize_reference(&base, &UnitClasses::default()).unwrap();
        reference.cf_wind = 0.0;
        let mut inputs = base.clone();
        assert!(apply_sample(&mut inputs, &toy_point(), &reference, &options()).is_err());
    }

    #[test]
    fn materialization_is_idempotent() {
        let dir = tempdir().unwrap();
        let base = toy_inputs();
        let reference = summarize_reference(&base, &UnitClasses::default()).unwrap();
        let point = toy_point();

        let first = materialize_sample(&base, &point, &reference, dir.path(), &options()).unwrap();
        let bundle = dir.path().join(&first.bundle);
        let inputs_once = std::fs::read(bundle.join("Inputs.json")).unwrap();
        let coords_once = std::fs::read(bundle.join("sample.csv")).unwrap();

        materialize_sample(&base, &point, &reference, dir.path(), &options()).unwrap();
        assert_eq!(std::fs::read(bundle.join("Inputs.json")).unwrap(), inputs_once);
        assert_eq!(std::fs::read(bundle.join("sample.csv")).unwrap(), coords_once);
        // no staging leftovers next to the bundle
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let coords = capsurr_io::read_coordinates(&bundle.join("sample.csv"), 0).unwrap();
        assert_eq!(coords, point);
    }

    #[test]
    fn missing_reference_bundle_aborts() {
        let dir = tempdir().unwrap();
        let mut config = StudyConfig::default();
        config.simulation.simulations_dir = dir.path().join("simulations");
        let reference = summarize_reference(&toy_inputs(), &UnitClasses::default()).unwrap();
        let err = materialize_samples(&config, &reference, &[toy_point()]).unwrap_err();
        assert!(err.to_string().contains("reference bundle"));
    }
}
