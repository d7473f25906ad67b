//! Small single-zone system used across the workspace's tests.
//!
//! Reference summary of [`toy_inputs`]: peak load 100 MW, `cf_wind` 0.3,
//! `cf_pv` 0.2, overcapacity 2.2, flexible share 0.6, storage share 0.2,
//! wind share 0.15, PV share 0.08, no interconnection.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};

use crate::model::{SimulationInputs, StorageParams, Unit};
use crate::results::SimulationResults;

pub const TOY_HOURS: usize = 24;
pub const TOY_ZONE: &str = "Z1";
pub const TOY_PEAK_HOUR: usize = 18;

pub const GAS_UNIT: &str = "Z1_COMC_GAS";
pub const NUC_UNIT: &str = "Z1_STUR_NUC";
pub const STO_UNIT: &str = "Z1_BATS_OTH";
pub const WIND_UNIT: &str = "Z1_WTON_WIN";
pub const PV_UNIT: &str = "Z1_PHOT_SUN";

fn pv_profile() -> Vec<f64> {
    (0..TOY_HOURS)
        .map(|h| if (6..18).contains(&h) { 0.4 } else { 0.0 })
        .collect()
}

pub fn toy_inputs() -> SimulationInputs {
    let start = Utc
        .with_ymd_and_hms(2022, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let mut inputs = SimulationInputs::new(start, vec![TOY_ZONE.to_string()]);

    let demand = (0..TOY_HOURS)
        .map(|h| if h == TOY_PEAK_HOUR { 100.0 } else { 70.0 })
        .collect();
    inputs.demand.insert(TOY_ZONE.to_string(), demand);

    let mut gas = Unit::new(GAS_UNIT, TOY_ZONE, "COMC", "GAS", 60.0);
    gas.nunits = 2.0;
    gas.part_load_min = 0.3;
    gas.time_up_minimum = 2.0;
    gas.ramp_up_rate = 0.05;
    gas.cost_start_up = 1200.0;
    gas.no_load_cost = 300.0;
    gas.ramp_up_maximum = 30.0;
    gas.ramp_down_maximum = 30.0;

    let mut nuc = Unit::new(NUC_UNIT, TOY_ZONE, "STUR", "NUC", 80.0);
    nuc.part_load_min = 0.6;
    nuc.time_up_minimum = 24.0;
    nuc.ramp_up_rate = 0.005;
    nuc.cost_start_up = 8000.0;

    let mut sto = Unit::new(STO_UNIT, TOY_ZONE, "BATS", "OTH", 20.0);
    sto.storage = Some(StorageParams {
        capacity: 80.0,
        charging_capacity: 20.0,
        initial: 40.0,
    });

    let wind = Unit::new(WIND_UNIT, TOY_ZONE, "WTON", "WIN", 50.0);
    let pv = Unit::new(PV_UNIT, TOY_ZONE, "PHOT", "SUN", 40.0);

    inputs.units = vec![gas, nuc, sto, wind, pv];
    inputs
        .availability_factor
        .insert(WIND_UNIT.to_string(), vec![0.3; TOY_HOURS]);
    inputs
        .availability_factor
        .insert(PV_UNIT.to_string(), pv_profile());
    inputs
        .cost_variable
        .insert(GAS_UNIT.to_string(), vec![85.0; TOY_HOURS]);
    inputs
        .cost_variable
        .insert(NUC_UNIT.to_string(), vec![10.0; TOY_HOURS]);
    inputs
        .metadata
        .insert("description".to_string(), "toy single-zone system".to_string());
    inputs
}

/// Results for [`toy_inputs`].
///
/// Derived metrics: CF_gas 1/3, CF_nuc 0.375, CF_win 0.3, CF_sun 0.2,
/// CF_wat 0; max curtailment 5 MW; max shedding 2 MW; 1 MWh lost load;
/// cost 24000 EUR over 1710 MWh of demand.
pub fn toy_results() -> SimulationResults {
    let mut results = SimulationResults::default();
    results
        .output_power
        .insert(GAS_UNIT.to_string(), vec![40.0; TOY_HOURS]);
    results
        .output_power
        .insert(NUC_UNIT.to_string(), vec![30.0; TOY_HOURS]);
    results
        .output_power
        .insert(WIND_UNIT.to_string(), vec![15.0; TOY_HOURS]);
    results.output_power.insert(
        PV_UNIT.to_string(),
        pv_profile().iter().map(|af| af * 40.0).collect(),
    );

    let spike = |hour: usize, value: f64| -> Vec<f64> {
        (0..TOY_HOURS)
            .map(|h| if h == hour { value } else { 0.0 })
            .collect()
    };
    results
        .curtailment
        .insert(TOY_ZONE.to_string(), spike(12, 5.0));
    results
        .shed_load
        .insert(TOY_ZONE.to_string(), spike(TOY_PEAK_HOUR, 2.0));
    let mut lost = BTreeMap::new();
    lost.insert(TOY_ZONE.to_string(), spike(TOY_PEAK_HOUR, 1.0));
    results
        .lost_load
        .insert("LostLoad_MaxPower".to_string(), lost);
    results.total_system_cost = vec![1000.0; TOY_HOURS];
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toy_inputs_are_consistent() {
        let inputs = toy_inputs();
        inputs.validate().unwrap();
        assert_eq!(inputs.hours(), TOY_HOURS);
        assert_eq!(inputs.peak_load(), 100.0);
        assert_eq!(inputs.rntc(), 0.0);
        let means = inputs.mean_availability();
        assert!((means[PV_UNIT] - 0.2).abs() < 1e-12);
        assert!((means[WIND_UNIT] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn toy_capacity_by_fuel() {
        let by_fuel = toy_inputs().capacity_by_fuel();
        let expected: Vec<(&str, f64)> = vec![
            ("GAS", 120.0),
            ("NUC", 80.0),
            ("OTH", 20.0),
            ("SUN", 40.0),
            ("WIN", 50.0),
        ];
        let found: Vec<(&str, f64)> = by_fuel.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(found, expected);
    }
}
