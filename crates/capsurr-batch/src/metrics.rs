//! Outcome metrics of one simulated bundle.

use std::collections::BTreeMap;

use capsurr_core::results::{hourly_sum, total_energy};
use capsurr_core::{SimulationInputs, SimulationResults};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A line counts as congested in an hour when its flow is within this
/// margin (MW) of the transfer capacity.
pub const CONGESTION_TOLERANCE: f64 = 1e-3;

const MWH_PER_TWH: f64 = 1e6;

/// Fuels whose capacity factor is reported.
pub const CF_FUELS: [&str; 5] = ["GAS", "NUC", "WAT", "WIN", "SUN"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleMetrics {
    /// EUR per MWh of demand
    pub cost: f64,
    /// Line-hours at transfer capacity
    pub congestion: f64,
    pub peak_load: f64,
    pub max_curtailment: f64,
    pub max_load_shedding: f64,
    /// TWh
    pub demand: f64,
    pub net_imports: f64,
    pub curtailment: f64,
    pub shedding: f64,
    pub lost_load: f64,
    pub cf_gas: f64,
    pub cf_nuc: f64,
    pub cf_wat: f64,
    pub cf_win: f64,
    pub cf_sun: f64,
}

fn max_or_zero(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

/// Capacity factor of one fuel: generated energy over the energy its
/// installed capacity could produce. Zero without installed capacity.
pub fn capacity_factor(inputs: &SimulationInputs, results: &SimulationResults, fuel: &str) -> f64 {
    let capacity = inputs.capacity_by_fuel();
    fuel_capacity_factor(inputs, results, fuel, &capacity)
}

fn fuel_capacity_factor(
    inputs: &SimulationInputs,
    results: &SimulationResults,
    fuel: &str,
    capacity: &BTreeMap<String, f64>,
) -> f64 {
    let hours = inputs.hours() as f64;
    let installed = capacity.get(fuel).copied().unwrap_or(0.0);
    if installed <= 0.0 || hours == 0.0 {
        return 0.0;
    }
    let energy: f64 = inputs
        .units
        .iter()
        .filter(|unit| unit.fuel == fuel)
        .filter_map(|unit| results.output_power.get(&unit.id))
        .map(|series| series.iter().sum::<f64>())
        .sum();
    energy / (installed * hours)
}

/// Line-hours where `|flow| >= flow_maximum - tolerance` on lines with a
/// positive transfer capacity.
pub fn congestion_hours(inputs: &SimulationInputs, results: &SimulationResults) -> f64 {
    let mut hours = 0usize;
    for (line, flows) in &results.flows {
        let Some(limits) = inputs.flow_maximum.get(line) else {
            continue;
        };
        hours += flows
            .iter()
            .zip(limits)
            .filter(|(flow, limit)| **limit > 0.0 && flow.abs() >= **limit - CONGESTION_TOLERANCE)
            .count();
    }
    hours as f64
}

pub fn compute_metrics(inputs: &SimulationInputs, results: &SimulationResults) -> BundleMetrics {
    let demand = inputs.system_demand();
    let total_demand: f64 = demand.iter().sum();
    let total_cost: f64 = results.total_system_cost.iter().sum();
    let cost = if total_demand > 0.0 {
        total_cost / total_demand
    } else {
        0.0
    };

    let missing = results.missing_lost_load_categories();
    if !missing.is_empty() {
        debug!("lost-load categories absent, counted as zero: {:?}", missing);
    }

    let capacity = inputs.capacity_by_fuel();
    let cf = |fuel: &str| fuel_capacity_factor(inputs, results, fuel, &capacity);
    BundleMetrics {
        cost,
        congestion: congestion_hours(inputs, results),
        peak_load: max_or_zero(&demand),
        max_curtailment: max_or_zero(&hourly_sum(&results.curtailment)),
        max_load_shedding: max_or_zero(&hourly_sum(&results.shed_load)),
        demand: total_demand / MWH_PER_TWH,
        net_imports: total_energy(&results.net_imports) / MWH_PER_TWH,
        curtailment: total_energy(&results.curtailment) / MWH_PER_TWH,
        shedding: total_energy(&results.shed_load) / MWH_PER_TWH,
        lost_load: results.lost_load_total() / MWH_PER_TWH,
        cf_gas: cf(CF_FUELS[0]),
        cf_nuc: cf(CF_FUELS[1]),
        cf_wat: cf(CF_FUELS[2]),
        cf_win: cf(CF_FUELS[3]),
        cf_sun: cf(CF_FUELS[4]),
    }
}
