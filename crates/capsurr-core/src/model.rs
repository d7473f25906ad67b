//! Simulator input data model.
//!
//! A [`SimulationInputs`] value is the in-memory form of one simulator input
//! bundle: the unit table plus the hourly series the reference builder
//! summarises and the capacity adjustments rescale. All keyed collections are
//! `BTreeMap`s so that serializing the same inputs twice yields the same bytes.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CapsurrError;

pub const INPUTS_FORMAT_VERSION: u32 = 1;

fn default_inputs_version() -> u32 {
    INPUTS_FORMAT_VERSION
}

fn default_nunits() -> f64 {
    1.0
}

/// Storage parameters attached to a storage unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageParams {
    /// Energy capacity (MWh)
    pub capacity: f64,
    /// Charging power capacity (MW)
    #[serde(default)]
    pub charging_capacity: f64,
    /// Initial state of charge (MWh)
    #[serde(default)]
    pub initial: f64,
}

/// One row of the simulator's unit table.
///
/// `power_capacity` is the capacity of a single unit; the installed capacity
/// is `power_capacity * nunits`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub zone: String,
    pub technology: String,
    pub fuel: String,
    pub power_capacity: f64,
    #[serde(default = "default_nunits")]
    pub nunits: f64,
    #[serde(default)]
    pub part_load_min: f64,
    #[serde(default)]
    pub time_up_minimum: f64,
    #[serde(default)]
    pub ramp_up_rate: f64,
    #[serde(default)]
    pub cost_start_up: f64,
    #[serde(default)]
    pub cost_shut_down: f64,
    #[serde(default)]
    pub no_load_cost: f64,
    #[serde(default)]
    pub power_initial: f64,
    #[serde(default)]
    pub ramp_up_maximum: f64,
    #[serde(default)]
    pub ramp_down_maximum: f64,
    #[serde(default)]
    pub ramp_start_up_maximum: f64,
    #[serde(default)]
    pub ramp_shut_down_maximum: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageParams>,
}

impl Unit {
    pub fn new(id: &str, zone: &str, technology: &str, fuel: &str, power_capacity: f64) -> Self {
        Self {
            id: id.to_string(),
            zone: zone.to_string(),
            technology: technology.to_string(),
            fuel: fuel.to_string(),
            power_capacity,
            nunits: 1.0,
            part_load_min: 0.0,
            time_up_minimum: 0.0,
            ramp_up_rate: 0.0,
            cost_start_up: 0.0,
            cost_shut_down: 0.0,
            no_load_cost: 0.0,
            power_initial: 0.0,
            ramp_up_maximum: 0.0,
            ramp_down_maximum: 0.0,
            ramp_start_up_maximum: 0.0,
            ramp_shut_down_maximum: 0.0,
            storage: None,
        }
    }

    /// Installed capacity of the unit group (MW).
    pub fn installed_capacity(&self) -> f64 {
        self.power_capacity * self.nunits
    }

    /// Multiply every capacity-proportional parameter by `factor`.
    ///
    /// Covers the cost, ramp and storage parameters; `power_capacity` and
    /// `nunits` are set by the caller.
    pub fn scale_proportional(&mut self, factor: f64) {
        self.cost_start_up *= factor;
        self.cost_shut_down *= factor;
        self.no_load_cost *= factor;
        self.power_initial *= factor;
        self.ramp_up_maximum *= factor;
        self.ramp_down_maximum *= factor;
        self.ramp_start_up_maximum *= factor;
        self.ramp_shut_down_maximum *= factor;
        if let Some(storage) = self.storage.as_mut() {
            storage.capacity *= factor;
            storage.charging_capacity *= factor;
            storage.initial *= factor;
        }
    }

    /// Hours the unit can run at full power from a full store.
    pub fn full_power_time(&self) -> Option<f64> {
        let storage = self.storage.as_ref()?;
        if storage.capacity > 0.0 {
            Some(3600.0 * self.power_capacity / storage.capacity)
        } else {
            None
        }
    }
}

/// Inputs of one simulation run, hourly resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInputs {
    #[serde(default = "default_inputs_version")]
    pub version: u32,
    /// Timestamp of the first hour
    pub start: DateTime<Utc>,
    pub zones: Vec<String>,
    pub units: Vec<Unit>,
    /// Hourly demand per zone (MW)
    pub demand: BTreeMap<String, Vec<f64>>,
    /// Hourly availability factor per unit id
    #[serde(default)]
    pub availability_factor: BTreeMap<String, Vec<f64>>,
    /// Hourly variable cost per unit id (EUR/MWh)
    #[serde(default)]
    pub cost_variable: BTreeMap<String, Vec<f64>>,
    /// Hourly transfer capacity per interconnection line (MW)
    #[serde(default)]
    pub flow_maximum: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SimulationInputs {
    pub fn new(start: DateTime<Utc>, zones: Vec<String>) -> Self {
        Self {
            version: INPUTS_FORMAT_VERSION,
            start,
            zones,
            units: Vec::new(),
            demand: BTreeMap::new(),
            availability_factor: BTreeMap::new(),
            cost_variable: BTreeMap::new(),
            flow_maximum: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Number of simulated hours.
    pub fn hours(&self) -> usize {
        self.demand.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Total demand per hour, summed over zones.
    pub fn system_demand(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.hours()];
        for series in self.demand.values() {
            for (slot, value) in total.iter_mut().zip(series) {
                *slot += value;
            }
        }
        total
    }

    /// Maximum over time of the total demand.
    pub fn peak_load(&self) -> f64 {
        self.system_demand()
            .into_iter()
            .fold(0.0, f64::max)
    }

    /// Maximum hourly demand of one zone.
    pub fn zone_peak_load(&self, zone: &str) -> f64 {
        self.demand
            .get(zone)
            .map(|series| series.iter().copied().fold(0.0, f64::max))
            .unwrap_or(0.0)
    }

    pub fn unit(&self, id: &str) -> Option<&Unit> {
        self.units.iter().find(|unit| unit.id == id)
    }

    pub fn unit_position(&self, id: &str) -> Option<usize> {
        self.units.iter().position(|unit| unit.id == id)
    }

    /// Ids of the units matching `predicate`, in table order.
    pub fn select_units<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&Unit) -> bool,
    {
        self.units
            .iter()
            .filter(|unit| predicate(unit))
            .map(|unit| unit.id.clone())
            .collect()
    }

    /// Installed capacity of the listed units. Unknown ids count as zero.
    pub fn installed_capacity(&self, ids: &[String]) -> f64 {
        ids.iter()
            .filter_map(|id| self.unit(id))
            .map(Unit::installed_capacity)
            .sum()
    }

    /// Installed capacity grouped by fuel.
    pub fn capacity_by_fuel(&self) -> BTreeMap<String, f64> {
        let mut by_fuel = BTreeMap::new();
        for unit in &self.units {
            *by_fuel.entry(unit.fuel.clone()).or_insert(0.0) += unit.installed_capacity();
        }
        by_fuel
    }

    /// Hourly mean availability factor of each unit.
    pub fn mean_availability(&self) -> BTreeMap<String, f64> {
        self.availability_factor
            .iter()
            .filter(|(_, series)| !series.is_empty())
            .map(|(id, series)| (id.clone(), mean(series)))
            .collect()
    }

    /// Demand-weighted net transfer capacity ratio.
    ///
    /// Each line's transfer capacity is its hourly mean. A zone collects the
    /// capacity of every line whose id contains the zone name, halved since
    /// the export and import directions are both listed; the zone ratio
    /// divides that by the zone's peak load. The result weights zone ratios by
    /// peak load.
    pub fn rntc(&self) -> f64 {
        let ntc: Vec<(&str, f64)> = self
            .flow_maximum
            .iter()
            .filter(|(_, series)| !series.is_empty())
            .map(|(line, series)| (line.as_str(), mean(series)))
            .collect();
        let peaks: Vec<(&str, f64)> = self
            .zones
            .iter()
            .map(|zone| (zone.as_str(), self.zone_peak_load(zone)))
            .collect();
        let total_peak: f64 = peaks.iter().map(|(_, peak)| peak).sum();
        if total_peak <= 0.0 {
            return 0.0;
        }
        peaks
            .iter()
            .filter(|(_, peak)| *peak > 0.0)
            .map(|(zone, peak)| {
                let zone_ntc: f64 = ntc
                    .iter()
                    .filter(|(line, _)| line.contains(zone))
                    .map(|(_, value)| value)
                    .sum();
                let ratio = zone_ntc / 2.0 / peak;
                peak * ratio / total_peak
            })
            .sum()
    }

    /// Timestamp of hour `index`.
    pub fn timestamp(&self, index: usize) -> DateTime<Utc> {
        self.start + Duration::hours(index as i64)
    }

    /// Restrict every hourly series to the `[start, stop)` window.
    ///
    /// `None` bounds keep the corresponding end of the horizon.
    pub fn window(
        &self,
        start: Option<DateTime<Utc>>,
        stop: Option<DateTime<Utc>>,
    ) -> Result<SimulationInputs> {
        let hours = self.hours();
        let from = match start {
            Some(ts) => self.hour_offset(ts)?,
            None => 0,
        };
        let to = match stop {
            Some(ts) => self.hour_offset(ts)?.min(hours),
            None => hours,
        };
        if from >= to {
            return Err(CapsurrError::Validation(format!(
                "simulation window is empty (hours {from}..{to} of {hours})"
            ))
            .into());
        }
        let cut = |map: &BTreeMap<String, Vec<f64>>| -> BTreeMap<String, Vec<f64>> {
            map.iter()
                .map(|(key, series)| {
                    let end = to.min(series.len());
                    let begin = from.min(end);
                    (key.clone(), series[begin..end].to_vec())
                })
                .collect()
        };
        Ok(SimulationInputs {
            version: self.version,
            start: self.timestamp(from),
            zones: self.zones.clone(),
            units: self.units.clone(),
            demand: cut(&self.demand),
            availability_factor: cut(&self.availability_factor),
            cost_variable: cut(&self.cost_variable),
            flow_maximum: cut(&self.flow_maximum),
            metadata: self.metadata.clone(),
        })
    }

    fn hour_offset(&self, ts: DateTime<Utc>) -> Result<usize> {
        let delta = ts - self.start;
        if delta < Duration::zero() {
            return Err(anyhow!(
                "timestamp {} precedes the start of the inputs ({})",
                ts.to_rfc3339(),
                self.start.to_rfc3339()
            ));
        }
        Ok(delta.num_hours() as usize)
    }

    /// Check structural consistency: unique unit ids, known zones, and hourly
    /// series of equal length.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for unit in &self.units {
            if !seen.insert(unit.id.as_str()) {
                return Err(
                    CapsurrError::Validation(format!("duplicate unit id '{}'", unit.id)).into(),
                );
            }
            if !self.zones.contains(&unit.zone) {
                return Err(CapsurrError::Validation(format!(
                    "unit '{}' refers to unknown zone '{}'",
                    unit.id, unit.zone
                ))
                .into());
            }
            if unit.power_capacity < 0.0 || unit.nunits < 0.0 {
                return Err(CapsurrError::Validation(format!(
                    "unit '{}' has a negative capacity or unit count",
                    unit.id
                ))
                .into());
            }
        }
        let hours = self.hours();
        let series = [
            ("demand", &self.demand),
            ("availability_factor", &self.availability_factor),
            ("cost_variable", &self.cost_variable),
            ("flow_maximum", &self.flow_maximum),
        ];
        for (name, map) in series {
            for (key, values) in map {
                if values.len() != hours {
                    return Err(CapsurrError::Validation(format!(
                        "{name} series '{key}' has {} hours, expected {hours}",
                        values.len()
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_zone_inputs() -> SimulationInputs {
        let start = "2022-01-01T00:00:00Z".parse().unwrap();
        let mut inputs = SimulationInputs::new(start, vec!["BE".into(), "NL".into()]);
        inputs.demand.insert("BE".into(), vec![50.0, 100.0, 80.0]);
        inputs.demand.insert("NL".into(), vec![100.0, 300.0, 200.0]);
        inputs
            .flow_maximum
            .insert("BE -> NL".into(), vec![40.0, 40.0, 40.0]);
        inputs
            .flow_maximum
            .insert("NL -> BE".into(), vec![40.0, 40.0, 40.0]);
        inputs
    }

    #[test]
    fn peak_load_is_max_of_system_demand() {
        let inputs = two_zone_inputs();
        assert_eq!(inputs.system_demand(), vec![150.0, 400.0, 280.0]);
        assert_eq!(inputs.peak_load(), 400.0);
        assert_eq!(inputs.zone_peak_load("NL"), 300.0);
    }

    #[test]
    fn rntc_weights_zones_by_peak_load() {
        let inputs = two_zone_inputs();
        // Each zone sees 80 MW of line capacity, halved: 40 MW.
        // BE: 40/100 = 0.4, NL: 40/300; weights 100/400 and 300/400.
        let expected = 100.0 * 0.4 / 400.0 + 300.0 * (40.0 / 300.0) / 400.0;
        assert!((inputs.rntc() - expected).abs() < 1e-12);
    }

    #[test]
    fn rntc_without_lines_is_zero() {
        let mut inputs = two_zone_inputs();
        inputs.flow_maximum.clear();
        assert_eq!(inputs.rntc(), 0.0);
    }

    #[test]
    fn window_cuts_every_series() {
        let inputs = two_zone_inputs();
        let start = "2022-01-01T01:00:00Z".parse().unwrap();
        let cut = inputs.window(Some(start), None).unwrap();
        assert_eq!(cut.hours(), 2);
        assert_eq!(cut.start, start);
        assert_eq!(cut.demand["BE"], vec![100.0, 80.0]);
        assert_eq!(cut.flow_maximum["NL -> BE"].len(), 2);
    }

    #[test]
    fn window_rejects_empty_range() {
        let inputs = two_zone_inputs();
        let stop = "2022-01-01T00:00:00Z".parse().unwrap();
        assert!(inputs.window(None, Some(stop)).is_err());
    }

    #[test]
    fn scale_proportional_touches_storage() {
        let mut unit = Unit::new("B", "BE", "BATS", "OTH", 10.0);
        unit.storage = Some(StorageParams {
            capacity: 40.0,
            charging_capacity: 10.0,
            initial: 20.0,
        });
        unit.cost_start_up = 3.0;
        unit.scale_proportional(2.0);
        let storage = unit.storage.as_ref().unwrap();
        assert_eq!(storage.capacity, 80.0);
        assert_eq!(storage.charging_capacity, 20.0);
        assert_eq!(storage.initial, 40.0);
        assert_eq!(unit.cost_start_up, 6.0);
        assert_eq!(unit.power_capacity, 10.0);
    }

    #[test]
    fn validate_flags_duplicate_units() {
        let mut inputs = two_zone_inputs();
        inputs.units.push(Unit::new("U", "BE", "COMC", "GAS", 10.0));
        inputs.units.push(Unit::new("U", "BE", "COMC", "GAS", 10.0));
        assert!(inputs.validate().is_err());
    }
}
