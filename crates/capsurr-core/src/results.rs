//! Simulator results written into a bundle after a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lost-load categories summed into the dataset's lost-load column.
pub const LOST_LOAD_CATEGORIES: &[&str] = &[
    "LostLoad_MaxPower",
    "LostLoad_MinPower",
    "LostLoad_2D",
    "LostLoad_2U",
    "LostLoad_3U",
    "LostLoad_RampDown",
    "LostLoad_RampUp",
];

/// Hourly results of one simulation run.
///
/// Every map is optional in the file; a missing series reads as empty and
/// contributes zero to the derived metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    /// Hourly output per unit id (MW)
    #[serde(default)]
    pub output_power: BTreeMap<String, Vec<f64>>,
    /// Hourly flow per line id (MW, signed)
    #[serde(default)]
    pub flows: BTreeMap<String, Vec<f64>>,
    /// Hourly curtailment per zone (MW)
    #[serde(default)]
    pub curtailment: BTreeMap<String, Vec<f64>>,
    /// Hourly shed load per zone (MW)
    #[serde(default)]
    pub shed_load: BTreeMap<String, Vec<f64>>,
    /// Hourly lost load per category, then per zone (MW)
    #[serde(default)]
    pub lost_load: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    /// Hourly total system cost (EUR)
    #[serde(default)]
    pub total_system_cost: Vec<f64>,
    /// Hourly net imports per zone (MW)
    #[serde(default)]
    pub net_imports: BTreeMap<String, Vec<f64>>,
    /// Solver status reported by the simulator, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
}

impl SimulationResults {
    /// Total energy (MWh) of one lost-load category; zero if absent.
    pub fn lost_load_energy(&self, category: &str) -> f64 {
        self.lost_load
            .get(category)
            .map(|zones| zones.values().map(|series| series.iter().sum::<f64>()).sum())
            .unwrap_or(0.0)
    }

    /// Lost-load energy (MWh) summed over [`LOST_LOAD_CATEGORIES`].
    pub fn lost_load_total(&self) -> f64 {
        LOST_LOAD_CATEGORIES
            .iter()
            .map(|category| self.lost_load_energy(category))
            .sum()
    }

    /// Categories from [`LOST_LOAD_CATEGORIES`] absent from the results.
    pub fn missing_lost_load_categories(&self) -> Vec<&'static str> {
        LOST_LOAD_CATEGORIES
            .iter()
            .copied()
            .filter(|category| !self.lost_load.contains_key(*category))
            .collect()
    }
}

/// Element-wise sum of a set of hourly series.
pub fn hourly_sum(map: &BTreeMap<String, Vec<f64>>) -> Vec<f64> {
    let hours = map.values().map(Vec::len).max().unwrap_or(0);
    let mut total = vec![0.0; hours];
    for series in map.values() {
        for (slot, value) in total.iter_mut().zip(series) {
            *slot += value;
        }
    }
    total
}

/// Sum of every value of every series.
pub fn total_energy(map: &BTreeMap<String, Vec<f64>>) -> f64 {
    map.values().map(|series| series.iter().sum::<f64>()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_load_sums_present_categories() {
        let mut results = SimulationResults::default();
        let mut zones = BTreeMap::new();
        zones.insert("Z1".to_string(), vec![1.0, 2.0]);
        zones.insert("Z2".to_string(), vec![3.0]);
        results.lost_load.insert("LostLoad_2U".into(), zones);
        let mut ramp = BTreeMap::new();
        ramp.insert("Z1".to_string(), vec![4.0]);
        results.lost_load.insert("LostLoad_RampUp".into(), ramp);

        assert_eq!(results.lost_load_total(), 10.0);
        assert_eq!(results.missing_lost_load_categories().len(), 5);
    }

    #[test]
    fn missing_fields_deserialize_to_empty() {
        let results: SimulationResults = serde_json::from_str("{}").unwrap();
        assert_eq!(results, SimulationResults::default());
        assert_eq!(results.lost_load_total(), 0.0);
    }

    #[test]
    fn hourly_sum_aligns_series() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), vec![1.0, 2.0, 3.0]);
        map.insert("b".to_string(), vec![10.0, 20.0]);
        assert_eq!(hourly_sum(&map), vec![11.0, 22.0, 3.0]);
        assert_eq!(total_energy(&map), 36.0);
    }
}
