//! Sample points of the study design.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Column names of the six study parameters, in design order.
pub const SAMPLE_COLUMNS: [&str; 6] = [
    "CapacityRatio",
    "ShareFlex",
    "ShareStorage",
    "ShareWind",
    "SharePV",
    "rNTC",
];

/// Prefix shared by all sample bundle directory names.
pub const BUNDLE_PREFIX: &str = "sim-";

/// One design point. `index` is its row in the generating design.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    #[serde(rename = "Index")]
    pub index: usize,
    #[serde(rename = "CapacityRatio")]
    pub capacity_ratio: f64,
    #[serde(rename = "ShareFlex")]
    pub share_flex: f64,
    #[serde(rename = "ShareStorage")]
    pub share_storage: f64,
    #[serde(rename = "ShareWind")]
    pub share_wind: f64,
    #[serde(rename = "SharePV")]
    pub share_pv: f64,
    #[serde(rename = "rNTC")]
    pub rntc: f64,
}

impl SamplePoint {
    /// Build a point from values in [`SAMPLE_COLUMNS`] order.
    pub fn from_values(index: usize, values: &[f64]) -> Result<Self> {
        if values.len() != SAMPLE_COLUMNS.len() {
            bail!(
                "sample {} has {} values, expected {}",
                index,
                values.len(),
                SAMPLE_COLUMNS.len()
            );
        }
        Ok(Self {
            index,
            capacity_ratio: values[0],
            share_flex: values[1],
            share_storage: values[2],
            share_wind: values[3],
            share_pv: values[4],
            rntc: values[5],
        })
    }

    pub fn values(&self) -> [f64; 6] {
        [
            self.capacity_ratio,
            self.share_flex,
            self.share_storage,
            self.share_wind,
            self.share_pv,
            self.rntc,
        ]
    }

    /// Directory name of the bundle built from this point:
    /// `sim-<index>_<v1>-<v2>-...` with two decimals per value.
    ///
    /// The name is a label only; the exact coordinates live in the bundle's
    /// coordinate file.
    pub fn bundle_name(&self) -> String {
        let values: Vec<String> = self.values().iter().map(|v| format!("{v:.2}")).collect();
        format!("{}{}_{}", BUNDLE_PREFIX, self.index, values.join("-"))
    }
}

/// Parse the sample index out of a bundle directory name (`sim-<i>_...`).
pub fn index_from_bundle_name(name: &str) -> Option<usize> {
    let rest = name.strip_prefix(BUNDLE_PREFIX)?;
    let (index, _) = rest.split_once('_')?;
    index.parse().ok()
}
