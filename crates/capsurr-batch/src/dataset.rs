use capsurr_core::SamplePoint;
use serde::{Deserialize, Serialize};

use crate::metrics::BundleMetrics;

/// One row of the collected dataset: the sample coordinates, the outcome
/// metrics, and the simulator's error flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
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
    #[serde(rename = "Cost_[E/MWh]")]
    pub cost: f64,
    #[serde(rename = "Congestion_[h]")]
    pub congestion: f64,
    #[serde(rename = "PeakLoad_[MW]")]
    pub peak_load: f64,
    #[serde(rename = "MaxCurtailment_[MW]")]
    pub max_curtailment: f64,
    #[serde(rename = "MaxLoadShedding_[MW]")]
    pub max_load_shedding: f64,
    #[serde(rename = "Demand_[TWh]")]
    pub demand: f64,
    #[serde(rename = "NetImports_[TWh]")]
    pub net_imports: f64,
    #[serde(rename = "Curtailment_[TWh]")]
    pub curtailment: f64,
    #[serde(rename = "Shedding_[TWh]")]
    pub shedding: f64,
    #[serde(rename = "LostLoad_[TWh]")]
    pub lost_load: f64,
    #[serde(rename = "CF_gas")]
    pub cf_gas: f64,
    #[serde(rename = "CF_nuc")]
    pub cf_nuc: f64,
    #[serde(rename = "CF_wat")]
    pub cf_wat: f64,
    #[serde(rename = "CF_win")]
    pub cf_win: f64,
    #[serde(rename = "CF_sun")]
    pub cf_sun: f64,
    #[serde(rename = "GAMS_error")]
    pub error_flag: i32,
}

impl DatasetRow {
    pub fn new(sample: &SamplePoint, metrics: &BundleMetrics, error_flag: i32) -> Self {
        Self {
            index: sample.index,
            capacity_ratio: sample.capacity_ratio,
            share_flex: sample.share_flex,
            share_storage: sample.share_storage,
            share_wind: sample.share_wind,
            share_pv: sample.share_pv,
            rntc: sample.rntc,
            cost: metrics.cost,
            congestion: metrics.congestion,
            peak_load: metrics.peak_load,
            max_curtailment: metrics.max_curtailment,
            max_load_shedding: metrics.max_load_shedding,
            demand: metrics.demand,
            net_imports: metrics.net_imports,
            curtailment: metrics.curtailment,
            shedding: metrics.shedding,
            lost_load: metrics.lost_load,
            cf_gas: metrics.cf_gas,
            cf_nuc: metrics.cf_nuc,
            cf_wat: metrics.cf_wat,
            cf_win: metrics.cf_win,
            cf_sun: metrics.cf_sun,
            error_flag,
        }
    }

    pub fn sample(&self) -> SamplePoint {
        SamplePoint {
            index: self.index,
            capacity_ratio: self.capacity_ratio,
            share_flex: self.share_flex,
            share_storage: self.share_storage,
            share_wind: self.share_wind,
            share_pv: self.share_pv,
            rntc: self.rntc,
        }
    }
}
