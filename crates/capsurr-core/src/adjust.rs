//! Capacity adjustments applied to simulator inputs.
//!
//! These are the rescaling operations the sample materializer chains for each
//! design point: set the capacity of a technology/fuel group, shift capacity
//! between flexible and slow thermal units, and rescale the interconnection
//! capacity.
//!
//! Whenever a unit's `power_capacity` changes by a factor `f`, every
//! capacity-proportional parameter of that unit (start-up, shut-down and
//! no-load costs, initial power, ramp maxima, storage capacities) is
//! multiplied by the same `f` via [`Unit::scale_proportional`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CapsurrError;
use crate::model::{SimulationInputs, Unit};

/// Scaling factors above this are treated as a mistake and ignored.
pub const MAX_SCALING: f64 = 1e10;

/// Technologies whose selection may be restricted by full-power time.
pub const STORAGE_TECHNOLOGIES: &[&str] = &["BATS", "BEVS", "CAES", "P2GS", "THMS"];

/// Desired capacity of a group of units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapacityTarget {
    /// Multiply the current installed capacity
    Scaling(f64),
    /// Absolute installed capacity (MW)
    Value(f64),
}

/// Technology/fuel pair identifying a group of units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechFuel {
    pub technology: String,
    pub fuel: String,
}

impl TechFuel {
    pub fn new(technology: &str, fuel: &str) -> Self {
        Self {
            technology: technology.to_string(),
            fuel: fuel.to_string(),
        }
    }

    pub fn matches(&self, unit: &Unit) -> bool {
        unit.technology == self.technology && unit.fuel == self.fuel
    }
}

impl std::fmt::Display for TechFuel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.technology, self.fuel)
    }
}

/// Options for [`adjust_capacity`].
#[derive(Debug, Clone, Default)]
pub struct AdjustOptions {
    /// Lump every selected unit group into a single unit
    pub singleunit: bool,
    /// For storage technologies, only select units whose full-power time
    /// lies in `[lo, hi)`. `None` accepts any storage unit.
    pub full_power_time: Option<(f64, f64)>,
}

/// Rescale the installed capacity of the listed units.
///
/// **Algorithm:**
/// 1. `total = Σ power_capacity * nunits` over the listed units.
/// 2. `required = total * factor` or the absolute target value.
/// 3. New unit counts: 1 in singleunit mode, otherwise the old count scaled
///    by `required / total` and rounded; never below 1.
/// 4. `cap_new = power_capacity * required / Σ(power_capacity * nunits_new)`.
/// 5. Every proportional parameter is multiplied by `cap_new / cap_old`.
///
/// An empty unit list or a scaling factor above [`MAX_SCALING`] leaves the
/// inputs untouched (with a warning).
pub fn adjust_unit_capacity(
    inputs: &mut SimulationInputs,
    unit_ids: &[String],
    target: CapacityTarget,
    singleunit: bool,
) -> Result<()> {
    if unit_ids.is_empty() {
        warn!("adjust_unit_capacity: list of units to be scaled is empty");
        return Ok(());
    }
    if let CapacityTarget::Scaling(factor) = target {
        if factor > MAX_SCALING {
            warn!("adjust_unit_capacity: scaling factor is too high ({factor})");
            return Ok(());
        }
    }

    let positions = unit_ids
        .iter()
        .map(|id| {
            inputs
                .unit_position(id)
                .ok_or_else(|| anyhow!("unit '{}' not found in simulation inputs", id))
        })
        .collect::<Result<Vec<_>>>()?;

    let total: f64 = positions
        .iter()
        .map(|&pos| inputs.units[pos].installed_capacity())
        .sum();
    let required = match target {
        CapacityTarget::Scaling(factor) => total * factor,
        CapacityTarget::Value(value) => value,
    };
    if !required.is_finite() || required < 0.0 {
        return Err(CapsurrError::Validation(format!(
            "required capacity {required} for units {unit_ids:?} is not a finite non-negative value"
        ))
        .into());
    }

    let nunits_new: Vec<f64> = positions
        .iter()
        .map(|&pos| {
            let count = if singleunit {
                1.0
            } else {
                (inputs.units[pos].nunits * required / total).round()
            };
            // NaN (zero total) also lands on 1
            count.max(1.0)
        })
        .collect();
    let denominator: f64 = positions
        .iter()
        .zip(&nunits_new)
        .map(|(&pos, count)| inputs.units[pos].power_capacity * count)
        .sum();
    if denominator <= 0.0 {
        return Err(CapsurrError::Validation(format!(
            "cannot rescale units {unit_ids:?}: installed capacity is zero"
        ))
        .into());
    }

    for (&pos, &count) in positions.iter().zip(&nunits_new) {
        let unit = &mut inputs.units[pos];
        let old_capacity = unit.power_capacity;
        let new_capacity = old_capacity * required / denominator;
        let factor = if old_capacity > 0.0 {
            new_capacity / old_capacity
        } else {
            1.0
        };
        debug!(
            unit = %unit.id,
            "PowerCapacity: {} --> {}, Nunits: {} --> {}",
            old_capacity,
            new_capacity,
            unit.nunits,
            count
        );
        unit.power_capacity = new_capacity;
        unit.nunits = count;
        unit.scale_proportional(factor);
    }
    Ok(())
}

/// Rescale every unit of a technology/fuel pair.
///
/// For storage technologies, units without a positive storage capacity are
/// never selected, and `options.full_power_time` narrows the selection
/// further. Returns the ids of the adjusted units.
pub fn adjust_capacity(
    inputs: &mut SimulationInputs,
    tech_fuel: &TechFuel,
    target: CapacityTarget,
    options: &AdjustOptions,
) -> Result<Vec<String>> {
    let is_storage = STORAGE_TECHNOLOGIES.contains(&tech_fuel.technology.as_str());
    let (lo, hi) = options
        .full_power_time
        .unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
    if lo > hi {
        return Err(CapsurrError::Validation(format!(
            "invalid full-power time range ({lo}, {hi})"
        ))
        .into());
    }
    let selected = inputs.select_units(|unit| {
        if !tech_fuel.matches(unit) {
            return false;
        }
        if !is_storage {
            return true;
        }
        match unit.full_power_time() {
            Some(time) => lo <= time && time < hi,
            None => false,
        }
    });
    info!(
        "adjusting {} unit(s) of {} to {:?}",
        selected.len(),
        tech_fuel,
        target
    );
    adjust_unit_capacity(inputs, &selected, target, options.singleunit)?;
    Ok(selected)
}

/// Redistribute capacity between flexible and slow units.
///
/// The combined capacity is conserved: the flexible set receives
/// `share_flex * total` and the slow set the remainder.
pub fn adjust_flexibility(
    inputs: &mut SimulationInputs,
    flex_units: &[String],
    slow_units: &[String],
    share_flex: f64,
    singleunit: bool,
) -> Result<()> {
    if !(0.0..=1.0).contains(&share_flex) {
        return Err(CapsurrError::Validation(format!(
            "flexible share {share_flex} must lie in [0, 1]"
        ))
        .into());
    }
    let total = inputs.installed_capacity(flex_units) + inputs.installed_capacity(slow_units);
    info!(
        "adjusting flexibility: {} flexible / {} slow unit(s), share {:.4} of {:.2} MW",
        flex_units.len(),
        slow_units.len(),
        share_flex,
        total
    );
    adjust_unit_capacity(
        inputs,
        flex_units,
        CapacityTarget::Value(share_flex * total),
        singleunit,
    )?;
    adjust_unit_capacity(
        inputs,
        slow_units,
        CapacityTarget::Value((1.0 - share_flex) * total),
        singleunit,
    )?;
    Ok(())
}

/// Rescale the interconnection capacities.
///
/// With a value target every line's hourly transfer capacity is multiplied
/// by the same factor so that [`SimulationInputs::rntc`] equals the value.
/// Inputs without interconnection capacity are left untouched. Returns the
/// factor applied.
pub fn adjust_ntc(inputs: &mut SimulationInputs, target: CapacityTarget) -> Result<f64> {
    let current = inputs.rntc();
    let factor = match target {
        CapacityTarget::Scaling(factor) => factor,
        CapacityTarget::Value(value) => {
            if value < 0.0 || !value.is_finite() {
                return Err(CapsurrError::Validation(format!(
                    "target rNTC {value} must be a finite non-negative value"
                ))
                .into());
            }
            if current <= 0.0 {
                warn!("adjust_ntc: no interconnection capacity to rescale");
                return Ok(1.0);
            }
            value / current
        }
    };
    if factor > MAX_SCALING {
        warn!("adjust_ntc: scaling factor is too high ({factor})");
        return Ok(1.0);
    }
    info!("adjusting NTC: rNTC {:.4} scaled by {:.4}", current, factor);
    for series in inputs.flow_maximum.values_mut() {
        for value in series.iter_mut() {
            *value *= factor;
        }
    }
    Ok(factor)
}
