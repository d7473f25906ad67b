//! Latin-hypercube sampling of the study parameters.
//!
//! The unit-hypercube design follows the usual LHS construction: the `[0, 1)`
//! interval of every dimension is cut into `n` equal strata, each stratum
//! contributes exactly one value, and the values of each dimension are
//! randomly permuted. The optimising criteria draw several candidate designs
//! and keep the best one.

use anyhow::Result;
use capsurr_core::config::{DimensionRange, SamplingConfig};
use capsurr_core::{CapsurrError, LhsCriterion, SamplePoint};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    pub criterion: LhsCriterion,
    /// Candidate designs evaluated by the optimising criteria
    pub iterations: usize,
    pub seed: Option<u64>,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            criterion: LhsCriterion::Maximin,
            iterations: 5,
            seed: None,
        }
    }
}

impl From<&SamplingConfig> for SamplerOptions {
    fn from(config: &SamplingConfig) -> Self {
        Self {
            criterion: config.criterion,
            iterations: config.iterations,
            seed: config.seed,
        }
    }
}

/// Draw an `samples x dims` design in the unit hypercube.
pub fn lhs_unit<R: Rng>(
    dims: usize,
    samples: usize,
    criterion: LhsCriterion,
    iterations: usize,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>> {
    if dims == 0 {
        return Err(CapsurrError::Validation("sampling needs at least one dimension".into()).into());
    }
    if samples == 0 {
        return Err(CapsurrError::Validation("sample count must be positive".into()).into());
    }
    let iterations = iterations.max(1);
    let design = match criterion {
        LhsCriterion::Random => classic(dims, samples, rng),
        LhsCriterion::Center => centered(dims, samples, rng),
        LhsCriterion::Maximin => best_of(iterations, rng, |rng| classic(dims, samples, rng), min_distance),
        LhsCriterion::CenterMaximin => {
            best_of(iterations, rng, |rng| centered(dims, samples, rng), min_distance)
        }
        LhsCriterion::Correlation => best_of(
            iterations,
            rng,
            |rng| classic(dims, samples, rng),
            |design| -max_abs_correlation(design),
        ),
    };
    Ok(design)
}

/// Draw a design scaled to `ranges`: `value = raw * (max - min) + min`.
pub fn draw_samples(
    ranges: &[DimensionRange],
    samples: usize,
    options: &SamplerOptions,
) -> Result<Vec<Vec<f64>>> {
    for range in ranges {
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return Err(CapsurrError::Validation(format!(
                "range '{}' is invalid: min {} max {}",
                range.name, range.min, range.max
            ))
            .into());
        }
    }
    let mut rng = options
        .seed
        .map(StdRng::seed_from_u64)
        .unwrap_or_else(StdRng::from_entropy);
    let unit = lhs_unit(
        ranges.len(),
        samples,
        options.criterion,
        options.iterations,
        &mut rng,
    )?;
    Ok(unit
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(ranges)
                .map(|(raw, range)| raw * (range.max - range.min) + range.min)
                .collect()
        })
        .collect())
}

/// Draw the study design as indexed sample points.
pub fn draw_sample_points(config: &SamplingConfig) -> Result<Vec<SamplePoint>> {
    info!(
        "drawing {} samples over {} dimensions ({} criterion)",
        config.n_samples,
        config.ranges.len(),
        config.criterion
    );
    let rows = draw_samples(
        &config.ranges,
        config.n_samples,
        &SamplerOptions::from(config),
    )?;
    rows.iter()
        .enumerate()
        .map(|(index, row)| SamplePoint::from_values(index, row))
        .collect()
}

fn strata(samples: usize) -> Vec<(f64, f64)> {
    let n = samples as f64;
    (0..samples)
        .map(|i| (i as f64 / n, (i + 1) as f64 / n))
        .collect()
}

fn classic<R: Rng>(dims: usize, samples: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let n = samples as f64;
    let mut design = vec![vec![0.0; dims]; samples];
    for dim in 0..dims {
        let mut column: Vec<f64> = (0..samples)
            .map(|i| (i as f64 + rng.gen::<f64>()) / n)
            .collect();
        column.shuffle(rng);
        for (row, value) in design.iter_mut().zip(column) {
            row[dim] = value;
        }
    }
    design
}

fn centered<R: Rng>(dims: usize, samples: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let centres: Vec<f64> = strata(samples)
        .iter()
        .map(|(lo, hi)| (lo + hi) / 2.0)
        .collect();
    let mut design = vec![vec![0.0; dims]; samples];
    for dim in 0..dims {
        let mut column = centres.clone();
        column.shuffle(rng);
        for (row, value) in design.iter_mut().zip(column) {
            row[dim] = value;
        }
    }
    design
}

/// Keep the candidate with the highest score.
fn best_of<R, G, S>(iterations: usize, rng: &mut R, mut generate: G, score: S) -> Vec<Vec<f64>>
where
    R: Rng,
    G: FnMut(&mut R) -> Vec<Vec<f64>>,
    S: Fn(&[Vec<f64>]) -> f64,
{
    let mut best = generate(rng);
    let mut best_score = score(&best);
    for iteration in 1..iterations {
        let candidate = generate(rng);
        let candidate_score = score(&candidate);
        if candidate_score > best_score {
            debug!(iteration, score = candidate_score, "better design");
            best = candidate;
            best_score = candidate_score;
        }
    }
    best
}

/// Smallest Euclidean distance between two rows; infinite for one row.
pub fn min_distance(design: &[Vec<f64>]) -> f64 {
    let mut best = f64::INFINITY;
    for (i, a) in design.iter().enumerate() {
        for b in &design[i + 1..] {
            let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
            best = best.min(d2.sqrt());
        }
    }
    best
}

/// Largest absolute Pearson correlation between two distinct columns.
pub fn max_abs_correlation(design: &[Vec<f64>]) -> f64 {
    let dims = design.first().map(Vec::len).unwrap_or(0);
    let n = design.len() as f64;
    if dims < 2 || design.len() < 2 {
        return 0.0;
    }
    let columns: Vec<Vec<f64>> = (0..dims)
        .map(|dim| design.iter().map(|row| row[dim]).collect())
        .collect();
    let stats: Vec<(f64, f64)> = columns
        .iter()
        .map(|col| {
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (mean, var.sqrt())
        })
        .collect();
    let mut worst: f64 = 0.0;
    for i in 0..dims {
        for j in i + 1..dims {
            let (mi, si) = stats[i];
            let (mj, sj) = stats[j];
            if si == 0.0 || sj == 0.0 {
                continue;
            }
            let cov: f64 = columns[i]
                .iter()
                .zip(&columns[j])
                .map(|(a, b)| (a - mi) * (b - mj))
                .sum();
            worst = worst.max((cov / (si * sj)).abs());
        }
    }
    worst
}
