//! Gaussian-process regression and expected improvement, used by the
//! Bayesian tuner to rank candidate hyperparameters.

use anyhow::Result;
use capsurr_core::CapsurrError;

const JITTER_ATTEMPTS: usize = 6;

/// Zero-mean GP with a squared-exponential kernel on standardized targets.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    points: Vec<Vec<f64>>,
    length_scale: f64,
    /// Lower-triangular Cholesky factor of the kernel matrix
    chol: Vec<Vec<f64>>,
    /// `K^-1 y` for the standardized targets
    alpha: Vec<f64>,
    y_mean: f64,
    y_std: f64,
}

fn kernel(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-0.5 * sq / (length_scale * length_scale)).exp()
}

/// Cholesky factorization of a symmetric positive-definite matrix.
fn cholesky(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let dot: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = matrix[i][i] - dot;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - dot) / l[j][j];
            }
        }
    }
    Some(l)
}

/// Solve `L z = b` for lower-triangular `L`.
fn forward_substitute(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let mut z = vec![0.0; b.len()];
    for i in 0..b.len() {
        let dot: f64 = (0..i).map(|k| l[i][k] * z[k]).sum();
        z[i] = (b[i] - dot) / l[i][i];
    }
    z
}

/// Solve `L^T x = z`.
fn back_substitute(l: &[Vec<f64>], z: &[f64]) -> Vec<f64> {
    let n = z.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let dot: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (z[i] - dot) / l[i][i];
    }
    x
}

impl GaussianProcess {
    /// Fit on `points` with observed `values`. Diagonal jitter grows from
    /// `noise` until the kernel matrix factorizes.
    pub fn fit(
        points: &[Vec<f64>],
        values: &[f64],
        length_scale: f64,
        noise: f64,
    ) -> Result<Self> {
        if points.is_empty() || points.len() != values.len() {
            return Err(CapsurrError::Training(format!(
                "gaussian process needs matching points and values, got {} and {}",
                points.len(),
                values.len()
            ))
            .into());
        }
        let n = values.len() as f64;
        let y_mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n;
        let y_std = if var > 0.0 { var.sqrt() } else { 1.0 };
        let y: Vec<f64> = values.iter().map(|v| (v - y_mean) / y_std).collect();

        let mut jitter = noise.max(1e-10);
        for _ in 0..JITTER_ATTEMPTS {
            let matrix: Vec<Vec<f64>> = points
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    points
                        .iter()
                        .enumerate()
                        .map(|(j, b)| {
                            let diag = if i == j { jitter } else { 0.0 };
                            kernel(a, b, length_scale) + diag
                        })
                        .collect()
                })
                .collect();
            if let Some(chol) = cholesky(&matrix) {
                let alpha = back_substitute(&chol, &forward_substitute(&chol, &y));
                return Ok(Self {
                    points: points.to_vec(),
                    length_scale,
                    chol,
                    alpha,
                    y_mean,
                    y_std,
                });
            }
            jitter *= 10.0;
        }
        Err(CapsurrError::Training("kernel matrix is not positive definite".into()).into())
    }

    /// Posterior mean and standard deviation at `x`, in the units of the
    /// observed values.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k: Vec<f64> = self
            .points
            .iter()
            .map(|p| kernel(p, x, self.length_scale))
            .collect();
        let mean: f64 = k.iter().zip(&self.alpha).map(|(a, b)| a * b).sum();
        let v = forward_substitute(&self.chol, &k);
        let var = (1.0 - v.iter().map(|vi| vi * vi).sum::<f64>()).max(1e-12);
        (self.y_mean + mean * self.y_std, var.sqrt() * self.y_std)
    }
}

/// Error function, Abramowitz and Stegun 7.1.26 (absolute error < 1.5e-7).
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Expected improvement over `best` when minimizing.
pub fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    let improvement = best - mean - xi;
    if std <= 0.0 {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    (improvement * normal_cdf(z) + std * normal_pdf(z)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_observations() {
        let points = vec![vec![0.0], vec![0.5], vec![1.0]];
        let values = vec![1.0, -2.0, 3.0];
        let gp = GaussianProcess::fit(&points, &values, 0.3, 1e-8).unwrap();
        for (p, v) in points.iter().zip(&values) {
            let (mean, std) = gp.predict(p);
            assert!((mean - v).abs() < 1e-3, "{mean} vs {v}");
            assert!(std < 1e-2);
        }
        let (_, far) = gp.predict(&[5.0]);
        assert!(far > 1.0);
    }

    #[test]
    fn duplicate_points_are_regularized() {
        let points = vec![vec![0.2, 0.2], vec![0.2, 0.2], vec![0.8, 0.1]];
        let gp = GaussianProcess::fit(&points, &[1.0, 1.0, 0.0], 0.5, 0.0).unwrap();
        let (mean, _) = gp.predict(&[0.2, 0.2]);
        assert!((mean - 1.0).abs() < 1e-2);
    }

    #[test]
    fn erf_matches_reference_values() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-0.5) + 0.520_499_88).abs() < 1e-6);
    }

    #[test]
    fn expected_improvement_prefers_low_mean_and_high_uncertainty() {
        let base = expected_improvement(1.0, 0.1, 1.0, 0.0);
        assert!(expected_improvement(0.5, 0.1, 1.0, 0.0) > base);
        assert!(expected_improvement(1.0, 0.5, 1.0, 0.0) > base);
        assert_eq!(expected_improvement(2.0, 0.0, 1.0, 0.0), 0.0);
        assert!(expected_improvement(2.0, 0.1, 1.0, 0.0) >= 0.0);
    }
}
