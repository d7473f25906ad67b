//! Per-column normalization and its inverse.

use anyhow::Result;
use capsurr_core::CapsurrError;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Lower bound applied to the variance before taking the square root.
pub const NORMALIZATION_EPSILON: f64 = 1e-7;

/// Feature-wise standardization fitted on the training rows:
/// `(x - mean) / sqrt(max(variance, eps))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub mean: Array1<f64>,
    pub variance: Array1<f64>,
}

impl Normalizer {
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        let mean = data.mean_axis(Axis(0)).ok_or_else(|| {
            CapsurrError::Training("cannot fit a normalizer on zero rows".into())
        })?;
        let variance = data.var_axis(Axis(0), 0.0);
        Ok(Self { mean, variance })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    fn std(&self) -> Array1<f64> {
        self.variance
            .mapv(|v| v.max(NORMALIZATION_EPSILON).sqrt())
    }

    fn check_width(&self, data: &Array2<f64>) -> Result<()> {
        if data.ncols() != self.dim() {
            return Err(CapsurrError::Validation(format!(
                "expected {} columns, got {}",
                self.dim(),
                data.ncols()
            ))
            .into());
        }
        Ok(())
    }

    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(data)?;
        Ok((data - &self.mean) / &self.std())
    }

    /// Inverse layer built from the forward transform at 0 and 1:
    /// `scale = 1 / (n1 - n0)`, `offset = -n0 * scale`.
    pub fn denormalizer(&self) -> Result<Denormalizer> {
        let n0 = self.transform(&Array2::zeros((1, self.dim())))?;
        let n1 = self.transform(&Array2::ones((1, self.dim())))?;
        let n0 = n0.row(0).to_owned();
        let scale = (&n1.row(0) - &n0).mapv(|d| 1.0 / d);
        let offset = -(&n0 * &scale);
        Ok(Denormalizer { scale, offset })
    }
}

/// Affine map from normalized outputs back to physical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Denormalizer {
    pub scale: Array1<f64>,
    pub offset: Array1<f64>,
}

impl Denormalizer {
    pub fn dim(&self) -> usize {
        self.scale.len()
    }

    pub fn apply(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.dim() {
            return Err(CapsurrError::Validation(format!(
                "expected {} output columns, got {}",
                self.dim(),
                data.ncols()
            ))
            .into());
        }
        Ok(data * &self.scale + &self.offset)
    }
}
