//! Persisted surrogate: normalizer, network and denormalizer bundled with
//! the column names and training metrics.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use capsurr_core::config::TunerStrategy;
use capsurr_core::CapsurrError;
use capsurr_io::NumericTable;
use chrono::{DateTime, Utc};
use ndarray::{concatenate, Axis};
use serde::{Deserialize, Serialize};

use crate::data::rows_to_array;
use crate::network::Mlp;
use crate::normalize::{Denormalizer, Normalizer};
use crate::search::Hyperparameters;

pub const MODEL_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub tuner: TunerStrategy,
    pub trials: usize,
    /// Validation MSE of the winning trial
    pub best_trial_score: f64,
    pub best_epoch: usize,
    pub epochs_run: usize,
    pub train_rows: usize,
    pub val_rows: usize,
    pub test_rows: usize,
    /// Test MSE on normalized outputs
    pub test_mse_normalized: f64,
    /// Test MSE in physical units, over all outputs
    pub test_mse: f64,
    pub test_mse_per_output: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SurrogateModel {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub features: Vec<String>,
    pub outputs: Vec<String>,
    pub normalizer: Normalizer,
    pub network: Mlp,
    pub denormalizer: Denormalizer,
    pub hyperparameters: Hyperparameters,
    pub metrics: TrainingMetrics,
}

impl SurrogateModel {
    /// Check that the stored pieces fit together.
    pub fn validate(&self) -> Result<()> {
        let shapes = [
            ("normalizer", self.normalizer.dim(), self.features.len()),
            ("network input", self.network.input_dim(), self.features.len()),
            ("network output", self.network.output_dim(), self.outputs.len()),
            ("denormalizer", self.denormalizer.dim(), self.outputs.len()),
        ];
        for (part, found, expected) in shapes {
            if found != expected {
                return Err(CapsurrError::Validation(format!(
                    "{part} has width {found}, expected {expected}"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Predict physical outputs from physical inputs, one row per sample.
    pub fn predict(&self, x: &ndarray::Array2<f64>) -> Result<ndarray::Array2<f64>> {
        let normalized = self.normalizer.transform(x)?;
        let y = self.network.predict(&normalized)?;
        self.denormalizer.apply(&y)
    }

    /// Predict for every row of `table`, which must carry the feature
    /// columns. The result holds the features followed by the outputs.
    pub fn predict_table(&self, table: &NumericTable) -> Result<NumericTable> {
        let x = rows_to_array(&table.select(&self.features)?, self.features.len())?;
        let y = self.predict(&x)?;
        let joined = concatenate(Axis(1), &[x.view(), y.view()]).context("joining columns")?;
        Ok(NumericTable {
            headers: self.features.iter().chain(&self.outputs).cloned().collect(),
            rows: joined.rows().into_iter().map(|row| row.to_vec()).collect(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating model directory '{}'", parent.display()))?;
            }
        }
        capsurr_io::write_json(path, self)
            .with_context(|| format!("writing surrogate model '{}'", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("opening surrogate model '{}'", path.display()))?;
        let model: SurrogateModel = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("parsing surrogate model '{}'", path.display()))?;
        if model.version != MODEL_FORMAT_VERSION {
            return Err(CapsurrError::Validation(format!(
                "surrogate model '{}' has format version {}, expected {}",
                path.display(),
                model.version,
                MODEL_FORMAT_VERSION
            ))
            .into());
        }
        model.validate()?;
        Ok(model)
    }
}

/// Predict every row of a CSV file and write the features and predicted
/// outputs to `output`. Returns the number of rows written.
pub fn predict_csv(model: &SurrogateModel, input: &Path, output: &Path) -> Result<usize> {
    let table = capsurr_io::read_numeric_table(input, &model.features)?;
    let predicted = model.predict_table(&table)?;
    capsurr_io::write_numeric_table(output, &predicted)?;
    Ok(predicted.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Activation, LayerSpec};
    use crate::optimizer::OptimizerKind;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn toy_model() -> SurrogateModel {
        let mut rng = StdRng::seed_from_u64(3);
        let layers = vec![LayerSpec {
            units: 4,
            activation: Activation::Relu,
            dropout: 0.25,
        }];
        let x = array![[1.0, 10.0], [2.0, 30.0], [3.0, 20.0]];
        let y = array![[100.0], [300.0], [200.0]];
        let normalizer = Normalizer::fit(&x).unwrap();
        let denormalizer = Normalizer::fit(&y).unwrap().denormalizer().unwrap();
        SurrogateModel {
            version: MODEL_FORMAT_VERSION,
            created_at: Utc::now(),
            features: vec!["a".into(), "b".into()],
            outputs: vec!["out".into()],
            normalizer,
            network: Mlp::new(2, &layers, 1, &mut rng).unwrap(),
            denormalizer,
            hyperparameters: Hyperparameters {
                layers,
                learning_rate: 1e-3,
                optimizer: OptimizerKind::Adam,
            },
            metrics: TrainingMetrics {
                tuner: TunerStrategy::Random,
                trials: 1,
                best_trial_score: 0.5,
                best_epoch: 0,
                epochs_run: 1,
                train_rows: 3,
                val_rows: 1,
                test_rows: 1,
                test_mse_normalized: 0.5,
                test_mse: 1.0,
                test_mse_per_output: vec![1.0],
            },
        }
    }

    #[test]
    fn saved_model_predicts_identically_after_loading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/model.json");
        let model = toy_model();
        model.save(&path).unwrap();
        let loaded = SurrogateModel::load(&path).unwrap();
        let x = array![[1.5, 12.0], [2.5, 25.0]];
        assert_eq!(model.predict(&x).unwrap(), loaded.predict(&x).unwrap());
        assert_eq!(loaded.features, model.features);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut model = toy_model();
        model.version = MODEL_FORMAT_VERSION + 1;
        model.save(&path).unwrap();
        assert!(SurrogateModel::load(&path).is_err());
    }

    #[test]
    fn inconsistent_widths_are_rejected() {
        let mut model = toy_model();
        model.outputs.push("extra".into());
        assert!(model.validate().is_err());
    }

    #[test]
    fn predict_csv_appends_output_columns() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("points.csv");
        let output = dir.path().join("pred.csv");
        fs::write(&input, "b,ignored,a\n10,0,1\n30,0,2\n").unwrap();
        let model = toy_model();
        assert_eq!(predict_csv(&model, &input, &output).unwrap(), 2);
        let table = capsurr_io::read_numeric_table(
            &output,
            &["a".to_string(), "b".to_string(), "out".to_string()],
        )
        .unwrap();
        assert_eq!(table.rows[0][..2], [1.0, 10.0]);
        let row = Array2::from_shape_vec((1, 2), vec![2.0, 30.0]).unwrap();
        let expected = model.predict(&row).unwrap();
        assert!((table.rows[1][2] - expected[[0, 0]]).abs() < 1e-9);
    }
}
