//! Training data: loading the collected dataset and the seeded
//! train/validation/test split.

use std::path::Path;

use anyhow::{Context, Result};
use capsurr_core::CapsurrError;
use ndarray::{concatenate, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

/// Feature and output matrices read from a dataset table.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<String>,
    pub outputs: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array2<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }
}

/// Rows of one partition.
#[derive(Debug, Clone)]
pub struct Partition {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    /// Stack two partitions row-wise.
    pub fn concat(&self, other: &Partition) -> Result<Partition> {
        Ok(Partition {
            x: concatenate(Axis(0), &[self.x.view(), other.x.view()])
                .context("stacking feature rows")?,
            y: concatenate(Axis(0), &[self.y.view(), other.y.view()])
                .context("stacking output rows")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub train: Partition,
    pub val: Partition,
    pub test: Partition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

/// Convert row vectors into a matrix with `width` columns.
pub fn rows_to_array(rows: &[Vec<f64>], width: usize) -> Result<Array2<f64>> {
    let mut flat = Vec::with_capacity(rows.len() * width);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(CapsurrError::Validation(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                width
            ))
            .into());
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), width), flat).context("shaping rows into a matrix")
}

/// Read the feature and output columns of a dataset table.
pub fn load_dataset(path: &Path, features: &[String], outputs: &[String]) -> Result<Dataset> {
    let columns: Vec<String> = features.iter().chain(outputs).cloned().collect();
    let table = capsurr_io::read_numeric_table(path, &columns)
        .with_context(|| format!("loading dataset '{}'", path.display()))?;
    let x = rows_to_array(&table.select(features)?, features.len())?;
    let y = rows_to_array(&table.select(outputs)?, outputs.len())?;
    info!(
        "loaded {} rows ({} features, {} outputs) from {}",
        x.nrows(),
        features.len(),
        outputs.len(),
        path.display()
    );
    Ok(Dataset {
        features: features.to_vec(),
        outputs: outputs.to_vec(),
        x,
        y,
    })
}

/// Partition sizes for `n` rows: the training share is rounded up, and the
/// remainder is divided by `test / (test + val)`, again rounding the test
/// share up.
pub fn split_sizes(n: usize, ratios: SplitRatios) -> Result<(usize, usize, usize)> {
    let SplitRatios { train, val, test } = ratios;
    if [train, val, test].iter().any(|r| !(*r > 0.0 && *r < 1.0)) {
        return Err(CapsurrError::Validation(format!(
            "split ratios must lie in (0, 1), got {train}/{val}/{test}"
        ))
        .into());
    }
    let n_train = (train * n as f64).ceil() as usize;
    let rest = n.saturating_sub(n_train);
    let n_test = (test / (test + val) * rest as f64).ceil() as usize;
    let n_val = rest.saturating_sub(n_test);
    if n_train == 0 || n_val == 0 || n_test == 0 {
        return Err(CapsurrError::Training(format!(
            "{n} rows cannot be split into non-empty partitions ({n_train}/{n_val}/{n_test})"
        ))
        .into());
    }
    Ok((n_train, n_val, n_test))
}

/// Shuffle with `seed` and split into training, validation and test rows.
pub fn split_dataset(dataset: &Dataset, ratios: SplitRatios, seed: u64) -> Result<Split> {
    let n = dataset.len();
    let (n_train, n_val, n_test) = split_sizes(n, ratios)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let (train_idx, rest) = order.split_at(n_train);
    let mut rest = rest.to_vec();
    rest.shuffle(&mut rng);
    let (test_idx, val_idx) = rest.split_at(n_test);

    let take = |idx: &[usize]| Partition {
        x: dataset.x.select(Axis(0), idx),
        y: dataset.y.select(Axis(0), idx),
    };
    let split = Split {
        train: take(train_idx),
        val: take(val_idx),
        test: take(test_idx),
    };
    info!(
        "split {} rows into {} train / {} validation / {} test",
        n,
        split.train.len(),
        split.val.len(),
        split.test.len()
    );
    debug_assert_eq!(split.val.len(), n_val);
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::tempdir;

    const RATIOS: SplitRatios = SplitRatios {
        train: 0.7,
        val: 0.1,
        test: 0.2,
    };

    fn dataset(n: usize) -> Dataset {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 10 + j) as f64);
        let y = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        Dataset {
            features: vec!["a".into(), "b".into()],
            outputs: vec!["y".into()],
            x,
            y,
        }
    }

    #[test]
    fn sizes_round_training_and_test_up() {
        assert_eq!(split_sizes(10, RATIOS).unwrap(), (7, 1, 2));
        assert_eq!(split_sizes(100, RATIOS).unwrap(), (70, 10, 20));
        assert_eq!(split_sizes(11, RATIOS).unwrap(), (8, 1, 2));
        assert!(split_sizes(2, RATIOS).is_err());
        let no_val = SplitRatios {
            train: 0.8,
            val: 0.0,
            test: 0.2,
        };
        assert!(split_sizes(10, no_val).is_err());
    }

    #[test]
    fn split_is_a_seeded_partition() {
        let data = dataset(40);
        let split = split_dataset(&data, RATIOS, 7).unwrap();
        assert_eq!(split.train.len(), 28);
        assert_eq!(split.val.len(), 4);
        assert_eq!(split.test.len(), 8);

        let mut seen = BTreeSet::new();
        for part in [&split.train, &split.val, &split.test] {
            for row in part.y.column(0) {
                assert!(seen.insert(*row as usize));
            }
            // features travel with their outputs
            for (x, y) in part.x.rows().into_iter().zip(part.y.column(0)) {
                assert_eq!(x[0], *y * 10.0);
            }
        }
        assert_eq!(seen.len(), 40);

        let again = split_dataset(&data, RATIOS, 7).unwrap();
        assert_eq!(again.test.y, split.test.y);
        let other = split_dataset(&data, RATIOS, 8).unwrap();
        assert_ne!(other.train.y, split.train.y);
    }

    #[test]
    fn loads_selected_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        fs::write(&path, "Index,a,b,y,z\n0,1,2,3,4\n1,5,6,7,8\n").unwrap();
        let data = load_dataset(
            &path,
            &["b".to_string(), "a".to_string()],
            &["y".to_string()],
        )
        .unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.x.row(1).to_vec(), vec![6.0, 5.0]);
        assert_eq!(data.y.column(0).to_vec(), vec![3.0, 7.0]);
    }
}
