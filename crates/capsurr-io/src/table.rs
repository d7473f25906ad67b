//! CSV tables: the sample design and the collected dataset.

use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use capsurr_core::{CapsurrError, SamplePoint};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::staged::write_file_staged;

/// Write rows with a header line, replacing any existing file.
pub fn write_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    write_file_staged(path, "table", |writer| {
        let mut csv = csv::Writer::from_writer(writer);
        for row in rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    })
    .with_context(|| format!("writing table '{}'", path.display()))
}

/// Append rows; the header is written only when the file is new or empty.
/// An exclusive advisory lock covers the emptiness check and the write, so
/// concurrent appenders never both add a header.
pub fn append_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening table '{}' for append", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("locking table '{}'", path.display()))?;
    let written = (|| -> Result<()> {
        let needs_header = file.metadata()?.len() == 0;
        let mut csv = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(&file);
        for row in rows {
            csv.serialize(row)
                .with_context(|| format!("appending to '{}'", path.display()))?;
        }
        csv.flush()?;
        Ok(())
    })();
    let unlocked = FileExt::unlock(&file)
        .with_context(|| format!("unlocking table '{}'", path.display()));
    written.and(unlocked)
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening table '{}'", path.display()))?;
    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("reading row {} of '{}'", i + 1, path.display())))
        .collect()
}

/// Write the sample design: an `Index` column followed by the study
/// parameters.
pub fn write_samples(path: &Path, samples: &[SamplePoint]) -> Result<()> {
    write_records(path, samples)
}

pub fn read_samples(path: &Path) -> Result<Vec<SamplePoint>> {
    read_records(path)
}

/// All-numeric CSV table kept in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl NumericTable {
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| {
                CapsurrError::Validation(format!(
                    "column '{}' not found (available: {})",
                    name,
                    self.headers.join(", ")
                ))
                .into()
            })
    }

    /// Rows restricted to `columns`, in the given order.
    pub fn select(&self, columns: &[String]) -> Result<Vec<Vec<f64>>> {
        let positions = columns
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(self
            .rows
            .iter()
            .map(|row| positions.iter().map(|&pos| row[pos]).collect())
            .collect())
    }
}

/// Read a CSV table, keeping only the requested columns' text parsed as
/// numbers. Empty cells read as zero.
pub fn read_numeric_table(path: &Path, columns: &[String]) -> Result<NumericTable> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening table '{}'", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("reading header of '{}'", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();
    let positions = columns
        .iter()
        .map(|name| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                anyhow!(
                    "column '{}' not found in '{}' (available: {})",
                    name,
                    path.display(),
                    headers.join(", ")
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading '{}'", path.display()))?;
        let mut row = Vec::with_capacity(positions.len());
        for (&pos, name) in positions.iter().zip(columns) {
            let raw = record.get(pos).unwrap_or_default().trim();
            let value = if raw.is_empty() {
                0.0
            } else {
                raw.parse::<f64>().with_context(|| {
                    format!("row {} column '{}': '{}' is not a number", line + 1, name, raw)
                })?
            };
            row.push(value);
        }
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("table '{}' has no rows", path.display());
    }
    Ok(NumericTable {
        headers: columns.to_vec(),
        rows,
    })
}

/// Write a numeric table, replacing any existing file.
pub fn write_numeric_table(path: &Path, table: &NumericTable) -> Result<()> {
    write_file_staged(path, "table", |writer| {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&table.headers)?;
        for row in &table.rows {
            if row.len() != table.headers.len() {
                bail!(
                    "row has {} values for {} columns",
                    row.len(),
                    table.headers.len()
                );
            }
            csv.write_record(row.iter().map(|value| value.to_string()))?;
        }
        csv.flush()?;
        Ok(())
    })
    .with_context(|| format!("writing table '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        value: f64,
    }

    #[test]
    fn samples_table_has_index_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        let samples = vec![
            SamplePoint::from_values(0, &[1.0, 0.5, 0.1, 0.2, 0.3, 0.4]).unwrap(),
            SamplePoint::from_values(1, &[1.5, 0.25, 0.0, 0.5, 0.2, 0.7]).unwrap(),
        ];
        write_samples(&path, &samples).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "Index,CapacityRatio,ShareFlex,ShareStorage,ShareWind,SharePV,rNTC\n"
        ));
        assert_eq!(read_samples(&path).unwrap(), samples);
    }

    #[test]
    fn append_writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        append_records(&path, &[Row { name: "a".into(), value: 1.0 }]).unwrap();
        append_records(&path, &[Row { name: "b".into(), value: 2.0 }]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("name,value").count(), 1);
        let rows: Vec<Row> = read_records(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "b");
    }

    #[test]
    fn concurrent_appends_share_one_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/data.csv");
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let path = &path;
                scope.spawn(move || {
                    for i in 0..5 {
                        let row = Row {
                            name: format!("w{worker}-{i}"),
                            value: i as f64,
                        };
                        append_records(path, &[row]).unwrap();
                    }
                });
            }
        });
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("name,value").count(), 1);
        assert!(text.starts_with("name,value\n"));
        let rows: Vec<Row> = read_records(&path).unwrap();
        assert_eq!(rows.len(), 40);
    }

    #[test]
    fn overwrite_replaces_previous_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        write_records(&path, &[Row { name: "a".into(), value: 1.0 }]).unwrap();
        write_records(&path, &[Row { name: "b".into(), value: 2.0 }]).unwrap();
        let rows: Vec<Row> = read_records(&path).unwrap();
        assert_eq!(rows, vec![Row { name: "b".into(), value: 2.0 }]);
    }

    #[test]
    fn numeric_table_selects_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b,c\n1,2,3\n4,,6\n").unwrap();
        let table =
            read_numeric_table(&path, &["c".to_string(), "b".to_string()]).unwrap();
        assert_eq!(table.rows, vec![vec![3.0, 2.0], vec![6.0, 0.0]]);
        assert!(read_numeric_table(&path, &["z".to_string()]).is_err());
    }

    #[test]
    fn numeric_table_writes_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = NumericTable {
            headers: vec!["x".into(), "y".into()],
            rows: vec![vec![1.0, 0.25], vec![-2.0, 3.5]],
        };
        write_numeric_table(&path, &table).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x,y\n1,0.25\n-2,3.5\n");
        let bad = NumericTable {
            headers: vec!["x".into()],
            rows: vec![vec![1.0, 2.0]],
        };
        assert!(write_numeric_table(&dir.path().join("bad.csv"), &bad).is_err());
    }
}
