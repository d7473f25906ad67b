//! Bundle manifest: which directory holds which sample.
//!
//! ```text
//! simulations/
//!   bundle_manifest.json          # sample index -> bundle directory
//!   reference/
//!     Inputs.json
//!   sim-0_1.23-0.50-0.10-0.25-0.33-0.00/
//!     Inputs.json
//!     sample.csv
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use capsurr_core::SamplePoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRecord {
    pub index: usize,
    /// Directory name relative to the simulations directory
    pub bundle: String,
    pub sample: SamplePoint,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default)]
    pub bundles: Vec<BundleRecord>,
}

impl BundleManifest {
    /// Insert or replace the record of `record.index`, keeping index order.
    pub fn upsert(&mut self, record: BundleRecord) {
        match self
            .bundles
            .binary_search_by_key(&record.index, |existing| existing.index)
        {
            Ok(pos) => self.bundles[pos] = record,
            Err(pos) => self.bundles.insert(pos, record),
        }
    }

    pub fn get(&self, index: usize) -> Option<&BundleRecord> {
        self.bundles
            .binary_search_by_key(&index, |record| record.index)
            .ok()
            .map(|pos| &self.bundles[pos])
    }

    /// Sample index of the bundle stored under directory `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.bundles
            .iter()
            .find(|record| record.bundle == name)
            .map(|record| record.index)
    }
}

pub fn write_bundle_manifest(path: &Path, manifest: &BundleManifest) -> Result<()> {
    capsurr_io::write_json(path, manifest)
        .with_context(|| format!("writing bundle manifest '{}'", path.display()))
}

pub fn load_bundle_manifest(path: &Path) -> Result<BundleManifest> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening bundle manifest '{}'", path.display()))?;
    let mut manifest: BundleManifest = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("parsing bundle manifest '{}'", path.display()))?;
    manifest.bundles.sort_by_key(|record| record.index);
    Ok(manifest)
}

/// Load the manifest, or start an empty one when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<BundleManifest> {
    if path.exists() {
        load_bundle_manifest(path)
    } else {
        Ok(BundleManifest::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn record(index: usize) -> BundleRecord {
        let sample = SamplePoint::from_values(index, &[1.0, 0.5, 0.1, 0.2, 0.3, 0.0]).unwrap();
        BundleRecord {
            index,
            bundle: sample.bundle_name(),
            sample,
            created_at: "2025-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn upsert_keeps_order_and_replaces() {
        let mut manifest = BundleManifest::default();
        manifest.upsert(record(2));
        manifest.upsert(record(0));
        manifest.upsert(record(1));
        let mut replacement = record(1);
        replacement.bundle = "moved".into();
        manifest.upsert(replacement);
        let indices: Vec<usize> = manifest.bundles.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(manifest.get(1).unwrap().bundle, "moved");
        assert_eq!(manifest.index_of("moved"), Some(1));
        assert_eq!(manifest.index_of("absent"), None);
    }

    #[test]
    fn writes_and_reads_manifest() {
        let tmp = NamedTempFile::new().unwrap();
        let mut manifest = BundleManifest::default();
        manifest.upsert(record(4));
        write_bundle_manifest(tmp.path(), &manifest).unwrap();
        assert_eq!(load_bundle_manifest(tmp.path()).unwrap(), manifest);
    }
}
