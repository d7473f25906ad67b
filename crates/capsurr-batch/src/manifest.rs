use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::CollectRecord;

/// Outcome of a batch collection, written next to the dataset table.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub created_at: DateTime<Utc>,
    pub mode: String,
    pub dataset: String,
    pub num_jobs: usize,
    pub success: usize,
    pub failure: usize,
    pub jobs: Vec<CollectRecord>,
}

impl CollectionManifest {
    /// Bundles that were discovered but produced no row.
    pub fn skipped(&self) -> impl Iterator<Item = &CollectRecord> {
        self.jobs.iter().filter(|job| job.error.is_some())
    }
}

pub fn write_collection_manifest(path: &Path, manifest: &CollectionManifest) -> Result<()> {
    capsurr_io::write_json(path, manifest)
        .with_context(|| format!("writing collection manifest '{}'", path.display()))
}

pub fn load_collection_manifest(path: &Path) -> Result<CollectionManifest> {
    let file = fs::File::open(path)
        .with_context(|| format!("opening collection manifest '{}'", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("parsing collection manifest '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(index: usize, error: Option<&str>) -> CollectRecord {
        CollectRecord {
            index,
            bundle: format!("sim-{index}_x"),
            status: if error.is_some() { "error" } else { "ok" }.into(),
            error: error.map(String::from),
        }
    }

    #[test]
    fn skipped_bundles_survive_a_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/collection_manifest.json");
        let manifest = CollectionManifest {
            created_at: Utc::now(),
            mode: "batch".into(),
            dataset: "dataset.csv".into(),
            num_jobs: 3,
            success: 2,
            failure: 1,
            jobs: vec![
                record(0, None),
                record(1, Some("missing Results.json")),
                record(2, None),
            ],
        };
        write_collection_manifest(&path, &manifest).unwrap();
        let parsed = load_collection_manifest(&path).unwrap();
        let skipped: Vec<usize> = parsed.skipped().map(|job| job.index).collect();
        assert_eq!(skipped, vec![1]);
        assert_eq!(parsed.success + parsed.failure, parsed.num_jobs);
    }
}
