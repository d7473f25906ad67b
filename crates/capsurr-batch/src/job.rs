use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use capsurr_core::config::DatasetConfig;
use capsurr_core::sample::index_from_bundle_name;
use capsurr_scenarios::BundleManifest;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Why a directory was or was not admitted for collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Admitted,
    Reference,
    /// Staging or retired directories of an in-flight materialization
    Hidden,
    MissingResults,
    DebugPresent,
}

/// Admission filter: results file present, debug file absent, and not the
/// reference bundle.
pub fn admit_bundle(dir: &Path, dataset: &DatasetConfig, reference_dir: &str) -> Admission {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.starts_with('.') {
        return Admission::Hidden;
    }
    if name == reference_dir || name.ends_with(reference_dir) {
        return Admission::Reference;
    }
    if !dir.join(&dataset.results_file).is_file() {
        return Admission::MissingResults;
    }
    if dir.join(&dataset.debug_file).exists() {
        return Admission::DebugPresent;
    }
    Admission::Admitted
}

/// One bundle to collect.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectJob {
    pub index: usize,
    pub name: String,
    pub bundle_dir: PathBuf,
}

/// Outcome of collecting one bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectRecord {
    pub index: usize,
    pub bundle: String,
    pub status: String,
    pub error: Option<String>,
}

/// Sample index of a bundle directory: the manifest entry when present,
/// otherwise the `sim-<i>_` prefix of its name.
pub fn resolve_index(name: &str, manifest: &BundleManifest) -> Option<usize> {
    manifest
        .index_of(name)
        .or_else(|| index_from_bundle_name(name))
}

/// Admitted bundles under `simulations_dir`, sorted by sample index.
pub fn discover_jobs(
    simulations_dir: &Path,
    dataset: &DatasetConfig,
    reference_dir: &str,
    manifest: &BundleManifest,
) -> Result<Vec<CollectJob>> {
    let entries = fs::read_dir(simulations_dir).with_context(|| {
        format!(
            "reading simulations directory '{}'",
            simulations_dir.display()
        )
    })?;
    let mut jobs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match admit_bundle(&path, dataset, reference_dir) {
            Admission::Admitted => {}
            other => {
                debug!("skipping {}: {:?}", name, other);
                continue;
            }
        }
        match resolve_index(&name, manifest) {
            Some(index) => jobs.push(CollectJob {
                index,
                name,
                bundle_dir: path,
            }),
            None => warn!("skipping {}: cannot determine its sample index", name),
        }
    }
    jobs.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn bundle(root: &Path, name: &str, results: bool, debug: bool) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if results {
            fs::write(dir.join("Results.json"), "{}").unwrap();
        }
        if debug {
            fs::write(dir.join("debug.json"), "{}").unwrap();
        }
        dir
    }

    #[test]
    fn admission_filter_combinations() {
        let dir = tempdir().unwrap();
        let dataset = DatasetConfig::default();
        let cases = [
            ("sim-0_a", true, false, Admission::Admitted),
            ("sim-1_a", false, false, Admission::MissingResults),
            ("sim-2_a", true, true, Admission::DebugPresent),
            ("sim-3_a", false, true, Admission::MissingResults),
            ("reference", true, false, Admission::Reference),
            ("old-reference", true, false, Admission::Reference),
            (".sim-4_a.staging-x", true, false, Admission::Hidden),
        ];
        for (name, results, debug, expected) in cases {
            let path = bundle(dir.path(), name, results, debug);
            assert_eq!(admit_bundle(&path, &dataset, "reference"), expected, "{name}");
        }
    }

    #[test]
    fn discovery_sorts_by_index_and_uses_manifest() {
        let dir = tempdir().unwrap();
        bundle(dir.path(), "sim-10_x", true, false);
        bundle(dir.path(), "sim-2_x", true, false);
        bundle(dir.path(), "renamed", true, false);
        bundle(dir.path(), "orphan", true, false);
        bundle(dir.path(), "reference", true, false);
        fs::write(dir.path().join("bundle_manifest.json"), "{}").unwrap();

        let sample =
            capsurr_core::SamplePoint::from_values(5, &[1.0, 0.5, 0.1, 0.2, 0.3, 0.0]).unwrap();
        let mut manifest = BundleManifest::default();
        manifest.upsert(capsurr_scenarios::BundleRecord {
            index: 5,
            bundle: "renamed".into(),
            sample,
            created_at: chrono::Utc::now(),
        });

        let jobs = discover_jobs(dir.path(), &DatasetConfig::default(), "reference", &manifest)
            .unwrap();
        let order: Vec<(usize, &str)> = jobs.iter().map(|j| (j.index, j.name.as_str())).collect();
        assert_eq!(order, vec![(2, "sim-2_x"), (5, "renamed"), (10, "sim-10_x")]);
    }
}
