use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use capsurr_core::config::{DatasetConfig, StudyConfig};
use capsurr_scenarios::manifest::load_or_default;
use chrono::Utc;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

use crate::dataset::DatasetRow;
use crate::job::{admit_bundle, discover_jobs, resolve_index, Admission, CollectJob, CollectRecord};
use crate::manifest::{write_collection_manifest, CollectionManifest};
use crate::metrics::compute_metrics;

/// Settings of a collection run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub simulations_dir: PathBuf,
    pub reference_dir: String,
    pub dataset: DatasetConfig,
    /// Worker threads; 0 means one per CPU
    pub threads: usize,
}

impl CollectorConfig {
    pub fn from_study(config: &StudyConfig, threads: usize) -> Self {
        Self {
            simulations_dir: config.simulation.simulations_dir.clone(),
            reference_dir: config.simulation.reference_dir.clone(),
            dataset: config.dataset.clone(),
            threads,
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.simulations_dir.join(&self.dataset.manifest_file)
    }
}

/// Summary returned after a collection run.
pub struct CollectSummary {
    pub rows: Vec<DatasetRow>,
    pub success: usize,
    pub failure: usize,
    pub manifest_path: PathBuf,
    pub jobs: Vec<CollectRecord>,
}

/// Read one bundle into a dataset row.
///
/// The sample coordinates come from the bundle's coordinate file; the
/// error flag defaults to the error code recorded in the results.
pub fn collect_bundle(job: &CollectJob, dataset: &DatasetConfig, error_flag: Option<i32>) -> Result<DatasetRow> {
    let dir = &job.bundle_dir;
    let inputs = capsurr_io::read_inputs(&dir.join(&dataset.inputs_file))?;
    let results = capsurr_io::read_results(&dir.join(&dataset.results_file))?;
    let sample = capsurr_io::read_coordinates(&dir.join(&dataset.coordinate_file), job.index)?;
    let metrics = compute_metrics(&inputs, &results);
    let flag = error_flag.or(results.error_code).unwrap_or(0);
    Ok(DatasetRow::new(&sample, &metrics, flag))
}

fn collection_manifest_path(dataset_file: &Path) -> PathBuf {
    let parent = dataset_file.parent().unwrap_or_else(|| Path::new("."));
    parent.join("collection_manifest.json")
}

/// Collect every admitted bundle and overwrite the dataset table.
///
/// Bundles that fail to parse are logged and left out; rows are ordered by
/// sample index whatever the thread count.
pub fn collect_batch(config: &CollectorConfig) -> Result<CollectSummary> {
    let manifest = load_or_default(&config.manifest_path())?;
    let jobs = discover_jobs(
        &config.simulations_dir,
        &config.dataset,
        &config.reference_dir,
        &manifest,
    )?;
    info!(
        "collecting {} bundle(s) from {}",
        jobs.len(),
        config.simulations_dir.display()
    );

    let thread_count = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for collection")?;

    let outcomes: Vec<(CollectRecord, Option<DatasetRow>)> = pool.install(|| {
        jobs.par_iter()
            .map(|job| match collect_bundle(job, &config.dataset, None) {
                Ok(row) => (record(job, None), Some(row)),
                Err(err) => {
                    warn!("skipping {}: {:#}", job.name, err);
                    (record(job, Some(format!("{err:#}"))), None)
                }
            })
            .collect()
    });

    let mut records = Vec::with_capacity(outcomes.len());
    let mut rows = Vec::new();
    for (rec, row) in outcomes {
        records.push(rec);
        rows.extend(row);
    }
    let success = rows.len();
    let failure = records.len() - success;

    capsurr_io::write_records(&config.dataset.dataset_file, &rows)?;
    let manifest_path = collection_manifest_path(&config.dataset.dataset_file);
    write_collection_manifest(
        &manifest_path,
        &CollectionManifest {
            created_at: Utc::now(),
            mode: "batch".into(),
            dataset: config.dataset.dataset_file.display().to_string(),
            num_jobs: records.len(),
            success,
            failure,
            jobs: records.clone(),
        },
    )?;
    info!(
        "dataset written to {} ({} rows, {} skipped)",
        config.dataset.dataset_file.display(),
        success,
        failure
    );
    Ok(CollectSummary {
        rows,
        success,
        failure,
        manifest_path,
        jobs: records,
    })
}

/// Collect one bundle and append its row to the dataset table.
///
/// Used right after a simulator run: `error_flag` is the simulator's exit
/// status and is recorded as given.
pub fn collect_single(config: &CollectorConfig, bundle: &Path, error_flag: i32) -> Result<DatasetRow> {
    let name = bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("bundle path '{}' has no directory name", bundle.display()))?;
    match admit_bundle(bundle, &config.dataset, &config.reference_dir) {
        Admission::Admitted | Admission::DebugPresent => {}
        other => {
            return Err(anyhow!(
                "bundle '{}' cannot be collected: {:?}",
                bundle.display(),
                other
            ))
        }
    }
    let manifest_path = bundle
        .parent()
        .map(|parent| parent.join(&config.dataset.manifest_file))
        .unwrap_or_else(|| config.manifest_path());
    let manifest = load_or_default(&manifest_path)?;
    let index = resolve_index(&name, &manifest)
        .ok_or_else(|| anyhow!("cannot determine the sample index of '{}'", name))?;
    let job = CollectJob {
        index,
        name,
        bundle_dir: bundle.to_path_buf(),
    };
    let row = collect_bundle(&job, &config.dataset, Some(error_flag))
        .with_context(|| format!("collecting '{}'", bundle.display()))?;
    capsurr_io::append_records(&config.dataset.dataset_file, std::slice::from_ref(&row))?;
    info!(
        "appended sample {} to {} (error flag {})",
        index,
        config.dataset.dataset_file.display(),
        error_flag
    );
    Ok(row)
}

fn record(job: &CollectJob, error: Option<String>) -> CollectRecord {
    CollectRecord {
        index: job.index,
        bundle: job.name.clone(),
        status: if error.is_none() { "ok" } else { "error" }.to_string(),
        error,
    }
}
