use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use capsurr_batch::{collect_batch, collect_single, load_collection_manifest, CollectorConfig};
use tracing::warn;

use super::load_study;
use super::telemetry::record_run_timed;
use super::util::parse_threads;

pub fn handle(config_path: &Path, single: Option<&Path>, error: i32, threads: &str) -> Result<()> {
    let config = load_study(config_path)?;
    let start = Instant::now();
    let collector = CollectorConfig::from_study(&config, parse_threads(threads));
    let res = (|| -> Result<()> {
        match single {
            Some(bundle) => {
                let row = collect_single(&collector, bundle, error)?;
                println!(
                    "Appended sample {} to {}",
                    row.index,
                    config.dataset.dataset_file.display()
                );
            }
            None => {
                let summary = collect_batch(&collector)?;
                println!(
                    "Collected {} bundle(s) into {} ({} failed); manifest {}",
                    summary.success,
                    config.dataset.dataset_file.display(),
                    summary.failure,
                    summary.manifest_path.display()
                );
                if summary.failure > 0 {
                    let manifest = load_collection_manifest(&summary.manifest_path)?;
                    for job in manifest.skipped() {
                        warn!(
                            "skipped {}: {}",
                            job.bundle,
                            job.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }
        }
        Ok(())
    })();
    let threads_param = collector.threads.to_string();
    let single_param = single
        .map(|bundle| bundle.display().to_string())
        .unwrap_or_default();
    let error_param = error.to_string();
    let mut params = vec![("threads", threads_param.as_str())];
    if single.is_some() {
        params.push(("single", single_param.as_str()));
        params.push(("error", error_param.as_str()));
    }
    record_run_timed(&config.dataset.dataset_file, "collect", &params, start, &res);
    res
}
