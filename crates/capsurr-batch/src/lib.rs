pub mod dataset;
pub mod job;
pub mod manifest;
pub mod metrics;
pub mod runner;

pub use dataset::DatasetRow;
pub use job::{admit_bundle, discover_jobs, Admission, CollectJob, CollectRecord};
pub use manifest::{load_collection_manifest, write_collection_manifest, CollectionManifest};
pub use metrics::{compute_metrics, BundleMetrics};
pub use runner::{collect_batch, collect_bundle, collect_single, CollectSummary, CollectorConfig};
