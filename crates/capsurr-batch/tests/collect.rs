use std::fs;
use std::path::Path;

use capsurr_batch::{collect_batch, collect_single, CollectorConfig, DatasetRow};
use capsurr_core::config::DatasetConfig;
use capsurr_core::fixtures::{toy_inputs, toy_results};
use capsurr_core::SamplePoint;
use tempfile::tempdir;

fn write_bundle(root: &Path, point: &SamplePoint, results: bool) -> std::path::PathBuf {
    let dir = root.join(point.bundle_name());
    fs::create_dir_all(&dir).unwrap();
    capsurr_io::write_inputs(&dir.join("Inputs.json"), &toy_inputs()).unwrap();
    capsurr_io::write_coordinates(&dir.join("sample.csv"), point).unwrap();
    if results {
        capsurr_io::write_results(&dir.join("Results.json"), &toy_results()).unwrap();
    }
    dir
}

fn collector(root: &Path, threads: usize) -> CollectorConfig {
    CollectorConfig {
        simulations_dir: root.join("simulations"),
        reference_dir: "reference".into(),
        dataset: DatasetConfig {
            dataset_file: root.join("dataset.csv"),
            ..Default::default()
        },
        threads,
    }
}

fn point(index: usize, ratio: f64) -> SamplePoint {
    SamplePoint::from_values(index, &[ratio, 0.123456789, 0.1, 0.2, 0.3, 0.0]).unwrap()
}

#[test]
fn batch_collection_orders_rows_and_skips_broken_bundles() {
    let dir = tempdir().unwrap();
    let config = collector(dir.path(), 4);
    let sims = &config.simulations_dir;
    for index in [3, 0, 11, 7] {
        write_bundle(sims, &point(index, 1.0 + index as f64 / 100.0), true);
    }
    // failed run: debug file present
    let failed = write_bundle(sims, &point(20, 1.5), true);
    fs::write(failed.join("debug.json"), "{}").unwrap();
    // not yet simulated
    write_bundle(sims, &point(21, 1.5), false);
    // unparsable results
    let broken = write_bundle(sims, &point(5, 1.5), true);
    fs::write(broken.join("Results.json"), "not json").unwrap();
    // reference bundle is never collected
    let reference = write_bundle(sims, &point(30, 1.0), true);
    fs::rename(reference, sims.join("reference")).unwrap();

    let summary = collect_batch(&config).unwrap();
    let indices: Vec<usize> = summary.rows.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 3, 7, 11]);
    assert_eq!(summary.failure, 1);
    assert!(summary.manifest_path.is_file());

    let rows: Vec<DatasetRow> = capsurr_io::read_records(&config.dataset.dataset_file).unwrap();
    assert_eq!(rows, summary.rows);
    // exact coordinates, not the rounded directory label
    assert_eq!(rows[0].share_flex, 0.123456789);
    assert!((rows[0].cf_gas - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(rows[0].error_flag, 0);
}

#[test]
fn batch_collection_overwrites_previous_dataset() {
    let dir = tempdir().unwrap();
    let config = collector(dir.path(), 1);
    write_bundle(&config.simulations_dir, &point(0, 1.0), true);
    collect_batch(&config).unwrap();
    collect_batch(&config).unwrap();
    let rows: Vec<DatasetRow> = capsurr_io::read_records(&config.dataset.dataset_file).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn single_collection_appends_with_given_flag() {
    let dir = tempdir().unwrap();
    let config = collector(dir.path(), 1);
    let first = write_bundle(&config.simulations_dir, &point(0, 1.0), true);
    let second = write_bundle(&config.simulations_dir, &point(1, 1.2), true);

    collect_single(&config, &first, 0).unwrap();
    let row = collect_single(&config, &second, 3).unwrap();
    assert_eq!(row.index, 1);
    assert_eq!(row.error_flag, 3);

    let rows: Vec<DatasetRow> = capsurr_io::read_records(&config.dataset.dataset_file).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].error_flag, 3);
}

#[test]
fn single_collection_requires_results() {
    let dir = tempdir().unwrap();
    let config = collector(dir.path(), 1);
    let bundle = write_bundle(&config.simulations_dir, &point(0, 1.0), false);
    assert!(collect_single(&config, &bundle, 0).is_err());
    assert!(!config.dataset.dataset_file.exists());
}
