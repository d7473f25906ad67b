use std::{path::Path, time::Instant};

use capsurr_cli::manifest::{record_manifest, ManifestTelemetry};

/// Record the run manifest of a command next to `out`. A manifest that
/// cannot be written is reported and never fails the command.
pub fn record_run_timed(
    out: &Path,
    command: &str,
    params: &[(&str, &str)],
    start: Instant,
    result: &anyhow::Result<()>,
) {
    let telemetry = ManifestTelemetry {
        status: if result.is_ok() { "success" } else { "failure" }.to_string(),
        duration_ms: Some(start.elapsed().as_millis()),
    };
    if let Err(err) = record_manifest(out, command, params, telemetry) {
        eprintln!("Failed to record run manifest: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsurr_cli::manifest::read_manifest;
    use tempfile::tempdir;

    #[test]
    fn failed_runs_record_status_and_duration_only() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("dataset.csv");
        let failed: anyhow::Result<()> = Err(anyhow::anyhow!("simulator missing"));
        record_run_timed(&out, "run", &[("bundle", "sim-0_x")], Instant::now(), &failed);

        let manifests: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(manifests.len(), 1);
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&manifests[0]).unwrap()).unwrap();
        let mut keys: Vec<&str> = raw["telemetry"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort();
        assert_eq!(keys, ["duration_ms", "status"]);

        let entry = read_manifest(&manifests[0]).unwrap();
        assert_eq!(entry.command, "run");
        assert_eq!(entry.telemetry.unwrap().status, "failure");
    }
}
