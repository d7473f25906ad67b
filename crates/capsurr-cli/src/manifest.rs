use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One CLI invocation, written as `run-<uuid>.json` next to its output.
#[derive(Debug, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub outputs: Vec<String>,
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<ManifestTelemetry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestTelemetry {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
}

/// Record a run manifest in the directory holding `output` and return its
/// path.
pub fn record_manifest(
    output: &Path,
    command: &str,
    params: &[(&str, &str)],
    telemetry: ManifestTelemetry,
) -> Result<PathBuf> {
    let run_id = Uuid::new_v4().to_string();
    let dir = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating manifest directory '{}'", dir.display()))?;
    let manifest = ManifestEntry {
        run_id: run_id.clone(),
        command: command.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        outputs: vec![output.display().to_string()],
        params: params
            .iter()
            .map(|(k, v)| Param {
                name: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
        telemetry: Some(telemetry),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = dir.join(format!("run-{}.json", run_id));
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    println!("Recorded run manifest {}", path.display());
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("reading run manifest '{}'", path.display()))?;
    let manifest = serde_json::from_str(&json)
        .with_context(|| format!("parsing run manifest '{}'", path.display()))?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_lands_next_to_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out/dataset.csv");
        let telemetry = ManifestTelemetry {
            status: "success".into(),
            duration_ms: Some(12),
        };
        let path = record_manifest(&output, "collect", &[("threads", "4")], telemetry).unwrap();
        assert_eq!(path.parent(), output.parent());
        let entry = read_manifest(&path).unwrap();
        assert_eq!(entry.command, "collect");
        assert_eq!(
            entry.params,
            vec![Param {
                name: "threads".into(),
                value: "4".into()
            }]
        );
        let telemetry = entry.telemetry.unwrap();
        assert_eq!(telemetry.status, "success");
        assert_eq!(telemetry.duration_ms, Some(12));
    }
}
