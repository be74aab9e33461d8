use std::fs;
use std::path::{Path, PathBuf};

use rex_core::{ErrorInfo, RexError};
use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;
use crate::stage::StopReason;

/// Reproducibility record written next to a run's artefacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration the run was started with.
    pub config: WorkflowConfig,
    /// Master seed every substream was derived from.
    pub master_seed: u64,
    /// Optional seed label captured from the configuration.
    pub seed_label: Option<String>,
    /// SHA-256 fingerprint of the input problem.
    pub problem_fingerprint: String,
    /// Rounds that completed before the loop ended.
    pub rounds_completed: usize,
    /// Why the loop ended.
    pub stop_reason: StopReason,
    /// Summary file, relative to the run directory.
    pub summary_file: PathBuf,
    /// Round trace file, relative to the run directory.
    pub trace_file: PathBuf,
}

impl RunManifest {
    /// Writes the manifest as pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), RexError> {
        write_json(path, self, "manifest")
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, RexError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            RexError::Serde(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            RexError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display()),
            )
        })
    }
}

/// Serializes `value` as pretty JSON at `path`. Error codes are prefixed with
/// `what`.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<(), RexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            RexError::Serde(
                ErrorInfo::new(format!("{what}-mkdir"), err.to_string())
                    .with_context("path", parent.display()),
            )
        })?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|err| {
        RexError::Serde(
            ErrorInfo::new(format!("{what}-serialize"), err.to_string())
                .with_context("path", path.display()),
        )
    })?;
    fs::write(path, json).map_err(|err| {
        RexError::Serde(
            ErrorInfo::new(format!("{what}-write"), err.to_string())
                .with_context("path", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_round_trips_through_disk() {
        let manifest = RunManifest {
            config: WorkflowConfig::default().with_seed(9),
            master_seed: 9,
            seed_label: Some("smoke".into()),
            problem_fingerprint: "ab".repeat(32),
            rounds_completed: 3,
            stop_reason: StopReason::Completed,
            summary_file: PathBuf::from("summary.json"),
            trace_file: PathBuf::from("trace.csv"),
        };
        let dir = tempdir().unwrap();
        let path = dir.path().join("run").join("manifest.json");
        manifest.write(&path).unwrap();
        assert_eq!(RunManifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn missing_manifest_is_a_serde_error() {
        let dir = tempdir().unwrap();
        let err = RunManifest::load(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(err.info().code, "manifest-read");
    }
}
