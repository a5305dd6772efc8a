//! BOLD sidecar metadata (JSON).
//!
//! Sidecars are read for the acquisition parameters bidsprep needs
//! (`RepetitionTime`) and written by the derivatives sink. Unknown keys are
//! preserved through the `extra` map so copying a sidecar never loses
//! scanner metadata.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// JSON sidecar for a BOLD series.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoldSidecar {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_time: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skull_stripped: Option<bool>,

    /// Source files relative to the BIDS root (written by the sink for
    /// derived images such as brain masks).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub raw_sources: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Read and parse a sidecar file.
pub fn read_sidecar(path: &Path) -> PipelineResult<BoldSidecar> {
    let raw = fs::read_to_string(path).map_err(|source| PipelineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PipelineError::SidecarParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize and write a sidecar file (pretty-printed JSON).
pub fn write_sidecar(path: &Path, sidecar: &BoldSidecar) -> PipelineResult<()> {
    let json =
        serde_json::to_string_pretty(sidecar).map_err(PipelineError::SidecarSerialization)?;
    fs::write(path, json).map_err(|source| PipelineError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_repetition_time() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bold.json");
        fs::write(&path, r#"{"RepetitionTime": 2.5, "EchoTime": 0.03}"#).unwrap();

        let sidecar = read_sidecar(&path).unwrap();
        assert_eq!(sidecar.repetition_time, Some(2.5));
        // Unknown keys survive a round trip.
        assert!(sidecar.extra.contains_key("EchoTime"));
    }

    #[test]
    fn test_write_skips_absent_fields() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("mask.json");
        let sidecar = BoldSidecar {
            raw_sources: vec!["sub-01/func/sub-01_task-rest_bold.nii.gz".into()],
            ..Default::default()
        };
        write_sidecar(&path, &sidecar).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("RawSources"));
        assert!(!raw.contains("RepetitionTime"));
    }

    #[test]
    fn test_malformed_sidecar_is_a_parse_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            read_sidecar(&path),
            Err(PipelineError::SidecarParse { .. })
        ));
    }
}
