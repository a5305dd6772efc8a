//! Conversion provenance.
//!
//! Every conversion writes a YAML manifest into the BIDS subject directory
//! recording which raw file each BIDS artefact came from. The manifest is an
//! audit record; nothing in the pipeline reads it back except operators and
//! tests.

use crate::error::{PipelineError, PipelineResult};
use crate::subject::Subject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One recorded copy operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Per-subject conversion manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionManifest {
    pub subject: String,
    pub generated_at: DateTime<Utc>,
    pub copies: Vec<CopyRecord>,
}

impl ConversionManifest {
    pub fn new(subject: &Subject) -> Self {
        Self {
            subject: subject.bids_label(),
            generated_at: Utc::now(),
            copies: Vec::new(),
        }
    }

    pub fn record(&mut self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) {
        self.copies.push(CopyRecord {
            source: source.into(),
            destination: destination.into(),
        });
    }

    pub fn write(&self, path: &Path) -> PipelineResult<()> {
        let yaml = serde_yaml::to_string(self).map_err(PipelineError::YamlSerialization)?;
        fs::write(path, yaml).map_err(|source| PipelineError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| PipelineError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| PipelineError::YamlParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("provenance.yaml");
        let subject = Subject::new("7014", 1, 1).unwrap();

        let mut manifest = ConversionManifest::new(&subject);
        manifest.record("/raw/anatomical/spgr.nii.gz", "/bids/sub-701411_T1w.nii.gz");
        manifest.write(&path).unwrap();

        let loaded = ConversionManifest::load(&path).unwrap();
        assert_eq!(loaded.subject, "sub-701411");
        assert_eq!(loaded.copies, manifest.copies);
    }
}
