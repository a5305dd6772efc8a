//! Core runtime configuration.
//!
//! This module defines configuration that is resolved once at process startup
//! and then passed into core services. All project-specific paths are
//! constructed here so the layout conventions live in exactly one place.
//!
//! The raw layout served by a project directory is:
//!
//! ```text
//! <project>/data/imaging/
//!   participants/<pid>/visit<V>/session<S>/
//!     anatomical/               # raw T1w candidates
//!     anatomical/preprocessed/  # collected fMRIPrep anatomical outputs
//!     fmri/<task>/unnormalized/ # raw BOLD + JSON sidecar
//!     fmri/<task>/<pipeline>/   # collected fMRIPrep functional outputs
//!   BIDS/sub-<label>/{anat,func}/
//! ```

use crate::constants::{
    ANATOMICAL_DIR_NAME, BIDS_DIR_NAME, DATA_DIR_NAME, FMRI_DIR_NAME, IMAGING_DIR_NAME,
    MNI_ORIGIN_MM, PARTICIPANTS_DIR_NAME, PREPROCESSED_DIR_NAME, REORIENT_THRESHOLD_MM,
};
use crate::error::{PipelineError, PipelineResult};
use crate::subject::Subject;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    project_dir: PathBuf,
    reorient_threshold_mm: f64,
    mni_origin_mm: [f64; 3],
}

impl CoreConfig {
    /// Create a new `CoreConfig` rooted at an existing project directory.
    pub fn new(project_dir: PathBuf) -> PipelineResult<Self> {
        if !project_dir.is_dir() {
            return Err(PipelineError::InvalidInput(format!(
                "project directory does not exist: {}",
                project_dir.display()
            )));
        }

        Ok(Self {
            project_dir,
            reorient_threshold_mm: REORIENT_THRESHOLD_MM,
            mni_origin_mm: MNI_ORIGIN_MM,
        })
    }

    /// Override the reorientation threshold (mm).
    pub fn with_reorient_threshold_mm(mut self, threshold_mm: f64) -> Self {
        self.reorient_threshold_mm = threshold_mm;
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn reorient_threshold_mm(&self) -> f64 {
        self.reorient_threshold_mm
    }

    pub fn mni_origin_mm(&self) -> [f64; 3] {
        self.mni_origin_mm
    }

    /// `<project>/data/imaging`
    pub fn imaging_dir(&self) -> PathBuf {
        self.project_dir.join(DATA_DIR_NAME).join(IMAGING_DIR_NAME)
    }

    /// `<project>/data/imaging/BIDS`
    pub fn bids_root(&self) -> PathBuf {
        self.imaging_dir().join(BIDS_DIR_NAME)
    }

    /// `<bids_root>/sub-<label>`
    pub fn bids_subject_dir(&self, subject: &Subject) -> PathBuf {
        self.bids_root().join(subject.bids_label())
    }

    /// `<project>/data/imaging/participants/<pid>/visit<V>/session<S>`
    pub fn raw_session_dir(&self, subject: &Subject) -> PathBuf {
        self.imaging_dir()
            .join(PARTICIPANTS_DIR_NAME)
            .join(subject.participant())
            .join(format!("visit{}", subject.visit()))
            .join(format!("session{}", subject.session()))
    }

    /// `<raw_session>/anatomical`
    pub fn anatomical_source_dir(&self, subject: &Subject) -> PathBuf {
        self.raw_session_dir(subject).join(ANATOMICAL_DIR_NAME)
    }

    /// `<raw_session>/fmri`
    pub fn fmri_source_dir(&self, subject: &Subject) -> PathBuf {
        self.raw_session_dir(subject).join(FMRI_DIR_NAME)
    }

    /// `<raw_session>/fmri/<task>/<pipeline>`, the destination for collected
    /// functional derivatives.
    pub fn task_output_dir(&self, subject: &Subject, task: &str, pipeline: &str) -> PathBuf {
        self.fmri_source_dir(subject).join(task).join(pipeline)
    }

    /// `<raw_session>/anatomical/preprocessed`, the destination for collected
    /// anatomical derivatives.
    pub fn anatomical_output_dir(&self, subject: &Subject) -> PathBuf {
        self.anatomical_source_dir(subject)
            .join(PREPROCESSED_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_subject() -> Subject {
        Subject::new("7014", 1, 1).unwrap()
    }

    #[test]
    fn test_missing_project_dir_rejected() {
        let err = CoreConfig::new(PathBuf::from("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_path_accessors() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::new(temp_dir.path().to_path_buf()).unwrap();
        let subject = test_subject();

        let base = temp_dir.path().join("data/imaging");
        assert_eq!(cfg.bids_root(), base.join("BIDS"));
        assert_eq!(cfg.bids_subject_dir(&subject), base.join("BIDS/sub-701411"));
        assert_eq!(
            cfg.raw_session_dir(&subject),
            base.join("participants/7014/visit1/session1")
        );
        assert_eq!(
            cfg.task_output_dir(&subject, "rest", "fmriprep"),
            base.join("participants/7014/visit1/session1/fmri/rest/fmriprep")
        );
        assert_eq!(
            cfg.anatomical_output_dir(&subject),
            base.join("participants/7014/visit1/session1/anatomical/preprocessed")
        );
    }
}
