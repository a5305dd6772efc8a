//! Relocation of fMRIPrep outputs into the project tree.
//!
//! fMRIPrep writes its derivatives under `<derivatives>/fmriprep/sub-<label>`
//! with BIDS-style names. Analysis code in the project expects fixed names in
//! fixed places instead: `fmri/<task>/<pipeline>/{brainmask,I_preproc}.nii.gz`
//! and `anatomical/preprocessed/T1w_{brainmask,preproc}.nii.gz`. This module
//! performs that mapping.

use crate::config::CoreConfig;
use crate::constants::FMRIPREP_DIR_NAME;
use crate::convert::copy_file;
use crate::error::{PipelineError, PipelineResult};
use crate::paths::bids;
use crate::paths::project::{
    AnatDir, BrainMaskFile, FuncDir, PreprocFile, T1wBrainMaskFile, T1wPreprocFile,
};
use crate::subject::Subject;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

/// What one collection run relocated.
#[derive(Clone, Debug, Default)]
pub struct CollectReport {
    pub functional: Vec<PathBuf>,
    pub anatomical: Vec<PathBuf>,
    /// Derivative files that matched no known product kind.
    pub skipped: Vec<PathBuf>,
}

/// Service relocating fMRIPrep outputs for one project.
pub struct DerivativesCollector {
    cfg: Arc<CoreConfig>,
}

impl DerivativesCollector {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    /// Copy a subject's fMRIPrep outputs into the project tree.
    ///
    /// `derivatives_dir` is the directory fMRIPrep was pointed at (the one
    /// containing `fmriprep/`); `pipeline` names the per-task output folder.
    pub fn collect(
        &self,
        subject: &Subject,
        derivatives_dir: &Path,
        pipeline: &str,
    ) -> PipelineResult<CollectReport> {
        if pipeline.is_empty() {
            return Err(PipelineError::InvalidInput(
                "pipeline label cannot be empty".into(),
            ));
        }

        let subject_out = derivatives_dir
            .join(FMRIPREP_DIR_NAME)
            .join(subject.bids_label());

        let mut report = CollectReport::default();
        self.collect_functional(subject, &subject_out.join(FuncDir::NAME), pipeline, &mut report)?;
        self.collect_anatomical(subject, &subject_out.join(AnatDir::NAME), &mut report)?;

        info!(
            subject = %subject,
            functional = report.functional.len(),
            anatomical = report.anatomical.len(),
            skipped = report.skipped.len(),
            "derivatives collected"
        );
        Ok(report)
    }

    fn collect_functional(
        &self,
        subject: &Subject,
        func_dir: &Path,
        pipeline: &str,
        report: &mut CollectReport,
    ) -> PipelineResult<()> {
        for source in nii_gz_files(func_dir)? {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(task) = bids::entity(&name, "task") else {
                warn!(file = %source.display(), "no task entity in derivative name, skipping");
                report.skipped.push(source);
                continue;
            };

            let Some(dest_name) = functional_product_name(&name) else {
                report.skipped.push(source);
                continue;
            };

            let dest_dir = self.cfg.task_output_dir(subject, &task, pipeline);
            create_dir_all(&dest_dir)?;
            let dest = dest_dir.join(dest_name);
            copy_file(&source, &dest)?;
            report.functional.push(dest);
        }
        Ok(())
    }

    fn collect_anatomical(
        &self,
        subject: &Subject,
        anat_dir: &Path,
        report: &mut CollectReport,
    ) -> PipelineResult<()> {
        for source in nii_gz_files(anat_dir)? {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(dest_name) = anatomical_product_name(&name) else {
                report.skipped.push(source);
                continue;
            };

            let dest_dir = self.cfg.anatomical_output_dir(subject);
            create_dir_all(&dest_dir)?;
            let dest = dest_dir.join(dest_name);
            copy_file(&source, &dest)?;
            report.anatomical.push(dest);
        }
        Ok(())
    }
}

/// Fixed name for a functional derivative, keyed on the fMRIPrep suffix.
fn functional_product_name(filename: &str) -> Option<&'static str> {
    let stem = bids::stem(filename);
    if stem.contains("brainmask") {
        Some(BrainMaskFile::NAME)
    } else if stem.contains("preproc") {
        Some(PreprocFile::NAME)
    } else {
        None
    }
}

/// Fixed name for an anatomical derivative.
fn anatomical_product_name(filename: &str) -> Option<&'static str> {
    let stem = bids::stem(filename);
    if stem.contains("brainmask") {
        Some(T1wBrainMaskFile::NAME)
    } else if stem.contains("preproc") {
        Some(T1wPreprocFile::NAME)
    } else {
        None
    }
}

/// All `.nii.gz` files below `dir`, in deterministic order. A missing
/// directory yields an empty list.
fn nii_gz_files(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|source| PipelineError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(".nii.gz")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn create_dir_all(path: &Path) -> PipelineResult<()> {
    fs::create_dir_all(path).map_err(|source| PipelineError::DirCreation {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_subject() -> Subject {
        Subject::new("7014", 1, 1).unwrap()
    }

    fn seed_fmriprep_output(derivatives: &Path, subject: &Subject) {
        let base = derivatives.join("fmriprep").join(subject.bids_label());
        let func = base.join("func");
        let anat = base.join("anat");
        fs::create_dir_all(&func).unwrap();
        fs::create_dir_all(&anat).unwrap();

        fs::write(func.join("sub-701411_task-rest_bold_preproc.nii.gz"), b"p").unwrap();
        fs::write(
            func.join("sub-701411_task-rest_bold_brainmask.nii.gz"),
            b"m",
        )
        .unwrap();
        fs::write(func.join("sub-701411_task-rest_bold_confounds.nii.gz"), b"c").unwrap();

        fs::write(anat.join("sub-701411_T1w_preproc.nii.gz"), b"tp").unwrap();
        fs::write(anat.join("sub-701411_T1w_brainmask.nii.gz"), b"tm").unwrap();
    }

    #[test]
    fn test_collect_maps_products_into_project_tree() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());
        let subject = test_subject();

        let derivatives = temp_dir.path().join("derivatives");
        seed_fmriprep_output(&derivatives, &subject);

        let report = DerivativesCollector::new(cfg.clone())
            .collect(&subject, &derivatives, "fmriprep")
            .unwrap();

        let task_dir = cfg.task_output_dir(&subject, "rest", "fmriprep");
        assert!(task_dir.join("brainmask.nii.gz").is_file());
        assert!(task_dir.join("I_preproc.nii.gz").is_file());

        let anat_dir = cfg.anatomical_output_dir(&subject);
        assert!(anat_dir.join("T1w_brainmask.nii.gz").is_file());
        assert!(anat_dir.join("T1w_preproc.nii.gz").is_file());

        assert_eq!(report.functional.len(), 2);
        assert_eq!(report.anatomical.len(), 2);
        // The confounds file matches no product kind.
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn test_missing_fmriprep_tree_yields_empty_report() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());

        let report = DerivativesCollector::new(cfg)
            .collect(&test_subject(), &temp_dir.path().join("nowhere"), "fmriprep")
            .unwrap();
        assert!(report.functional.is_empty());
        assert!(report.anatomical.is_empty());
    }

    #[test]
    fn test_empty_pipeline_label_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());

        let err = DerivativesCollector::new(cfg)
            .collect(&test_subject(), temp_dir.path(), "")
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
