//! Raw acquisition to BIDS conversion.
//!
//! [`BidsConverter::convert`] turns one subject's raw session into BIDS:
//!
//! - the anatomical image is picked from a fixed candidate cascade and copied
//!   to `anat/sub-<label>_T1w.nii.gz`;
//! - each task under `fmri/` with an `unnormalized/` acquisition is copied to
//!   `func/sub-<label>_task-<task>_bold.{json,nii.gz}`, the sidecar's
//!   `RepetitionTime` is stamped into the image header, and the run's
//!   orientation is checked against the MNI origin (FSL);
//! - a provenance manifest of every copy is written into the subject dir.
//!
//! Missing sources are skips, not errors: a session without an anatomical
//! folder or without a sidecar is logged and surfaced in the
//! [`ConversionReport`].

use crate::config::CoreConfig;
use crate::constants::{PREPROCESSED_DIR_NAME, T1W_CANDIDATES, UNNORMALIZED_DIR_NAME};
use crate::error::{PipelineError, PipelineResult};
use crate::orient::{OrientationCheck, OrientationOutcome};
use crate::paths::bids::BidsName;
use crate::paths::project::{AnatDir, FuncDir, ProvenanceFile};
use crate::provenance::ConversionManifest;
use crate::subject::Subject;
use crate::{nifti_meta, sidecar};
use bidsprep_fsl::Fsl;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What one conversion produced.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Destination of the anatomical image, when one was found.
    pub anatomical: Option<PathBuf>,
    /// One entry per imported functional run.
    pub functional_runs: Vec<FunctionalRun>,
}

/// One imported functional run.
#[derive(Clone, Debug, Serialize)]
pub struct FunctionalRun {
    /// Task name, or the explicit run name for named-run conversions.
    pub name: String,
    pub bold: PathBuf,
    pub sidecar: Option<PathBuf>,
    pub repetition_time: Option<f64>,
    /// Absent when the orientation check was disabled.
    pub orientation: Option<OrientationOutcome>,
}

/// Conversion service for one project.
pub struct BidsConverter {
    cfg: Arc<CoreConfig>,
    fsl: Option<Fsl>,
}

impl BidsConverter {
    /// Create a converter without orientation checking.
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg, fsl: None }
    }

    /// Enable the FSL-backed orientation check.
    pub fn with_fsl(mut self, fsl: Fsl) -> Self {
        self.fsl = Some(fsl);
        self
    }

    /// Convert one subject's raw session into the BIDS dataset.
    ///
    /// With `run_name = None` every task directory under `fmri/` is
    /// imported; with an explicit run name only
    /// `fmri/<run>/unnormalized` is scanned and the run name is carried
    /// verbatim into the BIDS filename.
    pub fn convert(
        &self,
        subject: &Subject,
        run_name: Option<&str>,
    ) -> PipelineResult<ConversionReport> {
        let subject_dir = self.cfg.bids_subject_dir(subject);
        create_dir_all(&subject_dir.join(AnatDir::NAME))?;
        create_dir_all(&subject_dir.join(FuncDir::NAME))?;

        let mut report = ConversionReport::default();
        let mut manifest = ConversionManifest::new(subject);

        self.copy_anatomical(subject, &mut report, &mut manifest)?;

        match run_name {
            None => self.convert_tasks(subject, &mut report, &mut manifest)?,
            Some(run) => self.convert_named_run(subject, run, &mut report, &mut manifest)?,
        }

        manifest.write(&subject_dir.join(ProvenanceFile::NAME))?;
        Ok(report)
    }

    fn copy_anatomical(
        &self,
        subject: &Subject,
        report: &mut ConversionReport,
        manifest: &mut ConversionManifest,
    ) -> PipelineResult<()> {
        let source_dir = self.cfg.anatomical_source_dir(subject);
        if !source_dir.is_dir() {
            info!(subject = %subject, dir = %source_dir.display(), "no anatomical folder, skipping");
            return Ok(());
        }

        let dest = self
            .cfg
            .bids_subject_dir(subject)
            .join(AnatDir::NAME)
            .join(BidsName::new(&subject.label(), "T1w", "nii.gz").build());

        for candidate in T1W_CANDIDATES {
            let source = source_dir.join(candidate);
            if source.is_file() {
                copy_file(&source, &dest)?;
                manifest.record(&source, &dest);
                info!(subject = %subject, source = candidate, "anatomical copied");
                report.anatomical = Some(dest);
                return Ok(());
            }
        }

        warn!(
            subject = %subject,
            dir = %source_dir.display(),
            "anatomical folder has no recognised T1w candidate"
        );
        Ok(())
    }

    fn convert_tasks(
        &self,
        subject: &Subject,
        report: &mut ConversionReport,
        manifest: &mut ConversionManifest,
    ) -> PipelineResult<()> {
        let fmri_dir = self.cfg.fmri_source_dir(subject);
        if !fmri_dir.is_dir() {
            info!(subject = %subject, dir = %fmri_dir.display(), "no fmri folder, skipping");
            return Ok(());
        }

        let mut tasks = Vec::new();
        let entries = fs::read_dir(&fmri_dir).map_err(|source| PipelineError::FileRead {
            path: fmri_dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| PipelineError::FileRead {
                path: fmri_dir.clone(),
                source,
            })?;
            if entry.path().is_dir() {
                tasks.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        tasks.sort();

        for task in tasks {
            if task == PREPROCESSED_DIR_NAME {
                debug!(subject = %subject, "skipping preprocessed folder");
                continue;
            }
            let unnormalized = fmri_dir.join(&task).join(UNNORMALIZED_DIR_NAME);
            if !unnormalized.is_dir() {
                debug!(subject = %subject, task, "no unnormalized acquisition, skipping");
                continue;
            }

            let file_base = BidsName::new(&subject.label(), "bold", "nii.gz").task(&task);
            self.import_run(subject, &unnormalized, &file_base, &task, report, manifest)?;
        }
        Ok(())
    }

    fn convert_named_run(
        &self,
        subject: &Subject,
        run_name: &str,
        report: &mut ConversionReport,
        manifest: &mut ConversionManifest,
    ) -> PipelineResult<()> {
        let unnormalized = self
            .cfg
            .fmri_source_dir(subject)
            .join(run_name)
            .join(UNNORMALIZED_DIR_NAME);
        if !unnormalized.is_dir() {
            warn!(subject = %subject, run = run_name, "named run has no unnormalized acquisition");
            return Ok(());
        }

        let file_base = BidsName::new(&subject.label(), "bold", "nii.gz").literal(run_name);
        self.import_run(subject, &unnormalized, &file_base, run_name, report, manifest)
    }

    /// Import one acquisition directory: sidecar first (for the repetition
    /// time), then the image, then the orientation check.
    fn import_run(
        &self,
        subject: &Subject,
        source_dir: &Path,
        file_base: &BidsName,
        run_label: &str,
        report: &mut ConversionReport,
        manifest: &mut ConversionManifest,
    ) -> PipelineResult<()> {
        let func_dir = self.cfg.bids_subject_dir(subject).join(FuncDir::NAME);

        let mut repetition_time = None;
        let mut sidecar_dest = None;
        for source in files_with_suffix(source_dir, ".json")? {
            match sidecar::read_sidecar(&source) {
                Ok(parsed) => repetition_time = parsed.repetition_time,
                Err(err) => warn!(sidecar = %source.display(), %err, "unreadable sidecar"),
            }
            let dest = func_dir.join(file_base.clone().extension("json").build());
            copy_file(&source, &dest)?;
            manifest.record(&source, &dest);
            sidecar_dest = Some(dest);
        }

        let mut bold_dest = None;
        for source in files_with_suffix(source_dir, ".nii.gz")? {
            let dest = func_dir.join(file_base.build());
            copy_file(&source, &dest)?;
            manifest.record(&source, &dest);

            match repetition_time {
                Some(tr) => nifti_meta::set_repetition_time(&dest, tr)?,
                None => warn!(
                    bold = %dest.display(),
                    "no RepetitionTime sidecar, header left as acquired"
                ),
            }
            bold_dest = Some(dest);
        }

        let Some(bold) = bold_dest else {
            warn!(subject = %subject, run = run_label, "acquisition directory has no .nii.gz");
            return Ok(());
        };

        let orientation = match &self.fsl {
            Some(fsl) => Some(OrientationCheck::new(fsl, &self.cfg).check_and_reorient(&bold)?),
            None => None,
        };
        if orientation == Some(OrientationOutcome::Reoriented) {
            manifest.record(&bold, &bold);
        }

        report.functional_runs.push(FunctionalRun {
            name: run_label.to_string(),
            bold,
            sidecar: sidecar_dest,
            repetition_time,
            orientation,
        });
        Ok(())
    }
}

/// Files directly below `dir` (recursively) whose name ends in `suffix`,
/// in deterministic order.
fn files_with_suffix(dir: &Path, suffix: &str) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|source| PipelineError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(suffix)
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

pub(crate) fn copy_file(src: &Path, dest: &Path) -> PipelineResult<u64> {
    debug!(src = %src.display(), dest = %dest.display(), "copying");
    fs::copy(src, dest).map_err(|source| PipelineError::FileCopy {
        src: src.to_path_buf(),
        dest: dest.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use nifti::writer::WriterOptions;
    use tempfile::TempDir;

    fn test_subject() -> Subject {
        Subject::new("7014", 1, 1).unwrap()
    }

    fn write_test_volume(path: &Path) {
        let volume = Array3::<f32>::zeros((2, 2, 2));
        WriterOptions::new(path)
            .write_nifti(&volume)
            .expect("Failed to write test volume");
    }

    /// Raw session with one anatomical candidate and one task.
    fn seed_raw_session(cfg: &CoreConfig, subject: &Subject) {
        let anatomical = cfg.anatomical_source_dir(subject);
        fs::create_dir_all(&anatomical).unwrap();
        write_test_volume(&anatomical.join("spgr_defaced.nii.gz"));

        let unnormalized = cfg
            .fmri_source_dir(subject)
            .join("rest")
            .join(UNNORMALIZED_DIR_NAME);
        fs::create_dir_all(&unnormalized).unwrap();
        fs::write(
            unnormalized.join("rest_scan.json"),
            r#"{"RepetitionTime": 2.0}"#,
        )
        .unwrap();
        write_test_volume(&unnormalized.join("rest_scan.nii.gz"));

        // A preprocessed folder must be skipped.
        fs::create_dir_all(cfg.fmri_source_dir(subject).join(PREPROCESSED_DIR_NAME)).unwrap();
    }

    #[test]
    fn test_convert_places_files_in_bids_layout() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());
        let subject = test_subject();
        seed_raw_session(&cfg, &subject);

        let report = BidsConverter::new(cfg.clone())
            .convert(&subject, None)
            .unwrap();

        let subject_dir = cfg.bids_subject_dir(&subject);
        assert!(subject_dir.join("anat/sub-701411_T1w.nii.gz").is_file());
        assert!(subject_dir
            .join("func/sub-701411_task-rest_bold.nii.gz")
            .is_file());
        assert!(subject_dir
            .join("func/sub-701411_task-rest_bold.json")
            .is_file());
        assert!(subject_dir.join(ProvenanceFile::NAME).is_file());

        assert!(report.anatomical.is_some());
        assert_eq!(report.functional_runs.len(), 1);
        let run = &report.functional_runs[0];
        assert_eq!(run.name, "rest");
        assert_eq!(run.repetition_time, Some(2.0));
        assert_eq!(run.orientation, None);
    }

    #[test]
    fn test_repetition_time_stamped_into_header() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());
        let subject = test_subject();
        seed_raw_session(&cfg, &subject);

        BidsConverter::new(cfg.clone())
            .convert(&subject, None)
            .unwrap();

        let bold = cfg
            .bids_subject_dir(&subject)
            .join("func/sub-701411_task-rest_bold.nii.gz");
        let tr = nifti_meta::read_repetition_time(&bold).unwrap();
        assert!((tr - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_anatomical_cascade_prefers_earlier_candidates() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());
        let subject = test_subject();

        let anatomical = cfg.anatomical_source_dir(&subject);
        fs::create_dir_all(&anatomical).unwrap();
        fs::write(anatomical.join("spgr.nii.gz"), b"low priority").unwrap();
        fs::write(anatomical.join("T1w.nii.gz"), b"high priority").unwrap();

        BidsConverter::new(cfg.clone())
            .convert(&subject, None)
            .unwrap();

        let dest = cfg
            .bids_subject_dir(&subject)
            .join("anat/sub-701411_T1w.nii.gz");
        assert_eq!(fs::read(dest).unwrap(), b"high priority");
    }

    #[test]
    fn test_missing_anatomical_is_not_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());
        let subject = test_subject();

        let report = BidsConverter::new(cfg).convert(&subject, None).unwrap();
        assert!(report.anatomical.is_none());
        assert!(report.functional_runs.is_empty());
    }

    #[test]
    fn test_named_run_uses_literal_segment() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());
        let subject = test_subject();

        let unnormalized = cfg
            .fmri_source_dir(&subject)
            .join("gonogo2")
            .join(UNNORMALIZED_DIR_NAME);
        fs::create_dir_all(&unnormalized).unwrap();
        fs::write(
            unnormalized.join("scan.json"),
            r#"{"RepetitionTime": 1.5}"#,
        )
        .unwrap();
        write_test_volume(&unnormalized.join("scan.nii.gz"));

        let report = BidsConverter::new(cfg.clone())
            .convert(&subject, Some("gonogo2"))
            .unwrap();

        assert!(cfg
            .bids_subject_dir(&subject)
            .join("func/sub-701411_gonogo2_bold.nii.gz")
            .is_file());
        assert_eq!(report.functional_runs[0].repetition_time, Some(1.5));
    }
}
