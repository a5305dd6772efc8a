//! Spatial smoothing of preprocessed functional images.
//!
//! Smoothing itself is FSL's job (`fslmaths -s`); this module selects the
//! candidate files under a subject's `fmri/` tree, converts the requested
//! FWHM to a Gaussian sigma and names the outputs. Already-smoothed outputs
//! are never smoothed again.

use crate::config::CoreConfig;
use crate::constants::FWHM_TO_SIGMA;
use crate::error::{PipelineError, PipelineResult};
use crate::subject::Subject;
use bidsprep_fsl::Fsl;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Tag inserted into smoothed output filenames.
pub const SMOOTHED_TAG: &str = "_smoothed_";

/// Smoothing service bound to an FSL installation.
pub struct Smoother {
    cfg: Arc<CoreConfig>,
    fsl: Fsl,
}

impl Smoother {
    pub fn new(cfg: Arc<CoreConfig>, fsl: Fsl) -> Self {
        Self { cfg, fsl }
    }

    /// Smooth every collected image under the subject's `fmri/` tree with
    /// the given FWHM (mm). Returns the written output paths.
    pub fn smooth_session(&self, subject: &Subject, fwhm: f64) -> PipelineResult<Vec<PathBuf>> {
        if !(fwhm > 0.0) {
            return Err(PipelineError::InvalidInput(format!(
                "smoothing FWHM must be positive, got {fwhm}"
            )));
        }

        let root = self.cfg.fmri_source_dir(subject);
        if !root.is_dir() {
            info!(subject = %subject, dir = %root.display(), "no fmri folder, nothing to smooth");
            return Ok(Vec::new());
        }

        let sigma = fwhm / FWHM_TO_SIGMA;
        let mut outputs = Vec::new();
        for source in collect_candidates(&root)? {
            let dest = smoothed_name(&source, fwhm);
            debug!(src = %source.display(), dest = %dest.display(), sigma, "smoothing");
            self.fsl.smooth(&source, sigma, &dest)?;
            outputs.push(dest);
        }

        info!(subject = %subject, fwhm, count = outputs.len(), "smoothing finished");
        Ok(outputs)
    }
}

/// Every `.nii.gz` under `root` that is not itself a smoothing output,
/// deduplicated and in deterministic order.
pub(crate) fn collect_candidates(root: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut candidates = BTreeSet::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| PipelineError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.ends_with(".nii.gz") && !name.contains(SMOOTHED_TAG) {
            candidates.insert(entry.into_path());
        }
    }
    Ok(candidates.into_iter().collect())
}

/// `I_preproc.nii.gz` + FWHM 6 -> `I_preproc_smoothed_6.nii.gz`.
pub(crate) fn smoothed_name(path: &Path, fwhm: f64) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name);

    let fwhm_label = if fwhm.fract() == 0.0 {
        format!("{}", fwhm as i64)
    } else {
        format!("{fwhm}")
    };
    path.with_file_name(format!("{stem}{SMOOTHED_TAG}{fwhm_label}.nii.gz"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_smoothed_name() {
        assert_eq!(
            smoothed_name(Path::new("/x/rest/fmriprep/I_preproc.nii.gz"), 6.0),
            Path::new("/x/rest/fmriprep/I_preproc_smoothed_6.nii.gz")
        );
        assert_eq!(
            smoothed_name(Path::new("/x/a.nii"), 4.5),
            Path::new("/x/a_smoothed_4.5.nii.gz")
        );
    }

    #[test]
    fn test_collect_candidates_skips_smoothed_outputs() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let task = temp_dir.path().join("rest/fmriprep");
        fs::create_dir_all(&task).unwrap();
        fs::write(task.join("I_preproc.nii.gz"), b"x").unwrap();
        fs::write(task.join("brainmask.nii.gz"), b"x").unwrap();
        fs::write(task.join("I_preproc_smoothed_6.nii.gz"), b"x").unwrap();
        fs::write(task.join("notes.txt"), b"x").unwrap();

        let candidates = collect_candidates(temp_dir.path()).unwrap();
        // Byte-wise path ordering puts `I` (0x49) before `b` (0x62).
        assert_eq!(
            candidates,
            vec![task.join("I_preproc.nii.gz"), task.join("brainmask.nii.gz")]
        );
    }

    #[test]
    fn test_non_positive_fwhm_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = Arc::new(CoreConfig::new(temp_dir.path().to_path_buf()).unwrap());
        let smoother = Smoother::new(cfg, Fsl::with_bin_dir("/nonexistent"));
        let subject = Subject::new("7014", 1, 1).unwrap();

        assert!(smoother.smooth_session(&subject, 0.0).is_err());
        assert!(smoother.smooth_session(&subject, -3.0).is_err());
    }
}
