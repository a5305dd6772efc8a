//! NIfTI header access.
//!
//! Conversion stamps the sidecar's `RepetitionTime` into the image header
//! (`pixdim[4]`), matching what downstream tools expect of a BIDS BOLD
//! series. The volume is rewritten through the `nifti` crate; voxel data is
//! carried as `f32`.

use crate::error::{PipelineError, PipelineResult};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::path::Path;
use tracing::warn;

/// Read the repetition time (`pixdim[4]`) from a NIfTI header.
pub fn read_repetition_time(path: &Path) -> PipelineResult<f64> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|source| PipelineError::NiftiRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(f64::from(object.header().pixdim[4]))
}

/// Rewrite a NIfTI file with the repetition time stored in `pixdim[4]`,
/// then read it back to confirm the value stuck.
pub fn set_repetition_time(path: &Path, repetition_time: f64) -> PipelineResult<()> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|source| PipelineError::NiftiRead {
            path: path.to_path_buf(),
            source,
        })?;

    let mut header = object.header().clone();
    header.pixdim[4] = repetition_time as f32;

    let volume = object
        .into_volume()
        .into_ndarray::<f32>()
        .map_err(|source| PipelineError::NiftiRead {
            path: path.to_path_buf(),
            source,
        })?;

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&volume)
        .map_err(|source| PipelineError::NiftiWrite {
            path: path.to_path_buf(),
            source,
        })?;

    let stored = read_repetition_time(path)?;
    if (stored - repetition_time).abs() > 1e-4 {
        warn!(
            path = %path.display(),
            expected = repetition_time,
            stored,
            "repetition time did not survive the header rewrite"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tempfile::TempDir;

    fn write_test_volume(path: &Path) {
        let volume = Array3::<f32>::zeros((2, 2, 2));
        WriterOptions::new(path)
            .write_nifti(&volume)
            .expect("Failed to write test volume");
    }

    #[test]
    fn test_set_and_read_repetition_time() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("bold.nii.gz");
        write_test_volume(&path);

        set_repetition_time(&path, 2.5).unwrap();
        let stored = read_repetition_time(&path).unwrap();
        assert!((stored - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_read_missing_file_is_an_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("missing.nii.gz");
        assert!(matches!(
            read_repetition_time(&path),
            Err(PipelineError::NiftiRead { .. })
        ));
    }
}
