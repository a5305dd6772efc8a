//! Constants used throughout the bidsprep core crate.
//!
//! This module contains the path and filename constants of the project's raw
//! imaging layout, plus the numeric constants governing orientation checks
//! and smoothing.

/// Directory name for project data.
pub const DATA_DIR_NAME: &str = "data";

/// Directory name for imaging data under `data/`.
pub const IMAGING_DIR_NAME: &str = "imaging";

/// Directory name for per-participant raw acquisitions.
pub const PARTICIPANTS_DIR_NAME: &str = "participants";

/// Directory name for the BIDS dataset under `data/imaging/`.
pub const BIDS_DIR_NAME: &str = "BIDS";

/// Directory name for raw anatomical images inside a session.
pub const ANATOMICAL_DIR_NAME: &str = "anatomical";

/// Directory name for raw functional runs inside a session.
pub const FMRI_DIR_NAME: &str = "fmri";

/// Subdirectory of a task holding the unnormalized acquisition.
pub const UNNORMALIZED_DIR_NAME: &str = "unnormalized";

/// Directory name for preprocessed outputs (both as a task-dir sentinel to
/// skip during conversion and as the anatomical output folder).
pub const PREPROCESSED_DIR_NAME: &str = "preprocessed";

/// Directory name of the fMRIPrep output tree inside a derivatives dir.
pub const FMRIPREP_DIR_NAME: &str = "fmriprep";

/// Anatomical filename candidates, in priority order. The first one found in
/// the session's `anatomical/` folder becomes the subject's `T1w` image.
pub const T1W_CANDIDATES: [&str; 10] = [
    "T1w.nii.gz",
    "spgr_defaced.nii.gz",
    "spgr_1_defaced.nii.gz",
    "spgr_2_defaced.nii.gz",
    "spgr_watershed.nii.gz",
    "watershed_spgr.nii.gz",
    "watershed_spgr_1.nii.gz",
    "watershed_spgr_2.nii.gz",
    "spgr.nii.gz",
    "wspgr_defaced.nii.gz",
];

/// Translation column of the MNI template origin, in mm.
pub const MNI_ORIGIN_MM: [f64; 3] = [90.0, -126.0, -72.0];

/// Maximum tolerated deviation from the MNI origin before a functional run
/// is reoriented with `fslreorient2std`.
pub const REORIENT_THRESHOLD_MM: f64 = 25.0;

/// Gaussian FWHM-to-sigma conversion factor, `2 * sqrt(2 * ln 2)`.
pub const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949;
