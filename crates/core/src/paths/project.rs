//! Fixed file and directory names used across the project tree.

/// BIDS anatomical subdirectory (also fMRIPrep's output subdirectory).
pub struct AnatDir;

impl AnatDir {
    pub const NAME: &'static str = "anat";
}

/// BIDS functional subdirectory (also fMRIPrep's output subdirectory).
pub struct FuncDir;

impl FuncDir {
    pub const NAME: &'static str = "func";
}

/// Per-subject conversion provenance manifest, written into the BIDS
/// subject directory.
pub struct ProvenanceFile;

impl ProvenanceFile {
    pub const NAME: &'static str = ".provenance.yaml";
}

/// Collected functional brain mask filename.
pub struct BrainMaskFile;

impl BrainMaskFile {
    pub const NAME: &'static str = "brainmask.nii.gz";
}

/// Collected preprocessed functional series filename.
pub struct PreprocFile;

impl PreprocFile {
    pub const NAME: &'static str = "I_preproc.nii.gz";
}

/// Collected anatomical brain mask filename.
pub struct T1wBrainMaskFile;

impl T1wBrainMaskFile {
    pub const NAME: &'static str = "T1w_brainmask.nii.gz";
}

/// Collected preprocessed anatomical filename.
pub struct T1wPreprocFile;

impl T1wPreprocFile {
    pub const NAME: &'static str = "T1w_preproc.nii.gz";
}
