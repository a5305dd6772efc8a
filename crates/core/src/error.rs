//! Error types for the bidsprep core crate.

use std::path::PathBuf;

/// Errors raised by the conversion, collection, smoothing and sink services.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to create directory {path}: {source}")]
    DirCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to copy {src} to {dest}: {source}")]
    FileCopy {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to rename {src} to {dest}: {source}")]
    FileRename {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    FileRemove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to parse sidecar {path}: {source}")]
    SidecarParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize sidecar: {0}")]
    SidecarSerialization(#[source] serde_json::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(#[source] serde_yaml::Error),
    #[error("failed to parse YAML {path}: {source}")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to read NIfTI {path}: {source}")]
    NiftiRead {
        path: PathBuf,
        #[source]
        source: nifti::error::NiftiError,
    },
    #[error("failed to write NIfTI {path}: {source}")]
    NiftiWrite {
        path: PathBuf,
        #[source]
        source: nifti::error::NiftiError,
    },
    #[error("FSL invocation failed: {0}")]
    Fsl(#[from] bidsprep_fsl::FslError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
