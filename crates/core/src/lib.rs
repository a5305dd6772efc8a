//! # bidsprep core
//!
//! Domain logic for the bidsprep preprocessing orchestrator:
//! - Conversion of raw per-subject acquisitions into a BIDS layout
//! - Relocation of fMRIPrep derivatives back into the project tree
//! - Spatial smoothing of preprocessed runs (delegated to FSL)
//! - A sequential derivatives sink with canonical BIDS naming
//!
//! **No CLI concerns**: argument parsing and process exit codes belong in the
//! `bidsprep` binary. This crate exposes services that are handed a resolved
//! [`CoreConfig`] and typed [`Subject`] identifiers.

pub mod collect;
pub mod config;
pub mod constants;
pub mod convert;
pub mod derivatives;
pub mod error;
pub mod nifti_meta;
pub mod orient;
pub mod paths;
pub mod provenance;
pub mod sidecar;
pub mod smooth;
pub mod subject;

pub use collect::DerivativesCollector;
pub use config::CoreConfig;
pub use convert::BidsConverter;
pub use derivatives::DerivativesSink;
pub use error::{PipelineError, PipelineResult};
pub use smooth::Smoother;
pub use subject::Subject;
