//! On-disk name definitions for bidsprep artefacts.
//!
//! This module defines filenames and relative paths for BIDS datasets and
//! collected derivatives. It contains **no I/O logic** - only typed name
//! construction and parsing.

pub mod bids;
pub mod project;
