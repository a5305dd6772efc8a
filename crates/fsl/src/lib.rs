//! Typed wrappers around the FSL command-line toolkit.
//!
//! bidsprep never reimplements image processing; reorientation, header
//! inspection and smoothing are delegated to the externally installed FSL
//! tools (`fslval`, `fslreorient2std`, `fslmaths`). This crate owns the
//! subprocess plumbing: tool discovery, argument assembly, exit-status
//! checking and output parsing.
//!
//! ## Tool discovery
//!
//! [`Fsl::discover`] prefers `$FSLDIR/bin` when the environment variable is
//! set and points at a directory, and otherwise relies on `PATH` lookup.
//! Tests and embedders can pin a directory with [`Fsl::with_bin_dir`].

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Errors raised while invoking FSL tools.
#[derive(Debug, thiserror::Error)]
pub enum FslError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    CommandFailed {
        tool: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("unexpected {tool} output: {output:?}")]
    MalformedOutput { tool: &'static str, output: String },
}

pub type FslResult<T> = Result<T, FslError>;

/// Handle to an FSL installation.
#[derive(Clone, Debug, Default)]
pub struct Fsl {
    bin_dir: Option<PathBuf>,
}

impl Fsl {
    /// Locate FSL via `$FSLDIR/bin`, falling back to `PATH` lookup.
    pub fn discover() -> Self {
        let bin_dir = std::env::var_os("FSLDIR")
            .map(|dir| PathBuf::from(dir).join("bin"))
            .filter(|dir| dir.is_dir());
        Self { bin_dir }
    }

    /// Use a fixed directory containing the FSL binaries.
    pub fn with_bin_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: Some(dir.into()),
        }
    }

    fn command(&self, tool: &'static str) -> Command {
        match &self.bin_dir {
            Some(dir) => Command::new(dir.join(tool)),
            None => Command::new(tool),
        }
    }

    fn run(&self, tool: &'static str, cmd: &mut Command) -> FslResult<String> {
        debug!(?cmd, "invoking FSL tool");
        let output = cmd
            .output()
            .map_err(|source| FslError::Launch { tool, source })?;

        if !output.status.success() {
            return Err(FslError::CommandFailed {
                tool,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Read a single header field with `fslval`.
    ///
    /// The returned string is trimmed but otherwise unparsed; matrix rows
    /// come back whitespace-separated (see [`Fsl::sto_xyz_row`]).
    pub fn fslval(&self, image: &Path, key: &str) -> FslResult<String> {
        let mut cmd = self.command("fslval");
        cmd.arg(image).arg(key);
        Ok(self.run("fslval", &mut cmd)?.trim().to_string())
    }

    /// Read one row (1-based, as fslval counts them) of the `sto_xyz`
    /// scanner-to-standard transform.
    pub fn sto_xyz_row(&self, image: &Path, row: usize) -> FslResult<[f64; 4]> {
        let key = format!("sto_xyz:{row}");
        let raw = self.fslval(image, &key)?;
        parse_matrix_row(&raw).ok_or(FslError::MalformedOutput {
            tool: "fslval",
            output: raw,
        })
    }

    /// Reorient an image to match the MNI template orientation
    /// (`fslreorient2std <src> <dest>`).
    pub fn reorient2std(&self, src: &Path, dest: &Path) -> FslResult<()> {
        let mut cmd = self.command("fslreorient2std");
        cmd.arg(src).arg(dest);
        self.run("fslreorient2std", &mut cmd).map(drop)
    }

    /// Gaussian-smooth an image (`fslmaths <src> -s <sigma> <dest>`).
    ///
    /// `sigma` is in mm; FWHM-to-sigma conversion is the caller's concern.
    pub fn smooth(&self, src: &Path, sigma: f64, dest: &Path) -> FslResult<()> {
        let mut cmd = self.command("fslmaths");
        cmd.arg(src).arg("-s").arg(format!("{sigma}")).arg(dest);
        self.run("fslmaths", &mut cmd).map(drop)
    }
}

/// Parse a whitespace-separated fslval matrix row into four floats.
fn parse_matrix_row(raw: &str) -> Option<[f64; 4]> {
    let mut values = raw.split_whitespace().map(str::parse::<f64>);
    let row = [
        values.next()?.ok()?,
        values.next()?.ok()?,
        values.next()?.ok()?,
        values.next()?.ok()?,
    ];
    if values.next().is_some() {
        return None;
    }
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matrix_row() {
        // fslval pads its output with a trailing space.
        let row = parse_matrix_row("-3.000000 0.000000 0.000000 90.000000 ").unwrap();
        assert_eq!(row, [-3.0, 0.0, 0.0, 90.0]);
    }

    #[test]
    fn test_parse_matrix_row_rejects_short_rows() {
        assert!(parse_matrix_row("1.0 2.0 3.0").is_none());
    }

    #[test]
    fn test_parse_matrix_row_rejects_extra_tokens() {
        assert!(parse_matrix_row("1.0 2.0 3.0 4.0 5.0").is_none());
    }

    #[test]
    fn test_parse_matrix_row_rejects_garbage() {
        assert!(parse_matrix_row("one two three four").is_none());
    }

    #[test]
    fn test_missing_binary_is_a_launch_error() {
        let fsl = Fsl::with_bin_dir("/nonexistent/fsl/bin");
        let err = fsl
            .fslval(Path::new("image.nii.gz"), "sto_xyz:1")
            .unwrap_err();
        assert!(matches!(err, FslError::Launch { tool: "fslval", .. }));
    }
}
