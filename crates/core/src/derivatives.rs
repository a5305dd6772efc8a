//! Derivatives sink.
//!
//! The preprocessing tool chain produces one set of products per BOLD run
//! (preprocessed series, reference volumes, brain masks, segmentations,
//! confound regressors, surface samplings, AROMA artefacts). This module
//! writes them into `<output_dir>/fmriprep/sub-<label>/func/` under canonical
//! BIDS derivative names, with JSON sidecars carrying run metadata and raw
//! source references.
//!
//! The sink is a sequential plan/execute pair: [`DerivativesSink::plan`]
//! computes every destination without touching the output tree, and
//! [`DerivativesSink::execute`] performs the copies. There is no graph
//! engine, no scheduling and no dependency resolution here.

use crate::constants::FMRIPREP_DIR_NAME;
use crate::convert::copy_file;
use crate::error::{PipelineError, PipelineResult};
use crate::paths::bids::{self, BidsName};
use crate::paths::project::FuncDir;
use crate::sidecar::{self, BoldSidecar};
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// A requested output space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSpec {
    pub name: String,
    /// Internal space used only as an intermediate; never sunk.
    #[serde(default)]
    pub no_output: bool,
}

/// Which outputs the sink should write.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkOptions {
    /// Sink the native-space (BOLD-grid) products.
    pub native: bool,
    /// Sink the products resampled to the subject's T1w space.
    pub t1w: bool,
    /// Volumetric standard spaces, e.g. `MNI152NLin2009cAsym`.
    pub volume_spaces: Vec<SpaceSpec>,
    /// FreeSurfer surface spaces, e.g. `fsaverage5`, `fsLR`.
    pub surface_spaces: Vec<String>,
    /// Whether FreeSurfer anatomical processing ran (enables segmentations
    /// and surface sampling).
    pub freesurfer: bool,
    /// Whether ICA-AROMA denoising ran.
    pub aroma: bool,
    /// Whether CIFTI output was requested.
    pub cifti: bool,
    /// Density of the fsLR surface mesh (`32k` or `59k`).
    pub fslr_density: Option<String>,
}

/// Per-standard-space product paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StdProducts {
    pub bold: Option<PathBuf>,
    pub boldref: Option<PathBuf>,
    pub mask: Option<PathBuf>,
    pub aseg: Option<PathBuf>,
    pub aparc: Option<PathBuf>,
}

/// ICA-AROMA product paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AromaProducts {
    pub noise_ics: Option<PathBuf>,
    pub melodic_mix: Option<PathBuf>,
    pub nonaggr_denoised: Option<PathBuf>,
}

/// CIFTI product paths and naming inputs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CiftiProducts {
    pub bold: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
    pub variant: Option<String>,
    pub density: Option<String>,
}

/// Every product of one preprocessed BOLD run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoldDerivatives {
    /// The source BOLD file in the BIDS dataset; its entities (`sub`,
    /// `task`) seed every destination name.
    pub source_file: PathBuf,

    pub confounds: Option<PathBuf>,
    /// JSON file of per-regressor metadata, written as the confounds sidecar.
    pub confounds_metadata: Option<PathBuf>,

    pub bold_native: Option<PathBuf>,
    pub bold_native_ref: Option<PathBuf>,
    pub bold_mask_native: Option<PathBuf>,

    pub bold_t1: Option<PathBuf>,
    pub bold_t1_ref: Option<PathBuf>,
    pub bold_mask_t1: Option<PathBuf>,
    pub aseg_t1: Option<PathBuf>,
    pub aparc_t1: Option<PathBuf>,

    /// Keyed by standard-space name.
    pub std: BTreeMap<String, StdProducts>,

    /// GIFTI surface samplings named `[lr]h.<space>.gii`.
    pub surfaces: Vec<PathBuf>,

    pub aroma: AromaProducts,
    pub cifti: CiftiProducts,
}

/// Run metadata carried into the image sidecars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetadata {
    pub repetition_time: Option<f64>,
    pub task_name: Option<String>,
}

/// Everything the sink needs for one run; loadable from YAML.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkManifest {
    pub options: SinkOptions,
    pub metadata: RunMetadata,
    pub products: BoldDerivatives,
}

impl SinkManifest {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| PipelineError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| PipelineError::YamlParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// One planned copy.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkItem {
    pub source: PathBuf,
    /// Destination relative to the sink's output directory.
    pub dest_rel: PathBuf,
    /// Sidecar written next to the destination (same stem, `.json`).
    pub sidecar: Option<BoldSidecar>,
    /// Gzip plain `.nii` sources on the way in.
    pub compress: bool,
}

/// Sink bound to a BIDS dataset and an output directory.
pub struct DerivativesSink {
    bids_root: PathBuf,
    output_dir: PathBuf,
}

impl DerivativesSink {
    pub fn new(bids_root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            bids_root: bids_root.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Compute every destination for the manifest's products.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidInput` when the source file carries no
    /// `sub` entity; requested products that are simply absent are skipped
    /// with a warning.
    pub fn plan(&self, manifest: &SinkManifest) -> PipelineResult<Vec<SinkItem>> {
        let options = &manifest.options;
        let products = &manifest.products;

        let source_name = products
            .source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let subject = bids::entity(&source_name, "sub").ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "source file has no sub- entity: {source_name:?}"
            ))
        })?;
        let task = bids::entity(&source_name, "task");

        let base_dir = PathBuf::from(FMRIPREP_DIR_NAME)
            .join(format!("sub-{subject}"))
            .join(FuncDir::NAME);

        let name = |suffix: &str, ext: &str| {
            let mut name = BidsName::new(&subject, suffix, ext);
            if let Some(task) = &task {
                name = name.task(task);
            }
            name
        };

        let bold_sidecar = BoldSidecar {
            repetition_time: manifest.metadata.repetition_time,
            task_name: manifest.metadata.task_name.clone(),
            skull_stripped: Some(false),
            ..Default::default()
        };
        let mask_sidecar = BoldSidecar {
            raw_sources: vec![self.bids_relative(&products.source_file)],
            ..Default::default()
        };

        let mut items = Vec::new();
        let mut push = |source: &Option<PathBuf>,
                        dest_name: String,
                        sidecar: Option<BoldSidecar>,
                        compress: bool| {
            if let Some(source) = source {
                items.push(SinkItem {
                    source: source.clone(),
                    dest_rel: base_dir.join(dest_name),
                    sidecar,
                    compress,
                });
            }
        };

        // Confounds are sunk unconditionally.
        let confounds_sidecar = match &products.confounds_metadata {
            Some(path) => Some(load_metadata_sidecar(path)?),
            None => None,
        };
        push(
            &products.confounds,
            name("regressors", "tsv").desc("confounds").build(),
            confounds_sidecar,
            false,
        );

        if options.native {
            push(
                &products.bold_native,
                name("bold", "nii.gz").desc("preproc").build(),
                Some(bold_sidecar.clone()),
                true,
            );
            push(
                &products.bold_native_ref,
                name("boldref", "nii.gz").build(),
                None,
                true,
            );
            push(
                &products.bold_mask_native,
                name("mask", "nii.gz").desc("brain").build(),
                Some(mask_sidecar.clone()),
                true,
            );
        }

        if options.t1w {
            push(
                &products.bold_t1,
                name("bold", "nii.gz").space("T1w").desc("preproc").build(),
                Some(bold_sidecar.clone()),
                true,
            );
            push(
                &products.bold_t1_ref,
                name("boldref", "nii.gz").space("T1w").build(),
                None,
                true,
            );
            push(
                &products.bold_mask_t1,
                name("mask", "nii.gz").space("T1w").desc("brain").build(),
                Some(mask_sidecar.clone()),
                true,
            );
            if options.freesurfer {
                push(
                    &products.aseg_t1,
                    name("dseg", "nii.gz").space("T1w").desc("aseg").build(),
                    None,
                    false,
                );
                push(
                    &products.aparc_t1,
                    name("dseg", "nii.gz").space("T1w").desc("aparcaseg").build(),
                    None,
                    false,
                );
            }
        }

        for space in options.volume_spaces.iter().filter(|s| !s.no_output) {
            let Some(std_products) = products.std.get(&space.name) else {
                warn!(space = space.name, "no products for requested space");
                continue;
            };
            push(
                &std_products.bold,
                name("bold", "nii.gz")
                    .space(&space.name)
                    .desc("preproc")
                    .build(),
                Some(bold_sidecar.clone()),
                true,
            );
            push(
                &std_products.boldref,
                name("boldref", "nii.gz").space(&space.name).build(),
                None,
                false,
            );
            push(
                &std_products.mask,
                name("mask", "nii.gz").space(&space.name).desc("brain").build(),
                Some(mask_sidecar.clone()),
                false,
            );
            if options.freesurfer {
                push(
                    &std_products.aseg,
                    name("dseg", "nii.gz").space(&space.name).desc("aseg").build(),
                    None,
                    false,
                );
                push(
                    &std_products.aparc,
                    name("dseg", "nii.gz")
                        .space(&space.name)
                        .desc("aparcaseg")
                        .build(),
                    None,
                    false,
                );
            }
        }

        if options.freesurfer && !options.surface_spaces.is_empty() {
            for surface in &products.surfaces {
                let surf_name = surface
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let requested = options
                    .surface_spaces
                    .iter()
                    .any(|space| surf_name.contains(&format!("{space}.")));
                if !requested {
                    continue;
                }

                let Some((hemi, space)) = parse_surface_name(&surf_name) else {
                    warn!(file = %surface.display(), "unrecognised surface name, skipping");
                    continue;
                };

                let mut dest = name("bold", "func.gii").space(&space);
                if space.contains("fsLR") {
                    if let Some(density) = &options.fslr_density {
                        dest = dest.density(density);
                    }
                }
                push(
                    &Some(surface.clone()),
                    dest.hemi(&hemi).build(),
                    None,
                    false,
                );
            }
        }

        if options.cifti {
            if let Some(variant) = &products.cifti.variant {
                let mut dest = name("bold", "dtseries.nii").space(variant);
                let mut meta_dest = name("bold", "json").space(variant);
                if let Some(density) = &products.cifti.density {
                    dest = dest.density(density);
                    meta_dest = meta_dest.density(density);
                }
                push(&products.cifti.bold, dest.build(), None, false);
                push(&products.cifti.metadata, meta_dest.build(), None, false);
            } else if products.cifti.bold.is_some() {
                warn!("CIFTI products present but no variant given, skipping");
            }
        }

        if options.aroma {
            push(
                &products.aroma.noise_ics,
                name("AROMAnoiseICs", "csv").build(),
                None,
                false,
            );
            push(
                &products.aroma.melodic_mix,
                name("mixing", "tsv").desc("MELODIC").build(),
                None,
                false,
            );
            push(
                &products.aroma.nonaggr_denoised,
                name("bold", "nii.gz")
                    .space("MNI152NLin6Asym")
                    .desc("smoothAROMAnonaggr")
                    .build(),
                None,
                false,
            );
        }

        Ok(items)
    }

    /// Perform the planned copies. Returns every path written (data files
    /// and sidecars).
    pub fn execute(&self, items: &[SinkItem]) -> PipelineResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        for item in items {
            let dest = self.output_dir.join(&item.dest_rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|source| PipelineError::DirCreation {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let source_name = item
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if item.compress && source_name.ends_with(".nii") {
                gzip_copy(&item.source, &dest)?;
            } else {
                copy_file(&item.source, &dest)?;
            }

            if let Some(sidecar) = &item.sidecar {
                let sidecar_dest = json_sibling(&dest);
                sidecar::write_sidecar(&sidecar_dest, sidecar)?;
                written.push(sidecar_dest);
            }
            written.push(dest);
        }

        info!(count = written.len(), output_dir = %self.output_dir.display(), "sink finished");
        Ok(written)
    }

    /// Path relative to the BIDS root, for `RawSources` references. Files
    /// outside the dataset keep their full path.
    fn bids_relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.bids_root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// `lh.fsaverage5.gii` -> (`L`, `fsaverage5`).
fn parse_surface_name(filename: &str) -> Option<(String, String)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(?P<hemi>[lr])h\.(?P<space>\w+)\.gii$").unwrap());
    let caps = re.captures(filename)?;
    let hemi = if &caps["hemi"] == "l" { "L" } else { "R" };
    Some((hemi.to_string(), caps["space"].to_string()))
}

/// Load a metadata JSON file into a sidecar's extra map.
fn load_metadata_sidecar(path: &Path) -> PipelineResult<BoldSidecar> {
    let raw = fs::read_to_string(path).map_err(|source| PipelineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| PipelineError::SidecarParse {
            path: path.to_path_buf(),
            source,
        })?;
    let extra = match value {
        serde_json::Value::Object(map) => map,
        other => {
            warn!(path = %path.display(), "metadata JSON is not an object");
            let mut map = serde_json::Map::new();
            map.insert("Metadata".to_string(), other);
            map
        }
    };
    Ok(BoldSidecar {
        extra,
        ..Default::default()
    })
}

/// `..._bold.nii.gz` -> `..._bold.json`.
fn json_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.json", bids::stem(&name)))
}

fn gzip_copy(src: &Path, dest: &Path) -> PipelineResult<()> {
    let bytes = fs::read(src).map_err(|source| PipelineError::FileRead {
        path: src.to_path_buf(),
        source,
    })?;
    let file = fs::File::create(dest).map_err(|source| PipelineError::FileWrite {
        path: dest.to_path_buf(),
        source,
    })?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder
        .write_all(&bytes)
        .and_then(|_| encoder.finish().map(drop))
        .map_err(|source| PipelineError::FileWrite {
            path: dest.to_path_buf(),
            source,
        })
}
