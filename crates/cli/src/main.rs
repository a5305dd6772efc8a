use anyhow::Context;
use bidsprep_core::derivatives::SinkManifest;
use bidsprep_core::{
    BidsConverter, CoreConfig, DerivativesCollector, DerivativesSink, Smoother, Subject,
};
use bidsprep_fsl::Fsl;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bidsprep")]
#[command(about = "fMRI preprocessing pipeline orchestration CLI")]
struct Cli {
    /// Project root (the directory containing data/imaging)
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a raw acquisition session into the BIDS tree
    Convert {
        /// Participant identifier
        participant: String,
        /// Visit number
        visit: u32,
        /// Session number within the visit
        session: u32,
        /// Convert a single named run instead of every task folder
        #[arg(long)]
        run: Option<String>,
        /// Skip the FSL orientation check on functional runs
        #[arg(long)]
        no_reorient: bool,
    },
    /// Relocate a subject's fMRIPrep outputs into the project tree
    Collect {
        /// Participant identifier
        participant: String,
        /// Visit number
        visit: u32,
        /// Session number within the visit
        session: u32,
        /// Directory fMRIPrep wrote into (the one containing fmriprep/)
        #[arg(long)]
        derivatives_dir: PathBuf,
        /// Label for the per-task output folder
        #[arg(long, default_value = "fmriprep")]
        pipeline: String,
    },
    /// Smooth collected functional images with a Gaussian kernel
    Smooth {
        /// Participant identifier
        participant: String,
        /// Visit number
        visit: u32,
        /// Session number within the visit
        session: u32,
        /// Kernel full width at half maximum, in mm
        #[arg(long)]
        fwhm: f64,
    },
    /// Write one run's preprocessing products under BIDS derivative names
    Sink {
        /// YAML manifest describing the run's products
        #[arg(long)]
        manifest: PathBuf,
        /// Derivatives output directory
        #[arg(long)]
        output_dir: PathBuf,
        /// BIDS dataset root, for RawSources references
        #[arg(long)]
        bids_root: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bidsprep=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            participant,
            visit,
            session,
            run,
            no_reorient,
        } => {
            let cfg = Arc::new(CoreConfig::new(cli.project_dir)?);
            let subject = Subject::new(&participant, visit, session)?;
            let mut converter = BidsConverter::new(cfg);
            if !no_reorient {
                converter = converter.with_fsl(Fsl::discover());
            }
            let report = converter
                .convert(&subject, run.as_deref())
                .context("conversion failed")?;
            match &report.anatomical {
                Some(path) => println!("Anatomical: {}", path.display()),
                None => println!("Anatomical: none found"),
            }
            for run in &report.functional_runs {
                println!(
                    "Functional run {}: {} (TR {})",
                    run.name,
                    run.bold.display(),
                    run.repetition_time
                        .map(|tr| tr.to_string())
                        .unwrap_or_else(|| "unknown".into())
                );
            }
        }
        Commands::Collect {
            participant,
            visit,
            session,
            derivatives_dir,
            pipeline,
        } => {
            let cfg = Arc::new(CoreConfig::new(cli.project_dir)?);
            let subject = Subject::new(&participant, visit, session)?;
            let report = DerivativesCollector::new(cfg)
                .collect(&subject, &derivatives_dir, &pipeline)
                .context("collection failed")?;
            println!(
                "Collected {} functional and {} anatomical files ({} skipped)",
                report.functional.len(),
                report.anatomical.len(),
                report.skipped.len()
            );
        }
        Commands::Smooth {
            participant,
            visit,
            session,
            fwhm,
        } => {
            let cfg = Arc::new(CoreConfig::new(cli.project_dir)?);
            let subject = Subject::new(&participant, visit, session)?;
            let outputs = Smoother::new(cfg, Fsl::discover())
                .smooth_session(&subject, fwhm)
                .context("smoothing failed")?;
            println!("Smoothed {} images (FWHM {} mm)", outputs.len(), fwhm);
            for path in outputs {
                println!("  {}", path.display());
            }
        }
        Commands::Sink {
            manifest,
            output_dir,
            bids_root,
        } => {
            let manifest = SinkManifest::load(&manifest).context("failed to load manifest")?;
            let sink = DerivativesSink::new(bids_root, output_dir);
            let items = sink.plan(&manifest)?;
            let written = sink.execute(&items).context("sink failed")?;
            println!("Wrote {} derivative files", written.len());
        }
    }

    Ok(())
}
