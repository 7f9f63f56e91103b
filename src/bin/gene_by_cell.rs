use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gene_by_cell::app::App;
use gene_by_cell::archive::SystemTar;
use gene_by_cell::config::{ConfigLoader, Overrides};
use gene_by_cell::domain::{Layout, QuantSource};
use gene_by_cell::error::GeneByCellError;
use gene_by_cell::manifest::{self, DEFAULT_STORAGE_HOST};
use gene_by_cell::output::{JsonOutput, LogProgress, OutputMode};

#[derive(Parser)]
#[command(name = "gene-by-cell")]
#[command(about = "Creates gene/isoform by cell matrices from per-sample RSEM and Kallisto archives")]
#[command(version, author)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(flatten)]
    build: BuildArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build count matrices (default when no subcommand is given)")]
    Build(BuildArgs),
    #[command(about = "Convert a download manifest TSV into a job-input JSON document")]
    Manifest(ManifestArgs),
}

#[derive(Args, Clone)]
struct BuildArgs {
    #[arg(short = 'i', long, alias = "input_dir", help = "Location where input archives are stored")]
    input_dir: Option<String>,

    #[arg(short = 'o', long, alias = "output_dir", help = "Location for output")]
    output_dir: Option<String>,

    #[arg(short = 'g', long, alias = "rsem_gene", help = "Output RSEM gene counts")]
    rsem_gene: bool,

    #[arg(short = 's', long, alias = "rsem_isoform", help = "Output RSEM isoform counts")]
    rsem_isoform: bool,

    #[arg(short = 'k', long, alias = "kallisto_isoform", help = "Output Kallisto isoform counts")]
    kallisto_isoform: bool,

    #[arg(long, alias = "rsem_gene_filename")]
    rsem_gene_filename: Option<String>,

    #[arg(long, alias = "rsem_isoform_filename")]
    rsem_isoform_filename: Option<String>,

    #[arg(long, alias = "kallisto_isoform_filename")]
    kallisto_isoform_filename: Option<String>,

    #[arg(long, alias = "tarball_filename", help = "Name of the output tarball")]
    tarball_filename: Option<String>,

    #[arg(long, help = "JSON config file (default: gene-by-cell.json if present)")]
    config: Option<String>,

    #[arg(long, value_enum)]
    layout: Option<Layout>,

    #[arg(long, help = "Suffix of per-sample archives (default: .tar.gz)")]
    suffix: Option<String>,

    #[arg(long, help = "Skip bundling the matrices into a tarball")]
    no_bundle: bool,

    #[arg(long, help = "Do not re-extract archives whose output directory already exists")]
    reuse_extracted: bool,

    #[arg(long, help = "Skip samples with unreadable results instead of aborting")]
    quarantine: bool,

    #[arg(long, help = "Print the run report as JSON")]
    json: bool,
}

#[derive(Args)]
struct ManifestArgs {
    manifest: PathBuf,

    #[arg(long, default_value = DEFAULT_STORAGE_HOST)]
    host: String,

    #[arg(long, help = "Write the document here instead of stdout")]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GeneByCellError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GeneByCellError) -> u8 {
    match error {
        GeneByCellError::NoInputFound { .. }
        | GeneByCellError::NoSourceSelected
        | GeneByCellError::ConfigRead(_)
        | GeneByCellError::ConfigParse(_)
        | GeneByCellError::InvalidManifest(_) => 2,
        GeneByCellError::ExtractionFailed { .. }
        | GeneByCellError::BundleFailed { .. }
        | GeneByCellError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Build(args)) => run_build(args),
        Some(Commands::Manifest(args)) => run_manifest(args),
        None => run_build(cli.build),
    }
}

fn run_build(args: BuildArgs) -> miette::Result<()> {
    let output_mode = if args.json {
        OutputMode::Json
    } else {
        OutputMode::Log
    };
    let config = ConfigLoader::load(args.config.as_deref())?;
    let resolved = ConfigLoader::resolve(config, build_overrides(args))?;

    let app = App::new(SystemTar::new());
    match output_mode {
        OutputMode::Json => {
            let report = app.run(&resolved, &JsonOutput)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
        }
        OutputMode::Log => {
            let report = app.run(&resolved, &LogProgress)?;
            for sample in &report.quarantined {
                info!(sample = %sample.sample, reason = %sample.reason, "quarantined");
            }
            info!(
                samples = report.samples,
                matrices = report.matrices.len(),
                "fin ({:.0}s)",
                report.elapsed_secs
            );
        }
    }
    Ok(())
}

fn build_overrides(args: BuildArgs) -> Overrides {
    let mut sources = Vec::new();
    if args.rsem_gene {
        sources.push(QuantSource::RsemGene);
    }
    if args.rsem_isoform {
        sources.push(QuantSource::RsemIsoform);
    }
    if args.kallisto_isoform {
        sources.push(QuantSource::KallistoIsoform);
    }

    let mut filenames = BTreeMap::new();
    if let Some(name) = args.rsem_gene_filename {
        filenames.insert(QuantSource::RsemGene, name);
    }
    if let Some(name) = args.rsem_isoform_filename {
        filenames.insert(QuantSource::RsemIsoform, name);
    }
    if let Some(name) = args.kallisto_isoform_filename {
        filenames.insert(QuantSource::KallistoIsoform, name);
    }

    Overrides {
        input_dir: args.input_dir,
        output_dir: args.output_dir,
        layout: args.layout,
        archive_suffix: args.suffix,
        sources,
        filenames,
        no_bundle: args.no_bundle,
        bundle_filename: args.tarball_filename,
        reuse_extracted: args.reuse_extracted,
        quarantine: args.quarantine,
    }
}

fn run_manifest(args: ManifestArgs) -> miette::Result<()> {
    let file = File::open(&args.manifest).into_diagnostic()?;
    let entries = manifest::parse_manifest(BufReader::new(file))?;
    let document = manifest::render(&manifest::job_input(&entries, &args.host))?;
    match args.output {
        Some(path) => std::fs::write(&path, format!("{document}\n")).into_diagnostic()?,
        None => println!("{document}"),
    }
    info!(files = entries.len(), "manifest converted");
    Ok(())
}
