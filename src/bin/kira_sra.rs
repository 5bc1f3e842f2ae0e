use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kira_sra::app::{App, ProgressEvent, ProgressSink, SraRequest, TransferPolicy};
use kira_sra::config::ConfigLoader;
use kira_sra::domain::Accession;
use kira_sra::download::DownloadOrchestrator;
use kira_sra::error::KiraError;
use kira_sra::executor::{RetryingExecutor, SystemProcessRunner};
use kira_sra::fetch::{MetadataFetcher, SraHttpTransport};
use kira_sra::output::JsonOutput;
use kira_sra::report::{report_error, user_error_destination};

#[derive(Parser)]
#[command(name = "kira-sra")]
#[command(about = "Fetch SRA run metadata and download FASTQ files for an accession")]
#[command(version, author)]
struct Cli {
    /// SRA accession (SRR, SRX, SRP, ERR, ERX, ERP, DRR, DRX or DRP)
    #[arg(long)]
    id: String,

    /// Output directory for FASTQ files
    #[arg(long)]
    out: Option<Utf8PathBuf>,

    /// Only fetch metadata, skip the download
    #[arg(long)]
    metaonly: bool,

    /// Write the run records as JSON to this file
    #[arg(long)]
    metadata_file: Option<Utf8PathBuf>,

    /// Write the raw SRA metadata XML to this file
    #[arg(long)]
    sra_metadata_file: Option<Utf8PathBuf>,

    /// Gzip FASTQ files after extraction
    #[arg(long)]
    gzip: bool,

    /// Keep only runs matching this id instead of the accession itself
    #[arg(long)]
    run: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    prefetch_bin: Option<PathBuf>,

    #[arg(long)]
    fasterq_dump_bin: Option<PathBuf>,

    #[arg(long)]
    fastq_dump_bin: Option<PathBuf>,
}

struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "{}",
                event.message
            ),
            None => info!("{}", event.message),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        report_error(user_error_destination().as_deref(), &report.to_string());
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(kira.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let accession: Accession = cli.id.parse()?;

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(path) = cli.prefetch_bin {
        config.tools.prefetch = path;
    }
    if let Some(path) = cli.fasterq_dump_bin {
        config.tools.fasterq_dump = path;
    }
    if let Some(path) = cli.fastq_dump_bin {
        config.tools.fastq_dump = path;
    }

    let transport = SraHttpTransport::new(&config.metadata_url, config.http_timeout)?;
    let executor = RetryingExecutor::new(SystemProcessRunner, config.unresolvable_pattern.clone());
    let app = App::new(
        MetadataFetcher::new(transport),
        DownloadOrchestrator::new(executor, config.tools.clone()),
        TransferPolicy::from(&config),
    );

    let request = SraRequest {
        accession,
        run_filter: cli.run,
        metadata_only: cli.metaonly,
        compress: cli.gzip,
        output_dir: cli.out,
        metadata_file: cli.metadata_file,
        raw_metadata_file: cli.sra_metadata_file,
    };
    let result = app.run(&request, &LogSink)?;
    if let Some(summary) = &result.download {
        info!(
            extracted = summary.extracted.len(),
            failed = summary.failed.len(),
            prefetch_ok = summary.prefetch_ok,
            "download finished"
        );
    }
    JsonOutput::print_records(&result).into_diagnostic()?;
    Ok(())
}
