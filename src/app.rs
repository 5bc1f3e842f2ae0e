use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::Accession;
use crate::download::{
    DownloadOptions, DownloadOrchestrator, DownloadSummary, ExtractionFailurePolicy,
};
use crate::error::KiraError;
use crate::executor::{ProcessRunner, RetryPolicy};
use crate::fetch::{MetadataFetcher, MetadataTransport};
use crate::output;
use crate::record::RunRecord;

#[derive(Debug, Clone)]
pub struct SraRequest {
    pub accession: Accession,
    /// Keeps only runs matching this id. Defaults to the requested accession.
    pub run_filter: Option<String>,
    pub metadata_only: bool,
    pub compress: bool,
    pub output_dir: Option<Utf8PathBuf>,
    pub metadata_file: Option<Utf8PathBuf>,
    pub raw_metadata_file: Option<Utf8PathBuf>,
}

impl SraRequest {
    pub fn metadata_only(accession: Accession) -> Self {
        Self {
            accession,
            run_filter: None,
            metadata_only: true,
            compress: false,
            output_dir: None,
            metadata_file: None,
            raw_metadata_file: None,
        }
    }

    /// Normalized like an accession so `--run srr100` matches `SRR100`.
    pub fn filter(&self) -> String {
        match &self.run_filter {
            Some(filter) => filter.trim().to_uppercase(),
            None => self.accession.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SraResult {
    pub records: Vec<RunRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadSummary>,
}

#[derive(Debug, Clone, Copy)]
pub struct TransferPolicy {
    pub prefetch_retry: RetryPolicy,
    pub extract_retry: RetryPolicy,
    pub on_extraction_failure: ExtractionFailurePolicy,
}

impl From<&ResolvedConfig> for TransferPolicy {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            prefetch_retry: config.prefetch_retry,
            extract_retry: config.extract_retry,
            on_extraction_failure: config.on_extraction_failure,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<T: MetadataTransport, R: ProcessRunner> {
    fetcher: MetadataFetcher<T>,
    orchestrator: DownloadOrchestrator<R>,
    policy: TransferPolicy,
}

impl<T: MetadataTransport, R: ProcessRunner> App<T, R> {
    pub fn new(
        fetcher: MetadataFetcher<T>,
        orchestrator: DownloadOrchestrator<R>,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            fetcher,
            orchestrator,
            policy,
        }
    }

    /// Fetch, normalize, optionally download, then write the metadata file.
    pub fn run(&self, request: &SraRequest, sink: &dyn ProgressSink) -> Result<SraResult, KiraError> {
        let output_dir = match (&request.output_dir, request.metadata_only) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => None,
            (None, false) => return Err(KiraError::MissingOutputDir),
        };

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; fetching metadata for {}", request.accession),
            elapsed: None,
        });
        let start = Instant::now();
        let raw = self
            .fetcher
            .fetch(&request.accession, request.raw_metadata_file.as_deref())?;
        sink.event(ProgressEvent {
            message: "sra.response".to_string(),
            elapsed: Some(start.elapsed()),
        });

        let filter = request.filter();
        sink.event(ProgressEvent {
            message: format!("phase=Verify; normalizing runs matching {filter}"),
            elapsed: None,
        });
        let mut records = raw.normalize(Some(&filter))?;

        let download = match output_dir {
            Some(dir) if !request.metadata_only => {
                sink.event(ProgressEvent {
                    message: format!("phase=Download; {} runs into {dir}", records.len()),
                    elapsed: None,
                });
                let start = Instant::now();
                let options = DownloadOptions {
                    output_dir: dir,
                    compress: request.compress,
                    prefetch_retry: self.policy.prefetch_retry,
                    extract_retry: self.policy.extract_retry,
                    on_extraction_failure: self.policy.on_extraction_failure,
                };
                let summary = self.orchestrator.download(&mut records, &options)?;
                sink.event(ProgressEvent {
                    message: format!(
                        "download.done extracted={} failed={}",
                        summary.extracted.len(),
                        summary.failed.len()
                    ),
                    elapsed: Some(start.elapsed()),
                });
                Some(summary)
            }
            _ => None,
        };

        if let Some(path) = &request.metadata_file {
            sink.event(ProgressEvent {
                message: format!("phase=Store; writing {path}"),
                elapsed: None,
            });
            output::write_records(path, &records)?;
        }

        Ok(SraResult { records, download })
    }
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}
