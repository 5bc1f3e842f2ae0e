use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::Platform;
use crate::error::KiraError;
use crate::executor::{ProcessRunner, RetryPolicy, RetryingExecutor, ToolCommand};
use crate::fs_util;
use crate::record::RunRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub prefetch: PathBuf,
    pub fasterq_dump: PathBuf,
    pub fastq_dump: PathBuf,
}

impl ToolPaths {
    /// Looks each tool up on `PATH`, falling back to the bare name.
    pub fn from_path() -> Self {
        let locate = |name: &str| fs_util::find_in_path(name).unwrap_or_else(|| PathBuf::from(name));
        Self {
            prefetch: locate("prefetch"),
            fasterq_dump: locate("fasterq-dump"),
            fastq_dump: locate("fastq-dump"),
        }
    }
}

/// What to do when one run cannot be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionFailurePolicy {
    /// Stop the whole batch and surface the error.
    #[default]
    Abort,
    /// Log the failure and continue with the next run.
    Skip,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub output_dir: Utf8PathBuf,
    pub compress: bool,
    pub prefetch_retry: RetryPolicy,
    pub extract_retry: RetryPolicy,
    pub on_extraction_failure: ExtractionFailurePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub prefetch_ok: bool,
    pub extracted: Vec<String>,
    pub failed: Vec<String>,
    pub compressed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTool {
    FasterqDump,
    FastqDump,
}

impl ExtractionTool {
    /// Nanopore runs go through `fastq-dump` and must not be split.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::OxfordNanopore => ExtractionTool::FastqDump,
            Platform::Other => ExtractionTool::FasterqDump,
        }
    }
}

pub fn prefetch_command(tools: &ToolPaths, output_dir: &Utf8Path, run_ids: &[&str]) -> ToolCommand {
    ToolCommand::new(&tools.prefetch)
        .arg("--output-directory")
        .arg(output_dir.as_str())
        .args(run_ids.iter().copied())
        .current_dir(output_dir)
}

pub fn extraction_command(tools: &ToolPaths, output_dir: &Utf8Path, record: &RunRecord) -> ToolCommand {
    let platform = Platform::from_name(record.platform_name.as_deref());
    match ExtractionTool::for_platform(platform) {
        ExtractionTool::FastqDump => ToolCommand::new(&tools.fastq_dump)
            .arg("--outdir")
            .arg(output_dir.as_str())
            .arg(record.run_id.as_str()),
        ExtractionTool::FasterqDump => ToolCommand::new(&tools.fasterq_dump)
            .arg("--outdir")
            .arg(output_dir.as_str())
            .arg("--split-files")
            .arg("-f")
            .arg(record.run_id.as_str()),
    }
    .current_dir(output_dir)
}

/// Two-phase transfer: one bulk prefetch for all runs, then one extraction
/// per run, then optional compression and file attachment.
pub struct DownloadOrchestrator<R: ProcessRunner> {
    executor: RetryingExecutor<R>,
    tools: ToolPaths,
}

impl<R: ProcessRunner> DownloadOrchestrator<R> {
    pub fn new(executor: RetryingExecutor<R>, tools: ToolPaths) -> Self {
        Self { executor, tools }
    }

    pub fn download(
        &self,
        records: &mut [RunRecord],
        options: &DownloadOptions,
    ) -> Result<DownloadSummary, KiraError> {
        std::fs::create_dir_all(options.output_dir.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        // tools run inside the output dir, so a relative --outdir would nest
        let output_dir = options
            .output_dir
            .canonicalize_utf8()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let output_dir = output_dir.as_path();

        let mut summary = DownloadSummary::default();
        let run_ids = records
            .iter()
            .map(|record| record.run_id.as_str())
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>();
        if run_ids.is_empty() {
            return Ok(summary);
        }

        let prefetch = prefetch_command(&self.tools, output_dir, &run_ids);
        match self.executor.execute(&prefetch, options.prefetch_retry) {
            Ok(()) => summary.prefetch_ok = true,
            Err(err) => warn!(error = %err, "prefetch failed, extracting directly"),
        }

        for record in records.iter() {
            if record.run_id.is_empty() {
                continue;
            }
            let command = extraction_command(&self.tools, output_dir, record);
            match self.executor.execute(&command, options.extract_retry) {
                Ok(()) => summary.extracted.push(record.run_id.clone()),
                Err(err) => match options.on_extraction_failure {
                    ExtractionFailurePolicy::Abort => return Err(err),
                    ExtractionFailurePolicy::Skip => {
                        warn!(run = %record.run_id, error = %err, "extraction failed, skipping run");
                        summary.failed.push(record.run_id.clone());
                    }
                },
            }
        }

        if options.compress {
            summary.compressed = fs_util::gzip_fastq_files(output_dir)?;
            info!(files = summary.compressed, "compressed FASTQ files");
        }

        for record in records.iter_mut() {
            record.files = fs_util::list_run_files(output_dir, &record.run_id)?;
        }
        Ok(summary)
    }
}
