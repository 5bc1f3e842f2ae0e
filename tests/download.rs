use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_sra::download::{
    DownloadOptions, DownloadOrchestrator, ExtractionFailurePolicy, ToolPaths,
};
use kira_sra::error::KiraError;
use kira_sra::executor::{ProcessOutput, ProcessRunner, RetryPolicy, RetryingExecutor, ToolCommand};
use kira_sra::normalize::normalize;
use kira_sra::record::RunRecord;
use kira_sra::sleeper::Sleeper;

const FIXTURE: &str = include_str!("fixtures/experiment_package.xml");

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

/// Pretends to be the SRA Toolkit: extraction writes FASTQ files named after
/// the run into `--outdir`, resolved against the working directory.
#[derive(Default)]
struct FakeToolkit {
    commands: Mutex<Vec<ToolCommand>>,
    failing_prefetch: bool,
    failing_runs: Vec<String>,
}

impl FakeToolkit {
    fn programs(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|command| command.program.display().to_string())
            .collect()
    }
}

impl ProcessRunner for FakeToolkit {
    fn run(&self, command: &ToolCommand) -> Result<ProcessOutput, KiraError> {
        self.commands.lock().unwrap().push(command.clone());
        let program = command.program.display().to_string();
        let failed = ProcessOutput {
            status: Some(3),
            stderr: "connection reset".to_string(),
        };
        if program == "prefetch" {
            if self.failing_prefetch {
                return Ok(failed);
            }
            return Ok(ProcessOutput {
                status: Some(0),
                stderr: String::new(),
            });
        }

        let run_id = command.args.last().cloned().unwrap_or_default();
        if self.failing_runs.contains(&run_id) {
            return Ok(failed);
        }
        let dir = outdir(command);
        if command.args.iter().any(|arg| arg == "--split-files") {
            std::fs::write(dir.join(format!("{run_id}_1.fastq")), b"@r\nA\n+\nI\n").unwrap();
            std::fs::write(dir.join(format!("{run_id}_2.fastq")), b"@r\nC\n+\nI\n").unwrap();
        } else {
            std::fs::write(dir.join(format!("{run_id}.fastq")), b"@r\nG\n+\nI\n").unwrap();
        }
        Ok(ProcessOutput {
            status: Some(0),
            stderr: String::new(),
        })
    }
}

fn outdir(command: &ToolCommand) -> PathBuf {
    let cwd = command.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
    let flag = command
        .args
        .iter()
        .position(|arg| arg == "--outdir" || arg == "--output-directory");
    match flag.and_then(|i| command.args.get(i + 1)) {
        Some(dir) => cwd.join(dir),
        None => cwd,
    }
}

fn tools() -> ToolPaths {
    ToolPaths {
        prefetch: PathBuf::from("prefetch"),
        fasterq_dump: PathBuf::from("fasterq-dump"),
        fastq_dump: PathBuf::from("fastq-dump"),
    }
}

fn options(dir: Utf8PathBuf, compress: bool, policy: ExtractionFailurePolicy) -> DownloadOptions {
    DownloadOptions {
        output_dir: dir,
        compress,
        prefetch_retry: RetryPolicy::new(2, Duration::ZERO),
        extract_retry: RetryPolicy::new(2, Duration::ZERO),
        on_extraction_failure: policy,
    }
}

fn orchestrator(toolkit: Arc<FakeToolkit>) -> DownloadOrchestrator<Arc<FakeToolkit>> {
    let executor = RetryingExecutor::with_default_pattern(toolkit)
        .unwrap()
        .with_sleeper(Arc::new(NoSleep));
    DownloadOrchestrator::new(executor, tools())
}

fn records() -> Vec<RunRecord> {
    normalize(FIXTURE, None).unwrap()
}

fn temp_out() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap();
    (temp, dir)
}

#[test]
fn prefetch_once_then_extract_each_run() {
    let (_temp, dir) = temp_out();
    let toolkit = Arc::new(FakeToolkit::default());
    let mut records = records();

    let summary = orchestrator(toolkit.clone())
        .download(&mut records, &options(dir, false, ExtractionFailurePolicy::Abort))
        .unwrap();

    assert!(summary.prefetch_ok);
    assert_eq!(summary.extracted, vec!["SRR100", "SRR101", "SRR200"]);
    assert_eq!(
        toolkit.programs(),
        vec!["prefetch", "fasterq-dump", "fasterq-dump", "fastq-dump"]
    );
    assert_eq!(records[0].files, vec!["SRR100_1.fastq", "SRR100_2.fastq"]);
    assert_eq!(records[2].files, vec!["SRR200.fastq"]);
}

#[test]
fn prefetch_failure_is_tolerated() {
    let (_temp, dir) = temp_out();
    let toolkit = Arc::new(FakeToolkit {
        failing_prefetch: true,
        ..FakeToolkit::default()
    });
    let mut records = records();

    let summary = orchestrator(toolkit.clone())
        .download(&mut records, &options(dir, false, ExtractionFailurePolicy::Abort))
        .unwrap();

    assert!(!summary.prefetch_ok);
    assert_eq!(summary.extracted.len(), 3);
    assert_eq!(
        toolkit.programs().iter().filter(|p| *p == "prefetch").count(),
        2
    );
}

#[test]
fn compression_replaces_fastq_files() {
    let (_temp, dir) = temp_out();
    let mut records = records();

    let summary = orchestrator(Arc::new(FakeToolkit::default()))
        .download(&mut records, &options(dir.clone(), true, ExtractionFailurePolicy::Abort))
        .unwrap();

    assert_eq!(summary.compressed, 5);
    assert_eq!(records[1].files, vec!["SRR101_1.fastq.gz", "SRR101_2.fastq.gz"]);
    assert!(!dir.join("SRR101_1.fastq").exists());
}

#[test]
fn extraction_failure_aborts_by_default() {
    let (_temp, dir) = temp_out();
    let toolkit = Arc::new(FakeToolkit {
        failing_runs: vec!["SRR101".to_string()],
        ..FakeToolkit::default()
    });
    let mut records = records();

    let err = orchestrator(toolkit.clone())
        .download(&mut records, &options(dir, false, ExtractionFailurePolicy::Abort))
        .unwrap_err();

    assert_matches!(err, KiraError::RetriesExhausted { status: Some(3), .. });
    assert!(!toolkit.programs().contains(&"fastq-dump".to_string()));
}

#[test]
fn extraction_failure_can_be_skipped() {
    let (_temp, dir) = temp_out();
    let toolkit = Arc::new(FakeToolkit {
        failing_runs: vec!["SRR101".to_string()],
        ..FakeToolkit::default()
    });
    let mut records = records();

    let summary = orchestrator(toolkit)
        .download(&mut records, &options(dir, false, ExtractionFailurePolicy::Skip))
        .unwrap();

    assert_eq!(summary.extracted, vec!["SRR100", "SRR200"]);
    assert_eq!(summary.failed, vec!["SRR101"]);
    assert!(records[1].files.is_empty());
}

#[test]
fn no_runs_means_no_tools() {
    let (_temp, dir) = temp_out();
    let toolkit = Arc::new(FakeToolkit::default());
    let mut records: Vec<RunRecord> = Vec::new();

    let summary = orchestrator(toolkit.clone())
        .download(&mut records, &options(dir, true, ExtractionFailurePolicy::Abort))
        .unwrap();

    assert!(summary.extracted.is_empty());
    assert!(toolkit.programs().is_empty());
}

#[test]
fn relative_output_dir_is_not_nested() {
    let temp = tempfile::Builder::new()
        .prefix("kira-sra-out")
        .tempdir_in(".")
        .unwrap();
    let cwd = std::env::current_dir().unwrap();
    let relative = temp.path().strip_prefix(&cwd).unwrap().join("out");
    let dir = Utf8PathBuf::from_path_buf(relative).unwrap();
    assert!(dir.is_relative());
    let toolkit = Arc::new(FakeToolkit::default());
    let mut records = records();

    orchestrator(toolkit.clone())
        .download(&mut records, &options(dir.clone(), false, ExtractionFailurePolicy::Abort))
        .unwrap();

    assert_eq!(records[0].files, vec!["SRR100_1.fastq", "SRR100_2.fastq"]);
    assert!(dir.join("SRR100_1.fastq").exists());
    assert!(!dir.join(dir.as_str()).exists());
    let commands = toolkit.commands.lock().unwrap();
    let extract = &commands[1];
    let flag = extract.args.iter().position(|arg| arg == "--outdir").unwrap();
    assert!(PathBuf::from(&extract.args[flag + 1]).is_absolute());
}
