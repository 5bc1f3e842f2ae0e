use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::KiraError;
use crate::sleeper::{Sleeper, ThreadSleeper};

/// Matches SRA Toolkit messages for accessions that do not exist or are not
/// public. These never succeed on retry.
pub const DEFAULT_UNRESOLVABLE_PATTERN: &str = r"(?i)(failed to resolve|cannot resolve|can't resolve|could not resolve|item not found)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &ToolCommand) -> Result<ProcessOutput, KiraError>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for Arc<R> {
    fn run(&self, command: &ToolCommand) -> Result<ProcessOutput, KiraError> {
        (**self).run(command)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, command: &ToolCommand) -> Result<ProcessOutput, KiraError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        let output = cmd.output().map_err(|err| KiraError::ToolSpawn {
            program: command.program.display().to_string(),
            message: err.to_string(),
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(command = %command, stdout = %stdout.trim(), "tool output");
        }
        Ok(ProcessOutput {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub n_retries: u32,
    pub retry_sleep: Duration,
}

impl RetryPolicy {
    pub fn new(n_retries: u32, retry_sleep: Duration) -> Self {
        Self {
            n_retries,
            retry_sleep,
        }
    }

    fn attempts(&self) -> u32 {
        self.n_retries.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    TransientFailure(Option<i32>),
    PermanentFailure(String),
}

/// Runs external tools with a bounded number of attempts and a fixed sleep
/// between them.
pub struct RetryingExecutor<R: ProcessRunner> {
    runner: R,
    sleeper: Arc<dyn Sleeper>,
    unresolvable: Regex,
}

impl<R: ProcessRunner> RetryingExecutor<R> {
    pub fn new(runner: R, unresolvable: Regex) -> Self {
        Self {
            runner,
            sleeper: Arc::new(ThreadSleeper),
            unresolvable,
        }
    }

    pub fn with_default_pattern(runner: R) -> Result<Self, KiraError> {
        let pattern = Regex::new(DEFAULT_UNRESOLVABLE_PATTERN)
            .map_err(|err| KiraError::InvalidPattern(err.to_string()))?;
        Ok(Self::new(runner, pattern))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// One run of `command`, classified.
    pub fn attempt(&self, command: &ToolCommand) -> Result<AttemptOutcome, KiraError> {
        let output = self.runner.run(command)?;
        if output.success() {
            return Ok(AttemptOutcome::Success);
        }
        if self.unresolvable.is_match(&output.stderr) {
            return Ok(AttemptOutcome::PermanentFailure(output.stderr));
        }
        Ok(AttemptOutcome::TransientFailure(output.status))
    }

    /// Runs `command` until it exits with status zero, at most
    /// `policy.n_retries` times. An unresolvable accession stops immediately
    /// without sleeping.
    pub fn execute(&self, command: &ToolCommand, policy: RetryPolicy) -> Result<(), KiraError> {
        let attempts = policy.attempts();
        let mut last_status = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                self.sleeper.sleep(policy.retry_sleep);
            }
            info!(command = %command, attempt, attempts, "running tool");
            match self.attempt(command)? {
                AttemptOutcome::Success => return Ok(()),
                AttemptOutcome::PermanentFailure(message) => {
                    warn!(command = %command, "accession cannot be resolved");
                    return Err(KiraError::UnresolvableAccession {
                        command: command.to_string(),
                        message,
                    });
                }
                AttemptOutcome::TransientFailure(status) => {
                    warn!(command = %command, attempt, ?status, "tool failed");
                    last_status = status;
                }
            }
        }
        Err(KiraError::RetriesExhausted {
            command: command.to_string(),
            attempts,
            status: last_status,
        })
    }
}
