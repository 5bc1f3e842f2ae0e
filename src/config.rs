use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::download::{ExtractionFailurePolicy, ToolPaths};
use crate::error::KiraError;
use crate::executor::{DEFAULT_UNRESOLVABLE_PATTERN, RetryPolicy};
use crate::fetch::DEFAULT_METADATA_URL;

pub const CONFIG_FILE_NAME: &str = "kira-sra.json";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub tools: ToolsEntry,
    #[serde(default)]
    pub prefetch_retry: Option<RetryEntry>,
    #[serde(default)]
    pub extract_retry: Option<RetryEntry>,
    #[serde(default)]
    pub unresolvable_pattern: Option<String>,
    #[serde(default)]
    pub on_extraction_failure: Option<ExtractionFailurePolicy>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsEntry {
    #[serde(default)]
    pub prefetch: Option<PathBuf>,
    #[serde(default)]
    pub fasterq_dump: Option<PathBuf>,
    #[serde(default)]
    pub fastq_dump: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryEntry {
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub sleep_secs: Option<u64>,
}

impl RetryEntry {
    fn resolve(entry: Option<Self>, default: RetryPolicy) -> RetryPolicy {
        let Some(entry) = entry else {
            return default;
        };
        RetryPolicy::new(
            entry.attempts.unwrap_or(default.n_retries),
            entry
                .sleep_secs
                .map(Duration::from_secs)
                .unwrap_or(default.retry_sleep),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub metadata_url: String,
    pub tools: ToolPaths,
    pub prefetch_retry: RetryPolicy,
    pub extract_retry: RetryPolicy,
    pub unresolvable_pattern: Regex,
    pub on_extraction_failure: ExtractionFailurePolicy,
    pub http_timeout: Duration,
}

pub fn default_prefetch_retry() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_secs(30))
}

pub fn default_extract_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(10))
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit `path` must exist. Without one, `./kira-sra.json` and then
    /// the user config directory are tried; if neither exists the defaults
    /// apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let config = match config_path {
            Some(config_path) => {
                debug!(path = %config_path.display(), "loading config");
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| KiraError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };

        Self::resolve_config(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("kira-sra").join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let metadata_url = config
            .metadata_url
            .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string());
        if !metadata_url.contains("{accession}") {
            return Err(KiraError::ConfigParse(
                "metadata_url must contain {accession}".to_string(),
            ));
        }

        let pattern = config
            .unresolvable_pattern
            .as_deref()
            .unwrap_or(DEFAULT_UNRESOLVABLE_PATTERN);
        let unresolvable_pattern =
            Regex::new(pattern).map_err(|err| KiraError::InvalidPattern(err.to_string()))?;

        let mut tools = ToolPaths::from_path();
        if let Some(path) = config.tools.prefetch {
            tools.prefetch = path;
        }
        if let Some(path) = config.tools.fasterq_dump {
            tools.fasterq_dump = path;
        }
        if let Some(path) = config.tools.fastq_dump {
            tools.fastq_dump = path;
        }

        Ok(ResolvedConfig {
            schema_version,
            metadata_url,
            tools,
            prefetch_retry: RetryEntry::resolve(config.prefetch_retry, default_prefetch_retry()),
            extract_retry: RetryEntry::resolve(config.extract_retry, default_extract_retry()),
            unresolvable_pattern,
            on_extraction_failure: config.on_extraction_failure.unwrap_or_default(),
            http_timeout: Duration::from_secs(
                config.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        })
    }
}
