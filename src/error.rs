use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid SRA accession: {0} (expected SRR, SRX, SRP, ERR, ERX, ERP, DRR, DRX or DRP)")]
    InvalidAccession(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid unresolvable-accession pattern: {0}")]
    InvalidPattern(String),

    #[error("SRA request failed: {0}")]
    SraHttp(String),

    #[error("SRA returned status {status}: {message}")]
    SraStatus { status: u16, message: String },

    #[error("failed to parse SRA metadata: {0}")]
    MetadataParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("output directory must be specified unless running metadata only")]
    MissingOutputDir,

    #[error("failed to start {program}: {message}")]
    ToolSpawn { program: String, message: String },

    #[error("accession could not be resolved by `{command}`: {message}")]
    #[diagnostic(help("check that the accession exists and is public"))]
    UnresolvableAccession { command: String, message: String },

    #[error("`{command}` failed after {attempts} attempts (last exit status: {})", display_status(.status))]
    RetriesExhausted {
        command: String,
        attempts: u32,
        status: Option<i32>,
    },
}

impl KiraError {
    /// Process exit code for this error. An exhausted retry loop passes the
    /// tool's last status through when it fits in a `u8`.
    pub fn exit_code(&self) -> u8 {
        match self {
            KiraError::RetriesExhausted { status, .. } => status
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1),
            KiraError::UnresolvableAccession { .. } | KiraError::InvalidAccession(_) => 2,
            KiraError::SraHttp(_) | KiraError::SraStatus { .. } => 3,
            _ => 1,
        }
    }
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhausted(status: Option<i32>) -> KiraError {
        KiraError::RetriesExhausted {
            command: "fasterq-dump SRR1".to_string(),
            attempts: 3,
            status,
        }
    }

    #[test]
    fn exhausted_retries_pass_tool_status_through() {
        assert_eq!(exhausted(Some(3)).exit_code(), 3);
        assert_eq!(exhausted(Some(255)).exit_code(), 255);
    }

    #[test]
    fn unrepresentable_tool_status_maps_to_one() {
        assert_eq!(exhausted(None).exit_code(), 1);
        assert_eq!(exhausted(Some(-9)).exit_code(), 1);
        assert_eq!(exhausted(Some(300)).exit_code(), 1);
    }

    #[test]
    fn accession_and_transport_errors() {
        let unresolvable = KiraError::UnresolvableAccession {
            command: "prefetch SRR0".to_string(),
            message: "failed to resolve accession".to_string(),
        };
        assert_eq!(unresolvable.exit_code(), 2);
        assert_eq!(KiraError::InvalidAccession("GSE1".to_string()).exit_code(), 2);
        assert_eq!(KiraError::SraHttp("timeout".to_string()).exit_code(), 3);
        let status = KiraError::SraStatus {
            status: 500,
            message: "internal error".to_string(),
        };
        assert_eq!(status.exit_code(), 3);
        assert_eq!(KiraError::MissingOutputDir.exit_code(), 1);
    }
}
