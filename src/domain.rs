use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const ACCEPTED_PREFIXES: [&str; 9] = [
    "SRX", "SRP", "SRR", "DRX", "DRP", "DRR", "ERR", "ERX", "ERP",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessionKind {
    Run,
    Experiment,
    Study,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> AccessionKind {
        match self.0.as_bytes().get(2) {
            Some(b'R') => AccessionKind::Run,
            Some(b'X') => AccessionKind::Experiment,
            _ => AccessionKind::Study,
        }
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let has_prefix = ACCEPTED_PREFIXES
            .iter()
            .any(|prefix| normalized.starts_with(prefix));
        let digits = normalized.get(3..).unwrap_or("");
        let is_valid =
            has_prefix && !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(KiraError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Library layout as inferred from the experiment design.
///
/// `PAIRED` is reported whenever a `LIBRARY_LAYOUT/PAIRED` marker element is
/// present, with or without attributes. A missing marker reads as `SINGLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LibraryLayout {
    Paired,
    Single,
}

impl LibraryLayout {
    pub fn default_read_count(self) -> u32 {
        match self {
            LibraryLayout::Paired => 2,
            LibraryLayout::Single => 1,
        }
    }
}

impl fmt::Display for LibraryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryLayout::Paired => write!(f, "PAIRED"),
            LibraryLayout::Single => write!(f, "SINGLE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    OxfordNanopore,
    Other,
}

impl Platform {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if name.eq_ignore_ascii_case("OXFORD_NANOPORE") => Platform::OxfordNanopore,
            _ => Platform::Other,
        }
    }
}
