use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::LibraryLayout;

/// One sequencing run, flattened from its experiment package.
///
/// Identifying fields are always set. Everything else is best effort and may
/// be missing from the source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub accession: String,
    pub exp_id: String,
    pub study_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_selection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_strategy: Option<String>,
    pub library_layout: LibraryLayout,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bases: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_spots: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_reads: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<u64>,
    /// `sample_*` keys: the sample's own fields followed by its attributes.
    #[serde(flatten)]
    pub sample: BTreeMap<String, String>,
    /// `study_<DB>_ids` keys from the study's cross-reference links.
    #[serde(flatten)]
    pub study_xrefs: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl RunRecord {
    pub fn new(run_id: &str, exp_id: &str, study_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            accession: run_id.to_string(),
            exp_id: exp_id.to_string(),
            study_id: study_id.to_string(),
            platform_name: None,
            instrument_model: None,
            library_name: None,
            library_selection: None,
            library_strategy: None,
            library_layout: LibraryLayout::Single,
            total_bases: None,
            total_spots: None,
            size: None,
            read_length: None,
            n_reads: None,
            estimated_size: None,
            sample: BTreeMap::new(),
            study_xrefs: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    /// Stores a sample field under its `sample_`-prefixed key. A later write
    /// to the same key replaces the earlier one.
    pub fn set_sample_field(&mut self, tag: &str, value: &str) {
        self.sample.insert(sample_key(tag), value.to_string());
    }

    pub fn sample_field(&self, tag: &str) -> Option<&str> {
        self.sample.get(&sample_key(tag)).map(String::as_str)
    }

    /// Matches `run_id`, `exp_id` or `study_id`.
    pub fn matches_accession(&self, target: &str) -> bool {
        self.run_id == target || self.exp_id == target || self.study_id == target
    }
}

pub fn sample_key(tag: &str) -> String {
    if tag.starts_with("sample_") {
        tag.to_string()
    } else {
        format!("sample_{tag}")
    }
}

pub fn study_xref_key(db: &str) -> String {
    format!("study_{db}_ids")
}
