//! Turns an SRA `EXPERIMENT_PACKAGE_SET` document into run-centric records.
//!
//! Every field goes through [`crate::xpath::resolve`]; a missing or malformed value
//! leaves the field unset and never fails the record.

use roxmltree::{Document, Node, ParsingOptions};
use tracing::debug;

use crate::domain::LibraryLayout;
use crate::error::KiraError;
use crate::estimate::apply_size_estimate;
use crate::record::{RunRecord, study_xref_key};
use crate::xpath::{read_nodes, read_text, read_texts, safe_read_at};

pub const READ_LENGTH_ATTRIBUTE: &str = "read_length";

pub fn parse_document(xml: &str) -> Result<Document<'_>, KiraError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(xml, options)
        .map_err(|err| KiraError::MetadataParse(err.to_string()))
}

/// Parses `xml` and normalizes it. Only a document that is not well-formed
/// XML is an error.
pub fn normalize(xml: &str, target: Option<&str>) -> Result<Vec<RunRecord>, KiraError> {
    let document = parse_document(xml)?;
    Ok(normalize_document(&document, target))
}

/// One record per `RUN_SET/RUN` of every experiment package, skipping runs
/// whose run, experiment and study ids all differ from `target`.
pub fn normalize_document(document: &Document<'_>, target: Option<&str>) -> Vec<RunRecord> {
    let mut records = Vec::new();
    for package in read_nodes(document.root(), "//EXPERIMENT_PACKAGE") {
        let experiment = ExperimentFields::read(package);
        for run in read_nodes(package, "RUN_SET/RUN") {
            let run_id = read_text(run, "@accession", None).unwrap_or_default();
            let mut record = experiment.run_record(run_id);
            if let Some(target) = target {
                if !record.matches_accession(target) {
                    debug!(run = run_id, filter = target, "run filtered out");
                    continue;
                }
            }
            read_run_statistics(run, &mut record);
            apply_size_estimate(&mut record);
            records.push(record);
        }
    }
    records
}

/// Pairs tags with values by position. Pairing stops at the shorter list, so
/// a tag without a value (or the reverse) shifts or drops trailing entries.
pub fn pair_attributes<'a>(tags: &[&'a str], values: &[&'a str]) -> Vec<(&'a str, &'a str)> {
    tags.iter().copied().zip(values.iter().copied()).collect()
}

struct ExperimentFields {
    exp_id: String,
    study_id: String,
    platform_name: Option<String>,
    instrument_model: Option<String>,
    library_name: Option<String>,
    library_selection: Option<String>,
    library_strategy: Option<String>,
    library_layout: LibraryLayout,
    sample: Vec<(String, String)>,
    study_xrefs: Vec<(String, Vec<String>)>,
}

impl ExperimentFields {
    fn read(package: Node<'_, '_>) -> Self {
        let text = |path: &str, fallback: Option<&str>| {
            read_text(package, path, fallback).map(str::to_string)
        };
        Self {
            exp_id: text("EXPERIMENT/@accession", Some("RUN_SET/RUN/EXPERIMENT_REF/@accession"))
                .unwrap_or_default(),
            study_id: text("EXPERIMENT/STUDY_REF/@accession", Some("STUDY/@accession"))
                .unwrap_or_default(),
            platform_name: text("EXPERIMENT/PLATFORM/*/name()", None),
            instrument_model: text(
                "EXPERIMENT/PLATFORM/*/INSTRUMENT_MODEL/text()",
                Some("EXPERIMENT//INSTRUMENT_MODEL/text()"),
            ),
            library_name: text("EXPERIMENT//LIBRARY_NAME/text()", None),
            library_selection: text("EXPERIMENT//LIBRARY_SELECTION/text()", None),
            library_strategy: text("EXPERIMENT//LIBRARY_STRATEGY/text()", None),
            library_layout: read_layout(package),
            sample: read_sample(package),
            study_xrefs: read_study_xrefs(package),
        }
    }

    fn run_record(&self, run_id: &str) -> RunRecord {
        let mut record = RunRecord::new(run_id, &self.exp_id, &self.study_id);
        record.platform_name = self.platform_name.clone();
        record.instrument_model = self.instrument_model.clone();
        record.library_name = self.library_name.clone();
        record.library_selection = self.library_selection.clone();
        record.library_strategy = self.library_strategy.clone();
        record.library_layout = self.library_layout;
        for (tag, value) in &self.sample {
            record.set_sample_field(tag, value);
        }
        for (key, ids) in &self.study_xrefs {
            record.study_xrefs.insert(key.clone(), ids.clone());
        }
        record
    }
}

/// `PAIRED` whenever the marker element exists, bare `<PAIRED/>` included.
/// Only a marker that resolves to nothing reads as `SINGLE`.
fn read_layout(package: Node<'_, '_>) -> LibraryLayout {
    match safe_read_at(package, "EXPERIMENT//LIBRARY_LAYOUT/PAIRED", None, 0)
        .and_then(|value| value.as_node())
    {
        Some(_) => LibraryLayout::Paired,
        None => LibraryLayout::Single,
    }
}

/// Sample fields in write order; attributes come last so they overwrite
/// colliding keys.
fn read_sample(package: Node<'_, '_>) -> Vec<(String, String)> {
    let Some(sample) = safe_read_at(package, "SAMPLE", None, 0).and_then(|value| value.as_node())
    else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    let own_fields = [
        ("id", "@accession"),
        ("title", "TITLE/text()"),
        ("description", "DESCRIPTION/text()"),
        ("organism", "SAMPLE_NAME/SCIENTIFIC_NAME/text()"),
        ("taxon", "SAMPLE_NAME/TAXON_ID/text()"),
    ];
    for (tag, path) in own_fields {
        if let Some(value) = read_text(sample, path, None) {
            fields.push((tag.to_string(), value.to_string()));
        }
    }

    let tags = read_texts(sample, "SAMPLE_ATTRIBUTES/SAMPLE_ATTRIBUTE/TAG/text()");
    let values = read_texts(sample, "SAMPLE_ATTRIBUTES/SAMPLE_ATTRIBUTE/VALUE/text()");
    for (tag, value) in pair_attributes(&tags, &values) {
        fields.push((tag.to_string(), value.to_string()));
    }
    fields
}

fn read_study_xrefs(package: Node<'_, '_>) -> Vec<(String, Vec<String>)> {
    let mut xrefs: Vec<(String, Vec<String>)> = Vec::new();
    for link in read_nodes(package, "STUDY//XREF_LINK") {
        let (Some(db), Some(id)) = (
            read_text(link, "DB/text()", None),
            read_text(link, "ID/text()", None),
        ) else {
            continue;
        };
        let key = study_xref_key(db.trim());
        match xrefs.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, ids)) => ids.push(id.trim().to_string()),
            None => xrefs.push((key, vec![id.trim().to_string()])),
        }
    }
    xrefs
}

fn read_run_statistics(run: Node<'_, '_>, record: &mut RunRecord) {
    record.total_bases = parse_u64(read_text(run, "@total_bases", Some("Bases/@count")));
    record.total_spots = parse_u64(read_text(run, "@total_spots", Some("Statistics/@nspots")));
    record.size = parse_u64(read_text(run, "@size", None));

    let reads = read_nodes(run, "Statistics/Read")
        .into_iter()
        .filter(|read| parse_u64(read_text(*read, "@count", None)).is_some_and(|count| count > 0))
        .collect::<Vec<_>>();
    if !reads.is_empty() {
        record.n_reads = u32::try_from(reads.len()).ok();
    }

    let attribute_path =
        format!("RUN_ATTRIBUTES/RUN_ATTRIBUTE[TAG='{READ_LENGTH_ATTRIBUTE}']/VALUE/text()");
    record.read_length = parse_length(read_text(run, &attribute_path, None))
        .or_else(|| mean_read_length(&reads));
}

fn mean_read_length(reads: &[Node<'_, '_>]) -> Option<f64> {
    let averages = reads
        .iter()
        .filter_map(|read| parse_length(read_text(*read, "@average", None)))
        .collect::<Vec<_>>();
    if averages.is_empty() {
        return None;
    }
    Some(averages.iter().sum::<f64>() / averages.len() as f64)
}

fn parse_u64(value: Option<&str>) -> Option<u64> {
    value.and_then(|value| value.trim().parse::<u64>().ok())
}

fn parse_length(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|length| length.is_finite() && *length > 0.0)
}
