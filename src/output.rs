use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;

use crate::app::SraResult;
use crate::error::KiraError;
use crate::fs_util;
use crate::record::RunRecord;

pub struct JsonOutput;

impl JsonOutput {
    /// Prints only the records; the download summary goes to the log.
    pub fn print_records(result: &SraResult) -> io::Result<()> {
        Self::print_json(&result.records)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn render_records(records: &[RunRecord]) -> Result<String, KiraError> {
    serde_json::to_string_pretty(records).map_err(|err| KiraError::Filesystem(err.to_string()))
}

pub fn write_records(path: &Utf8Path, records: &[RunRecord]) -> Result<(), KiraError> {
    let mut json = render_records(records)?;
    json.push('\n');
    fs_util::write_bytes_atomic(path, json.as_bytes())
}
