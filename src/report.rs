use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

pub const USER_ERROR_DESTINATION_VAR: &str = "KIRA_USER_ERROR_DESTINATION";

pub fn user_error_destination() -> Option<PathBuf> {
    std::env::var_os(USER_ERROR_DESTINATION_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Appends `message` as one line to `destination`. Never fails the caller.
pub fn report_error(destination: Option<&Path>, message: &str) {
    let Some(path) = destination else {
        return;
    };
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{message}"));
    if let Err(err) = result {
        warn!(path = %path.display(), error = %err, "error report failed");
    }
}
