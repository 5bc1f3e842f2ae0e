//! Best-effort FASTQ size estimate for a run.
//!
//! The estimate is only attached when the run's own statistics agree with each
//! other: `read_length * n_reads * total_spots` must be within 10% of the
//! reported `total_bases`.

use tracing::warn;

use crate::record::RunRecord;

pub const MAX_RELATIVE_ERROR: f64 = 0.10;

/// Header overhead per FASTQ record when the run id is unknown.
const FALLBACK_HEADER_LEN: f64 = 40.0;
const HEADER_PADDING: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeEstimate {
    Estimated(u64),
    MissingReadLength,
    MissingSpots,
    MissingTotalBases,
    Inconsistent { relative_error: f64 },
    OutOfRange,
}

impl SizeEstimate {
    pub fn bytes(self) -> Option<u64> {
        match self {
            SizeEstimate::Estimated(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Defaults `n_reads` from the layout when unset, then attaches
/// `estimated_size` if the consistency check passes.
pub fn apply_size_estimate(record: &mut RunRecord) -> SizeEstimate {
    if record.n_reads.is_none() {
        record.n_reads = Some(record.library_layout.default_read_count());
    }
    let estimate = estimate_size(record);
    match estimate {
        SizeEstimate::Estimated(bytes) => record.estimated_size = Some(bytes),
        SizeEstimate::Inconsistent { relative_error } => {
            warn!(
                run = %record.run_id,
                relative_error,
                "size data inconsistent, skipping estimate"
            );
        }
        _ => {}
    }
    estimate
}

pub fn estimate_size(record: &RunRecord) -> SizeEstimate {
    let Some(read_length) = record.read_length else {
        return SizeEstimate::MissingReadLength;
    };
    let n_reads = f64::from(
        record
            .n_reads
            .unwrap_or_else(|| record.library_layout.default_read_count()),
    );
    let Some(total_spots) = record.total_spots else {
        return SizeEstimate::MissingSpots;
    };
    let total_bases = match record.total_bases {
        Some(bases) if bases > 0 => bases as f64,
        _ => return SizeEstimate::MissingTotalBases,
    };
    let total_spots = total_spots as f64;

    let calc_bases = read_length * n_reads * total_spots;
    let relative_error = (calc_bases - total_bases).abs() / total_bases;
    if !relative_error.is_finite() {
        return SizeEstimate::OutOfRange;
    }
    if relative_error > MAX_RELATIVE_ERROR {
        return SizeEstimate::Inconsistent { relative_error };
    }

    let header_len = if record.run_id.is_empty() {
        FALLBACK_HEADER_LEN
    } else {
        (record.run_id.len() + HEADER_PADDING) as f64
    };
    // header and sequence line per read
    let bytes = (header_len + read_length) * 2.0 * n_reads * total_spots;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return SizeEstimate::OutOfRange;
    }
    SizeEstimate::Estimated(bytes.round() as u64)
}
