//! Chunk-Slice Utility (§4.H).
//!
//! Produces absolute row ranges from an array's fixed chunk grid, and
//! rebases a batch of caller-supplied write offsets onto an existing
//! group's current length.

use std::ops::Range;
use std::path::Path;

use crate::array::array_metadata::ArrayMetadata;
use crate::error::WriteError;

/// Row ranges for each chunk along the append dimension of an array with `len` rows
/// chunked in blocks of `chunk_size`. The last range is narrowed to the actual tail length.
#[must_use]
pub fn chunk_slices(len: u64, chunk_size: u64) -> Vec<Range<u64>> {
    if chunk_size == 0 || len == 0 {
        return Vec::new();
    }
    let mut slices = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + chunk_size).min(len);
        slices.push(start..end);
        start = end;
    }
    slices
}

/// The chunk index and in-chunk row range covering `range`, split at chunk boundaries.
///
/// Returns `(chunk_index, rows_within_chunk, rows_within_range)` triples so a
/// caller can copy `range`'s data into each overlapping chunk.
#[must_use]
pub fn chunks_overlapping(range: &Range<u64>, chunk_size: u64) -> Vec<(u64, Range<u64>, Range<u64>)> {
    if chunk_size == 0 || range.start >= range.end {
        return Vec::new();
    }
    let mut out = Vec::new();
    let first_chunk = range.start / chunk_size;
    let last_chunk = (range.end - 1) / chunk_size;
    for chunk_idx in first_chunk..=last_chunk {
        let chunk_start = chunk_idx * chunk_size;
        let chunk_end = chunk_start + chunk_size;
        let overlap_start = range.start.max(chunk_start);
        let overlap_end = range.end.min(chunk_end);
        let within_chunk = (overlap_start - chunk_start)..(overlap_end - chunk_start);
        let within_range = (overlap_start - range.start)..(overlap_end - range.start);
        out.push((chunk_idx, within_chunk, within_range));
    }
    out
}

/// `chunk_slices` over an on-disk array's current append-dim length.
#[must_use]
pub fn array_chunk_slices(meta: &ArrayMetadata) -> Vec<Range<u64>> {
    let len = meta.shape.first().copied().unwrap_or(0);
    chunk_slices(len, meta.chunk_size)
}

/// Shift `row_ranges` so that they land immediately after the group's current
/// append-dim length.
///
/// On an empty or non-existent group, returns `row_ranges` unchanged. On an
/// existing group, shifts every range by `existing_len`.
///
/// # Errors
/// Returns [`WriteError::RechunkUnsupported`] if more than one range is
/// queued and the first range's length disagrees with `chunk_size` — this
/// store has no rechunking facility.
pub fn rebase_write_offsets(
    group_path: &Path,
    row_ranges: &[Range<u64>],
    existing_len: Option<u64>,
    chunk_size: u64,
) -> Result<Vec<Range<u64>>, WriteError> {
    let Some(existing_len) = existing_len else {
        let _ = group_path;
        return Ok(row_ranges.to_vec());
    };
    if row_ranges.len() > 1 {
        if let Some(first) = row_ranges.first() {
            let first_len = first.end - first.start;
            if first_len != chunk_size {
                return Err(WriteError::RechunkUnsupported {
                    first_range_len: first_len,
                    chunk_size,
                });
            }
        }
    }
    Ok(row_ranges
        .iter()
        .map(|r| (r.start + existing_len)..(r.end + existing_len))
        .collect())
}

/// Given a loaded `time` coordinate and a `(start, end)` time bound, find the
/// covering row range by nearest-match, the way `slice_xarray_by_dim` does
/// for a time-bounded read.
///
/// Returns `None` if `times` is empty.
#[must_use]
pub fn nearest_row_range(times: &[f64], start: Option<f64>, end: Option<f64>) -> Option<Range<u64>> {
    if times.is_empty() {
        return None;
    }
    let nearest_index = |t: f64| -> usize {
        times
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (**a - t).abs().partial_cmp(&(**b - t).abs()).unwrap()
            })
            .map(|(i, _)| i)
            .unwrap()
    };
    let start_idx = start.map_or(0, nearest_index);
    let end_idx = end.map_or(times.len() - 1, nearest_index);
    if start_idx > end_idx {
        return None;
    }
    Some(start_idx as u64..(end_idx as u64 + 1))
}
