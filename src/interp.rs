//! Chunk-Aware Interpolator (§4.E).
//!
//! Resamples a source time series onto a target time vector split along the
//! source's native chunk boundaries, so no worker needs the full series in
//! memory. Each retained chunk is extended by one boundary row on each side
//! so linear interpolation crosses chunk seams without special-casing —
//! this replaces the cross-chunk boundary inference a dask-backed
//! implementation would otherwise need (§9).
//!
//! A field named `heading` is unwrapped to a continuous real-valued sequence
//! before interpolation and re-wrapped to `[0, 360)` afterward, avoiding the
//! zero-crossing averaging bug where 359° and 1° would otherwise interpolate
//! to 180° instead of 0°.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;

use crate::chunk_slice::chunk_slices;
use crate::config::global_config;
use crate::error::InterpError;

/// Resample `(source_time, source_value)` onto `target_time`, chunked along
/// `chunk_size` rows of the source (the whole series if `None`).
///
/// If `field_name == "heading"`, the source is angularly unwrapped before
/// interpolation and the result re-wrapped to `[0, 360)`.
///
/// # Errors
/// Returns [`InterpError::InterpInputError`] if `source_time` and
/// `source_value` disagree in length, or [`InterpError::InterpOrderError`]
/// if `target_time` is not non-decreasing.
pub fn interp(
    source_time: &[f64],
    source_value: &[f64],
    target_time: &[f64],
    field_name: &str,
    chunk_size: Option<u64>,
) -> Result<Vec<f64>, InterpError> {
    if source_time.len() != source_value.len() {
        return Err(InterpError::InterpInputError(2));
    }
    if !is_non_decreasing(target_time) {
        return Err(InterpError::InterpOrderError);
    }
    if target_time.is_empty() || source_time.is_empty() {
        return Ok(vec![f64::NAN; target_time.len()]);
    }

    let is_heading = field_name == "heading";
    let values = if is_heading { unwrap_degrees(source_value) } else { source_value.to_vec() };

    let chunk_size = chunk_size.unwrap_or(source_time.len() as u64).max(1);
    let mut chunk_ranges = chunk_slices(source_time.len() as u64, chunk_size);
    if chunk_ranges.is_empty() {
        return Ok(vec![f64::NAN; target_time.len()]);
    }
    let mut chunk_end_time: Vec<f64> =
        chunk_ranges.iter().map(|r| source_time[(r.end - 1) as usize]).collect();
    let max_target = target_time.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    *chunk_end_time.last_mut().expect("non-empty") = max_target + 1.0;

    let mut target_splits = Vec::with_capacity(chunk_end_time.len());
    let mut prev = 0usize;
    for &end_time in &chunk_end_time {
        let split = target_time.partition_point(|&t| t < end_time);
        target_splits.push(prev..split);
        prev = split;
    }

    let tasks: Vec<(std::ops::Range<u64>, std::ops::Range<usize>)> = chunk_ranges
        .drain(..)
        .zip(target_splits)
        .filter(|(_, target_range)| !target_range.is_empty())
        .collect();

    let limit = global_config().chunk_concurrent_minimum();
    let source_len = source_time.len() as u64;
    let results: Vec<(std::ops::Range<usize>, Vec<f64>)> = iter_concurrent_limit!(
        limit,
        tasks.into_par_iter(),
        map,
        |(source_range, target_range): (std::ops::Range<u64>, std::ops::Range<usize>)| {
            let ext_start = source_range.start.saturating_sub(1);
            let ext_end = (source_range.end + 1).min(source_len);
            let xs = &source_time[ext_start as usize..ext_end as usize];
            let ys = &values[ext_start as usize..ext_end as usize];
            let targets = &target_time[target_range.clone()];
            let interpolated: Vec<f64> = targets.iter().map(|&t| linear_at(xs, ys, t)).collect();
            (target_range, interpolated)
        }
    )
    .collect();

    let mut out = vec![f64::NAN; target_time.len()];
    for (range, values) in results {
        out[range].copy_from_slice(&values);
    }

    if is_heading {
        for v in &mut out {
            *v = v.rem_euclid(360.0);
        }
    }

    Ok(out)
}

fn is_non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

/// Replace a sequence of modular degree angles with a continuous real
/// sequence by adding/subtracting 360° at discontinuities greater than 180°.
fn unwrap_degrees(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len());
    out.push(values[0]);
    for w in values.windows(2) {
        let diff = w[1] - w[0];
        let wrapped = diff - 360.0 * (diff / 360.0).round();
        out.push(out.last().expect("pushed above") + wrapped);
    }
    out
}

/// Linear interpolation at `t` over `(xs, ys)`, extrapolating past either
/// boundary by continuing the nearest segment's slope
/// (`bounds_error=False, fill_value='extrapolate'` in the original).
fn linear_at(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let n = xs.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return ys[0];
    }
    let idx = match xs.binary_search_by(|x| x.partial_cmp(&t).expect("finite time")) {
        Ok(i) => i.min(n - 2),
        Err(0) => 0,
        Err(i) if i >= n => n - 2,
        Err(i) => i - 1,
    };
    let (x0, x1, y0, y1) = (xs[idx], xs[idx + 1], ys[idx], ys[idx + 1]);
    if (x1 - x0).abs() < f64::EPSILON {
        y0
    } else {
        y0 + (t - x0) / (x1 - x0) * (y1 - y0)
    }
}
