//! Gap Detector (§4.F).
//!
//! Finds gaps in a candidate time series that are not already covered by
//! gaps in a reference series, following `_find_gaps_split` /
//! `compare_and_find_gaps` in the original processing pipeline for the
//! split-then-trim order of operations.

use itertools::Itertools;

use crate::error::GapError;

/// A half-open `[start, end)` time interval.
pub type Interval = (f64, f64);

/// Find gaps in `candidate` that are not covered by gaps in `reference`.
///
/// A gap is a pair of consecutive timestamps whose difference exceeds
/// `max_gap`. A leading (trailing) gap is synthesized if `candidate` starts
/// (ends) more than `max_gap` after (before) `reference` does. Every
/// candidate gap that fully contains one or more reference gaps is split
/// around each of them until stable; candidate gaps fully inside a
/// reference gap are then dropped, and partially-overlapping ones are
/// trimmed to their non-overlapping portion.
///
/// # Errors
/// Returns [`GapError::NonFiniteTime`] if either series contains a NaN or
/// infinite value.
pub fn gaps(candidate: &[f64], reference: &[f64], max_gap: f64) -> Result<Vec<Interval>, GapError> {
    check_finite("candidate", candidate)?;
    check_finite("reference", reference)?;

    let reference_gaps = consecutive_gaps(reference, max_gap);
    let mut candidate_gaps = consecutive_gaps(candidate, max_gap);

    if let (Some(&c_min), Some(&r_min)) = (candidate.first(), reference.first()) {
        if c_min > r_min + max_gap {
            candidate_gaps.insert(0, (r_min, c_min));
        }
    }
    if let (Some(&c_max), Some(&r_max)) = (candidate.last(), reference.last()) {
        if c_max < r_max - max_gap {
            candidate_gaps.push((c_max, r_max));
        }
    }

    let split = split_around_reference_gaps(candidate_gaps, &reference_gaps);
    let mut trimmed: Vec<Interval> = split
        .into_iter()
        .filter_map(|gap| trim_against_reference(gap, &reference_gaps))
        .collect();

    trimmed.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("finite"));
    Ok(trimmed)
}

fn check_finite(series: &'static str, values: &[f64]) -> Result<(), GapError> {
    for (index, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            return Err(GapError::NonFiniteTime { series, index });
        }
    }
    Ok(())
}

fn consecutive_gaps(series: &[f64], max_gap: f64) -> Vec<Interval> {
    series
        .iter()
        .tuple_windows()
        .filter_map(|(&a, &b)| (b - a > max_gap).then_some((a, b)))
        .collect()
}

/// Split every candidate gap around each reference gap it properly
/// contains, iterating until no candidate gap contains any reference gap.
fn split_around_reference_gaps(mut candidate_gaps: Vec<Interval>, reference_gaps: &[Interval]) -> Vec<Interval> {
    loop {
        let mut next = Vec::with_capacity(candidate_gaps.len());
        let mut changed = false;
        for gap in candidate_gaps {
            let contained = reference_gaps
                .iter()
                .find(|&&(r_start, r_end)| gap.0 <= r_start && r_end <= gap.1 && (r_start > gap.0 || r_end < gap.1));
            match contained {
                Some(&(r_start, r_end)) => {
                    changed = true;
                    if gap.0 < r_start {
                        next.push((gap.0, r_start));
                    }
                    if r_end < gap.1 {
                        next.push((r_end, gap.1));
                    }
                }
                None => next.push(gap),
            }
        }
        candidate_gaps = next;
        if !changed {
            return candidate_gaps;
        }
    }
}

/// Drop a gap fully inside a reference gap; trim a partially-overlapping gap
/// to its non-overlapping portion.
fn trim_against_reference(gap: Interval, reference_gaps: &[Interval]) -> Option<Interval> {
    let mut interval = gap;
    for &(r_start, r_end) in reference_gaps {
        if interval.0 >= r_start && interval.1 <= r_end {
            return None;
        }
        if interval.0 < r_end && interval.1 > r_start {
            if interval.0 < r_start {
                interval.1 = interval.1.min(r_start);
            } else {
                interval.0 = interval.0.max(r_end);
            }
        }
    }
    (interval.1 > interval.0).then_some(interval)
}
