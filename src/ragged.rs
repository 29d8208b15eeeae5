//! Ragged-Beam Helpers (§4.G).
//!
//! Stack/unstack a `(time, beam)` array along its NaN-masked positions, and
//! flatten a 2-D array with at most one valid column per row down to a
//! 1-D series over `time`.

use ndarray::Array2;

/// The positions retained by [`stack_nan`]: `(time_index, beam_index)` pairs.
pub type StackedIndices = Vec<(usize, usize)>;

/// Flatten `arr` to the values at positions that are not NaN, alongside the
/// `(time, beam)` index of each retained value.
#[must_use]
pub fn stack_nan(arr: &Array2<f64>) -> (StackedIndices, Vec<f64>) {
    let mut indices = Vec::new();
    let mut flat = Vec::new();
    for ((i, j), &value) in arr.indexed_iter() {
        if !value.is_nan() {
            indices.push((i, j));
            flat.push(value);
        }
    }
    (indices, flat)
}

/// Inverse of [`stack_nan`]: allocate an `original_shape` array filled with
/// NaN and scatter `flat` back into `original_indices`.
#[must_use]
pub fn reform_nan(flat: &[f64], original_indices: &[(usize, usize)], original_shape: (usize, usize)) -> Array2<f64> {
    let mut out = Array2::from_elem(original_shape, f64::NAN);
    for (&(i, j), &value) in original_indices.iter().zip(flat) {
        out[[i, j]] = value;
    }
    out
}

/// Collapse `arr`'s `(time, beam)` rank down to one value per row by masking
/// with `cond` (`arr.where(cond)` in the original) and picking the one
/// column `cond` marks valid per row (the mask has at most one valid column
/// per row, so `argmax(notnull)` and "first masked-in column" coincide).
/// Rows with no column marked valid in `cond` read as NaN.
///
/// # Panics
/// Panics if `cond`'s shape does not match `arr`'s.
#[must_use]
pub fn flatten_by_mask(arr: &Array2<f64>, cond: &Array2<bool>) -> Vec<f64> {
    assert_eq!(arr.dim(), cond.dim(), "flatten_by_mask: cond shape must match arr shape");
    arr.outer_iter()
        .zip(cond.outer_iter())
        .map(|(row, mask)| row.iter().zip(mask.iter()).find(|(_, &m)| m).map_or(f64::NAN, |(&v, _)| v))
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn stack_then_reform_roundtrips() {
        let arr = array![[1.0, f64::NAN, 3.0], [f64::NAN, 5.0, f64::NAN]];
        let (indices, flat) = stack_nan(&arr);
        assert_eq!(flat.len(), 3);
        let back = reform_nan(&flat, &indices, (2, 3));
        assert_eq!(back[[0, 0]], 1.0);
        assert!(back[[0, 1]].is_nan());
        assert_eq!(back[[0, 2]], 3.0);
        assert_eq!(back[[1, 1]], 5.0);
        assert!(back[[1, 0]].is_nan());
    }

    #[test]
    fn flatten_by_mask_picks_the_valid_column() {
        let arr = array![[f64::NAN, 2.0, f64::NAN], [3.0, f64::NAN, f64::NAN], [f64::NAN, f64::NAN, f64::NAN]];
        let cond = array![[false, true, false], [true, false, false], [false, false, false]];
        let out = flatten_by_mask(&arr, &cond);
        assert_eq!(out[0], 2.0);
        assert_eq!(out[1], 3.0);
        assert!(out[2].is_nan());
    }

    #[test]
    fn flatten_by_mask_uses_cond_not_arr_nan_pattern() {
        // mirrors the original's tiltangle/ntx example: every cell holds a real
        // value (no NaNs in `arr` at all), and only `cond` marks which column is
        // valid per row.
        let arr = array![[0.0, 1.0, 2.0], [10.0, 11.0, 12.0]];
        let cond = array![[false, true, false], [false, false, true]];
        let out = flatten_by_mask(&arr, &cond);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 12.0);
    }
}
