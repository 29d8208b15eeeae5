//! Chunk Writer (§4.C).
//!
//! Places one [`Batch`] at a caller-given row range: grows arrays, backfills
//! no-data when the secondary dimension expands, and creates new variables
//! either as part of a coordinated first write or as a later merge. Each
//! call needs only its own row range and batch data — no central indexer —
//! so N workers can write disjoint ranges of the same store concurrently
//! with only a filesystem-level lock on metadata ([`crate::lock`]).

use std::ops::Range;

use serde_json::{Map, Value};

use crate::array::{columns_equal, Batch, ColumnData, Variable};
use crate::error::WriteError;
use crate::group::{combine_attributes, Group};

/// Place `batch` at `row_range` in `group`.
///
/// `attrs`, when present, is folded into the group's attributes via the
/// Attribute Merger, treating the group's current attributes as the first
/// "batch" in the merge sequence so repeated coordinated writes accumulate
/// correctly. `final_size`, when present (only ever set on the first task of
/// a coordinated write), pre-resizes every pre-existing array's append
/// dimension once. `chunk_size` is the fixed append-dim chunk grid used when
/// a variable in `batch` does not already exist in `group`. `merge` marks
/// this as a merge-mode write: `batch` introduces at least one variable not
/// previously in the group, at a row range already covered by the group's
/// existing append-dim length.
///
/// # Errors
/// Returns [`WriteError::MergeBoundsError`] if `merge` is set and the
/// batch's `time` variable's first value is not already present in the
/// group; [`WriteError::CoordinateConflict`] if a static coordinate
/// (`beam`, `xyz`) disagrees with the value already stored; propagates
/// [`WriteError::AttributeConflict`] from the attribute merge and
/// [`WriteError::Storage`] from any underlying filesystem operation.
pub fn write(
    group: &mut Group,
    batch: &Batch,
    attrs: Option<&Map<String, Value>>,
    row_range: Range<u64>,
    final_size: Option<u64>,
    merge: bool,
    chunk_size: u64,
) -> Result<(), WriteError> {
    if merge {
        check_merge_bounds(group, batch)?;
    }

    if let Some(attrs) = attrs {
        let merged = combine_attributes(&[group.attrs().clone(), attrs.clone()])?;
        group.apply_merged_attrs(merged)?;
    }

    if let Some(final_size) = final_size {
        for name in group.array_names() {
            group.resize_array(&name, final_size)?;
        }
    }

    grow_secondary_dimension(group, batch)?;

    for (name, var) in batch.iter() {
        if is_static_coord(name) {
            write_static_coord(group, name, var, chunk_size)?;
            continue;
        }
        write_variable(group, name, var, row_range.clone(), final_size, merge, chunk_size)?;
        if let Some(array) = group.array_mut(name) {
            array.set_dim_names(var.dim_names.clone())?;
        }
    }

    Ok(())
}

fn check_merge_bounds(group: &Group, batch: &Batch) -> Result<(), WriteError> {
    let Some(time_var) = batch.get("time") else {
        // the merge batch carries no time coordinate of its own to validate against
        return Ok(());
    };
    let ColumnData::F64(values) = &time_var.data else {
        return Ok(());
    };
    let Some(&first_time) = values.iter().next() else {
        return Ok(());
    };
    if group.time_contains(first_time) {
        Ok(())
    } else {
        Err(WriteError::MergeBoundsError { variable: "time".to_string(), first_time })
    }
}

/// Grow every pre-existing rank-≥2 array whose secondary length is smaller
/// than the largest secondary length carried by `batch`.
fn grow_secondary_dimension(group: &mut Group, batch: &Batch) -> Result<(), WriteError> {
    let Some(incoming) = batch.iter().filter_map(|(_, v)| v.data.secondary_len()).max() else {
        return Ok(());
    };
    for name in group.array_names() {
        let current = group.array(&name).and_then(|a| a.meta().secondary_len());
        if current.is_some_and(|current| incoming > current) {
            group.resize_secondary(&name, incoming)?;
        }
    }
    Ok(())
}

fn write_variable(
    group: &mut Group,
    name: &str,
    var: &Variable,
    row_range: Range<u64>,
    final_size: Option<u64>,
    merge: bool,
    chunk_size: u64,
) -> Result<(), WriteError> {
    if group.array(name).is_some() {
        group.array(name).expect("checked above").write_rows(row_range, &var.data)?;
        return Ok(());
    }

    if merge {
        let group_len = group.append_len().unwrap_or(row_range.end);
        let shape = match var.data.secondary_len() {
            Some(secondary) => vec![group_len, secondary],
            None => vec![group_len],
        };
        group.create_array(name, var.data.dtype(), shape, chunk_size, var.dim_names.clone())?;
        group.array(name).expect("just created").write_rows(row_range, &var.data)?;
    } else {
        let shape = var.data.shape();
        group.create_array(name, var.data.dtype(), shape, chunk_size, var.dim_names.clone())?;
        group.resize_array(name, final_size.unwrap_or(row_range.end))?;
        group.array(name).expect("just created").write_rows(row_range, &var.data)?;
    }
    Ok(())
}

fn is_static_coord(name: &str) -> bool {
    name == "beam" || name == "xyz"
}

fn write_static_coord(group: &mut Group, name: &str, var: &Variable, chunk_size: u64) -> Result<(), WriteError> {
    if let Some(existing) = group.array(name) {
        let len = existing.meta().shape.first().copied().unwrap_or(0);
        let existing_data = existing.read_rows(0..len)?;
        if columns_equal(&existing_data, &var.data) {
            Ok(())
        } else {
            Err(WriteError::CoordinateConflict(name.to_string()))
        }
    } else {
        let shape = var.data.shape();
        group.create_array(name, var.data.dtype(), shape, chunk_size, var.dim_names.clone())?;
        group
            .array(name)
            .expect("just created")
            .write_rows(0..var.data.time_len(), &var.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ndarray::{array, ArrayD, IxDyn};
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::data_type::DataType;

    fn batch_of(vars: Vec<(&str, ColumnData)>) -> Batch {
        let mut map = HashMap::new();
        for (name, data) in vars {
            map.insert(name.to_string(), Variable::new(data));
        }
        Batch::new(map).unwrap()
    }

    #[test]
    fn two_worker_append_then_read_back_s1() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();

        let batch0 = batch_of(vec![(
            "x",
            ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[1000]), (0..1000).map(f64::from).collect()).unwrap()),
        )]);
        write(&mut group, &batch0, Some(&Map::new()), 0..1000, Some(2000), false, 500).unwrap();

        let batch1 = batch_of(vec![(
            "x",
            ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[1000]), (1000..2000).map(f64::from).collect()).unwrap()),
        )]);
        write(&mut group, &batch1, None, 1000..2000, None, false, 500).unwrap();

        let back = group.array("x").unwrap().read_rows(0..2000).unwrap();
        match back {
            ColumnData::F64(a) => {
                assert_eq!(a[499], 499.0);
                assert_eq!(a[500], 500.0);
                assert_eq!(a[1499], 1499.0);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn secondary_dim_growth_backfills_prior_rows_s2() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();

        let batch0 = batch_of(vec![("x", ColumnData::F64(ArrayD::from_elem(IxDyn(&[100, 256]), 1.0)))]);
        write(&mut group, &batch0, None, 0..100, Some(200), false, 100).unwrap();

        let batch1 = batch_of(vec![("x", ColumnData::F64(ArrayD::from_elem(IxDyn(&[100, 400]), 2.0)))]);
        write(&mut group, &batch1, None, 100..200, None, false, 100).unwrap();

        let back = group.array("x").unwrap().read_rows(0..100).unwrap();
        match back {
            ColumnData::F64(a) => {
                assert_eq!(a[[0, 255]], 1.0);
                assert!(a[[0, 256]].is_nan());
                assert!(a[[99, 399]].is_nan());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn merge_write_adds_variable_within_existing_range_s3() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();

        let batch0 = batch_of(vec![
            ("time", ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[100]), (0..100).map(f64::from).collect()).unwrap())),
            ("x", ColumnData::F64(ArrayD::from_elem(IxDyn(&[100]), 1.0))),
        ]);
        write(&mut group, &batch0, None, 0..100, Some(100), false, 100).unwrap();

        let merge_batch = batch_of(vec![
            ("time", ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[50]), (25..75).map(f64::from).collect()).unwrap())),
            ("y", ColumnData::F64(ArrayD::from_elem(IxDyn(&[50]), 7.0))),
        ]);
        write(&mut group, &merge_batch, None, 25..75, None, true, 100).unwrap();

        let y = group.array("y").unwrap().read_rows(0..100).unwrap();
        match y {
            ColumnData::F64(a) => {
                assert!(a[0].is_nan());
                assert_eq!(a[50], 7.0);
                assert!(a[99].is_nan());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn merge_write_rejects_out_of_bounds_time() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();
        let batch0 = batch_of(vec![(
            "time",
            ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[100]), (0..100).map(f64::from).collect()).unwrap()),
        )]);
        write(&mut group, &batch0, None, 0..100, Some(100), false, 100).unwrap();

        let merge_batch = batch_of(vec![
            ("time", ColumnData::F64(array![500.0].into_dyn())),
            ("y", ColumnData::F64(array![1.0].into_dyn())),
        ]);
        let err = write(&mut group, &merge_batch, None, 500..501, None, true, 100).unwrap_err();
        assert!(matches!(err, WriteError::MergeBoundsError { .. }));
    }

    #[test]
    fn static_coordinate_matches_on_rewrite_but_conflicts_on_mismatch() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();

        let beam = ColumnData::F64(array![0.0, 1.0, 2.0].into_dyn());
        let mut beam_var = Variable::new(beam.clone());
        beam_var.dim_names = vec!["beam".to_string()];
        let mut map = HashMap::new();
        map.insert("beam".to_string(), beam_var);
        let batch0 = Batch::new(map).unwrap();
        write(&mut group, &batch0, None, 0..3, None, false, 3).unwrap();

        // identical beam values on a later write are accepted as a no-op
        let mut beam_var2 = Variable::new(beam);
        beam_var2.dim_names = vec!["beam".to_string()];
        let mut map2 = HashMap::new();
        map2.insert("beam".to_string(), beam_var2);
        let batch1 = Batch::new(map2).unwrap();
        write(&mut group, &batch1, None, 0..3, None, false, 3).unwrap();

        // a different beam vector conflicts
        let mut beam_var3 = Variable::new(ColumnData::F64(array![9.0, 9.0, 9.0].into_dyn()));
        beam_var3.dim_names = vec!["beam".to_string()];
        let mut map3 = HashMap::new();
        map3.insert("beam".to_string(), beam_var3);
        let batch2 = Batch::new(map3).unwrap();
        let err = write(&mut group, &batch2, None, 0..3, None, false, 3).unwrap_err();
        assert!(matches!(err, WriteError::CoordinateConflict(_)));
    }

    #[test]
    fn attrs_merge_on_write_applies_install_dedup() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();
        let batch0 = batch_of(vec![("x", ColumnData::F64(array![1.0].into_dyn()))]);
        let attrs0 = Map::from_iter([(
            "install_0".to_string(),
            json!({"raw_file_name": "a.all", "survey_identifier": "s1"}),
        )]);
        write(&mut group, &batch0, Some(&attrs0), 0..1, Some(1), false, 1).unwrap();

        let attrs1 = Map::from_iter([(
            "install_1".to_string(),
            json!({"raw_file_name": "b.all", "survey_identifier": "s1"}),
        )]);
        write(&mut group, &batch0, Some(&attrs1), 0..1, None, false, 1).unwrap();

        let files = group.attrs()["multibeam_files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
    }
}
