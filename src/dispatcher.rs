//! Write Dispatcher (§4.D).
//!
//! Serializes a sequence of [`crate::writer::write`] calls across workers:
//! task 0 runs alone and completes (including the group-wide pre-resize and
//! attribute merge) before any later task starts — the coordinated write's
//! only synchronization barrier. Tasks `1..N` then run unordered, each
//! needing only a shared view of the group to place its own disjoint row
//! range (data-only tasks take no metadata lock in the common path).

use std::ops::Range;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;
use serde_json::{Map, Value};

use crate::array::Batch;
use crate::config::global_config;
use crate::error::WriteError;
use crate::group::Group;
use crate::writer;

/// One unit of a coordinated write: a batch and the absolute row range it lands at.
#[derive(Debug)]
pub struct WriteTask {
    /// The batch to persist.
    pub batch: Batch,
    /// The absolute `[start, end)` row range this batch occupies.
    pub row_range: Range<u64>,
}

/// Run `tasks` against `group`: the first task carries `attrs` and a
/// `final_size` derived from the last task's range end; the rest run
/// unordered (in parallel unless `skip_parallel` is set).
///
/// # Errors
/// Returns the first [`WriteError`] encountered. Per §7, there is no
/// rollback: on failure the store may be left with the successful tasks
/// persisted and the append dimension already resized to `final_size`, with
/// fill values where the failed or abandoned tasks would have written.
/// Readers must tolerate that.
pub fn distribute(
    group: &mut Group,
    tasks: Vec<WriteTask>,
    attrs: Option<Map<String, Value>>,
    chunk_size: u64,
    skip_parallel: bool,
) -> Result<(), WriteError> {
    let Some((first, rest)) = split_first(tasks) else {
        return Ok(());
    };
    let final_size = rest.last().map_or(first.row_range.end, |t| t.row_range.end);

    writer::write(group, &first.batch, attrs.as_ref(), first.row_range, Some(final_size), false, chunk_size)?;

    if rest.is_empty() {
        return Ok(());
    }

    let group_ref: &Group = group;
    if skip_parallel {
        rest.into_iter().try_for_each(|task| run_tail_task(group_ref, task, chunk_size))
    } else {
        let limit = global_config().chunk_concurrent_minimum();
        iter_concurrent_limit!(limit, rest.into_par_iter(), try_for_each, |task: WriteTask| {
            run_tail_task(group_ref, task, chunk_size)
        })
    }
}

fn split_first(mut tasks: Vec<WriteTask>) -> Option<(WriteTask, Vec<WriteTask>)> {
    if tasks.is_empty() {
        return None;
    }
    let first = tasks.remove(0);
    Some((first, tasks))
}

/// Write one of tasks `1..N`: every variable in its batch must already exist
/// in the group (task 0 established the variable set and final size).
fn run_tail_task(group: &Group, task: WriteTask, chunk_size: u64) -> Result<(), WriteError> {
    let _ = chunk_size;
    for (name, var) in task.batch.iter() {
        let array = group.array(name).ok_or_else(|| WriteError::MissingVariable(name.clone()))?;
        array.write_rows(task.row_range.clone(), &var.data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ndarray::{ArrayD, IxDyn};
    use tempfile::tempdir;

    use super::*;
    use crate::array::{ColumnData, Variable};

    fn task(start: u64, end: u64, offset: f64) -> WriteTask {
        let len = (end - start) as usize;
        let data: Vec<f64> = (0..len).map(|i| offset + i as f64).collect();
        let mut vars = HashMap::new();
        vars.insert(
            "x".to_string(),
            Variable::new(ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[len]), data).unwrap())),
        );
        WriteTask { batch: Batch::new(vars).unwrap(), row_range: start..end }
    }

    #[test]
    fn two_tasks_distribute_and_read_back_s1() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();
        let tasks = vec![task(0, 1000, 0.0), task(1000, 2000, 1000.0)];
        distribute(&mut group, tasks, Some(Map::new()), 500, false).unwrap();

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
    fn skip_parallel_runs_tasks_sequentially_with_same_result() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();
        let tasks = vec![task(0, 500, 0.0), task(500, 1000, 500.0), task(1000, 1500, 1000.0)];
        distribute(&mut group, tasks, None, 500, true).unwrap();

        let back = group.array("x").unwrap().read_rows(0..1500).unwrap();
        match back {
            ColumnData::F64(a) => assert_eq!(a[1499], 1499.0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn empty_task_list_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();
        distribute(&mut group, Vec::new(), None, 500, false).unwrap();
        assert!(group.array_names().is_empty());
    }

    #[test]
    fn missing_variable_in_tail_task_surfaces_error() {
        let dir = tempdir().unwrap();
        let mut group = Group::open(dir.path().join("g")).unwrap();
        let first = task(0, 500, 0.0);
        let mut bad_vars = HashMap::new();
        bad_vars.insert(
            "y".to_string(),
            Variable::new(ColumnData::F64(ArrayD::from_elem(IxDyn(&[500]), 1.0))),
        );
        let bad_tail = WriteTask { batch: Batch::new(bad_vars).unwrap(), row_range: 500..1000 };
        let err = distribute(&mut group, vec![first, bad_tail], None, 500, true).unwrap_err();
        assert!(matches!(err, WriteError::MissingVariable(_)));
    }
}
