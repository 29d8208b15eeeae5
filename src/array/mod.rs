//! Persistent typed N-dimensional arrays (§3 "Array", §4.A).
//!
//! An [`Array`] is a dense rectangular typed block stored as one file per
//! chunk grid cell under its own directory, alongside a small JSON
//! descriptor (`.array.json`). Only the append (first) dimension is
//! chunked — a deliberate simplification over a general N-dimensional chunk
//! grid; the secondary (`beam`) dimension, when present, always spans the
//! chunk in full.

pub mod array_metadata;
pub mod batch;
pub mod chunk_io;

use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use ndarray::{s, ArrayD, IxDyn};

use crate::chunk_slice::{chunk_slices, chunks_overlapping};
use crate::data_type::{fill_value_for, DataType, FillValue};
use crate::error::StorageError;

pub use array_metadata::ArrayMetadata;
pub use batch::{Batch, ColumnData, Variable};

const METADATA_FILE: &str = ".array.json";

/// A persistent typed N-dimensional array backed by one chunk file per cell
/// along its append dimension.
#[derive(Debug)]
pub struct Array {
    dir: PathBuf,
    meta: ArrayMetadata,
}

impl Array {
    /// Create a new array directory and persist its descriptor.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure, or
    /// [`StorageError::SchemaConflict`] if an array already exists at `dir`
    /// with a different dtype or chunk size.
    pub fn create(
        dir: PathBuf,
        name: &str,
        dtype: DataType,
        shape: Vec<u64>,
        chunk_size: u64,
        dim_names: Vec<String>,
    ) -> Result<Self, StorageError> {
        if dir.join(METADATA_FILE).exists() {
            let existing = Self::open(dir.clone())?;
            if existing.meta.dtype != dtype || existing.meta.chunk_size != chunk_size {
                return Err(StorageError::SchemaConflict {
                    name: name.to_string(),
                    existing_dtype: existing.meta.dtype.to_string(),
                    existing_chunks: existing.meta.chunk_size,
                    requested_dtype: dtype.to_string(),
                    requested_chunks: chunk_size,
                });
            }
            return Ok(existing);
        }
        std::fs::create_dir_all(&dir)?;
        let meta = ArrayMetadata { dtype, shape, chunk_size, dim_names };
        let array = Self { dir, meta };
        array.persist_meta()?;
        Ok(array)
    }

    /// Open an existing array directory, reading its descriptor.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the descriptor is missing or malformed.
    pub fn open(dir: PathBuf) -> Result<Self, StorageError> {
        let bytes = std::fs::read(dir.join(METADATA_FILE))?;
        let meta: ArrayMetadata = serde_json::from_slice(&bytes)?;
        Ok(Self { dir, meta })
    }

    /// Re-read this array's descriptor from disk, observing writes made by other workers.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem or deserialization failure.
    pub fn reload(&mut self) -> Result<(), StorageError> {
        let bytes = std::fs::read(self.dir.join(METADATA_FILE))?;
        self.meta = serde_json::from_slice(&bytes)?;
        Ok(())
    }

    fn persist_meta(&self) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(&self.meta)?;
        let tmp = self.dir.join(format!("{METADATA_FILE}.tmp"));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, self.dir.join(METADATA_FILE))?;
        Ok(())
    }

    /// This array's descriptor.
    #[must_use]
    pub fn meta(&self) -> &ArrayMetadata {
        &self.meta
    }

    fn chunk_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("chunk.{index}"))
    }

    fn chunk_shape(&self, index: u64) -> Vec<usize> {
        let slices = chunk_slices(self.meta.shape.first().copied().unwrap_or(0), self.meta.chunk_size);
        let rows = slices.get(index as usize).map_or(0, |r| (r.end - r.start) as usize);
        match self.meta.secondary_len() {
            Some(sec) => vec![rows, sec as usize],
            None => vec![rows],
        }
    }

    fn load_chunk_or_fill(&self, index: u64) -> Result<ColumnData, StorageError> {
        let path = self.chunk_path(index);
        let shape = self.chunk_shape(index);
        if path.exists() {
            Ok(chunk_io::read_chunk(&path, self.meta.dtype, &shape)?)
        } else {
            Ok(fill_column(self.meta.dtype, &shape))
        }
    }

    /// Resize the append dimension. Monotonically non-decreasing; the core never truncates.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure.
    pub fn resize_append(&mut self, new_len: u64) -> Result<(), StorageError> {
        if self.meta.shape.is_empty() {
            self.meta.shape.push(new_len);
        } else {
            self.meta.shape[0] = self.meta.shape[0].max(new_len);
        }
        self.persist_meta()
    }

    /// Grow the secondary (`beam`) dimension, backfilling new columns of
    /// every existing on-disk chunk with this array's fill value.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure. No-op if `new_len`
    /// does not exceed the current secondary length.
    pub fn resize_secondary(&mut self, new_len: u64) -> Result<(), StorageError> {
        let Some(current) = self.meta.secondary_len() else {
            return Ok(());
        };
        if new_len <= current {
            return Ok(());
        }
        for idx in 0..self.meta.num_chunks() {
            let path = self.chunk_path(idx);
            if !path.exists() {
                continue;
            }
            let old_shape = self.chunk_shape(idx);
            let existing = chunk_io::read_chunk(&path, self.meta.dtype, &old_shape)?;
            let rows = old_shape[0];
            let grown = extend_secondary(&existing, new_len as usize);
            let _ = rows;
            chunk_io::write_chunk(&path, &grown)?;
        }
        self.meta.shape[1] = new_len;
        self.persist_meta()
    }

    /// Write `data` into `row_range` of this array, chunk by chunk.
    ///
    /// If `data`'s length is shorter than `row_range`'s span (a naturally
    /// short final batch), the written slice is narrowed to `data`'s actual
    /// length.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure.
    pub fn write_rows(&self, row_range: Range<u64>, data: &ColumnData) -> Result<(), StorageError> {
        let actual_len = data.time_len();
        let span = row_range.end - row_range.start;
        let row_range = if actual_len < span {
            row_range.start..(row_range.start + actual_len)
        } else {
            row_range
        };
        for (chunk_idx, within_chunk, within_range) in chunks_overlapping(&row_range, self.meta.chunk_size) {
            let mut chunk = self.load_chunk_or_fill(chunk_idx)?;
            assign_rows(
                &mut chunk,
                within_chunk.start as usize..within_chunk.end as usize,
                data,
                within_range.start as usize..within_range.end as usize,
            );
            chunk_io::write_chunk(&self.chunk_path(chunk_idx), &chunk)?;
        }
        Ok(())
    }

    /// Read `row_range` of this array back, chunk by chunk, returning fill
    /// values for any position never written.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure.
    pub fn read_rows(&self, row_range: Range<u64>) -> Result<ColumnData, StorageError> {
        let secondary = self.meta.secondary_len();
        let out_shape: Vec<usize> = match secondary {
            Some(sec) => vec![(row_range.end - row_range.start) as usize, sec as usize],
            None => vec![(row_range.end - row_range.start) as usize],
        };
        let mut out = fill_column(self.meta.dtype, &out_shape);
        for (chunk_idx, within_chunk, within_range) in chunks_overlapping(&row_range, self.meta.chunk_size) {
            let chunk = self.load_chunk_or_fill(chunk_idx)?;
            assign_rows(
                &mut out,
                within_range.start as usize..within_range.end as usize,
                &chunk,
                within_chunk.start as usize..within_chunk.end as usize,
            );
        }
        Ok(out)
    }

    /// This array's on-disk directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Stamp this array's `dim_names` annotation, persisting if it changed.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure.
    pub fn set_dim_names(&mut self, dim_names: Vec<String>) -> Result<(), StorageError> {
        if self.meta.dim_names == dim_names {
            return Ok(());
        }
        self.meta.dim_names = dim_names;
        self.persist_meta()
    }
}

/// Build an array filled entirely with `dtype`'s fill value.
pub(crate) fn fill_column(dtype: DataType, shape: &[usize]) -> ColumnData {
    match fill_value_for(dtype) {
        FillValue::F32(v) => ColumnData::F32(ArrayD::from_elem(IxDyn(shape), v)),
        FillValue::F64(v) => ColumnData::F64(ArrayD::from_elem(IxDyn(shape), v)),
        FillValue::I32(v) => ColumnData::I32(ArrayD::from_elem(IxDyn(shape), v)),
        FillValue::I64(v) => ColumnData::I64(ArrayD::from_elem(IxDyn(shape), v)),
        FillValue::U8(v) => ColumnData::U8(ArrayD::from_elem(IxDyn(shape), v)),
        FillValue::String => ColumnData::String(ArrayD::from_elem(IxDyn(shape), String::new())),
    }
}

macro_rules! dispatch_pair {
    ($dest:expr, $src:expr, |$d:ident, $s:ident| $body:block) => {
        match ($dest, $src) {
            (ColumnData::F32($d), ColumnData::F32($s)) => $body,
            (ColumnData::F64($d), ColumnData::F64($s)) => $body,
            (ColumnData::I32($d), ColumnData::I32($s)) => $body,
            (ColumnData::I64($d), ColumnData::I64($s)) => $body,
            (ColumnData::U8($d), ColumnData::U8($s)) => $body,
            (ColumnData::String($d), ColumnData::String($s)) => $body,
            _ => panic!("pingstore: dtype mismatch between array and batch data"),
        }
    };
}

/// Copy `src[src_rows]` into `dest[dest_rows]`, narrowing to `src`'s
/// secondary width if `dest` has more columns than `src`.
pub(crate) fn assign_rows(
    dest: &mut ColumnData,
    dest_rows: Range<usize>,
    src: &ColumnData,
    src_rows: Range<usize>,
) {
    dispatch_pair!(dest, src, |dst, source| {
        if dst.ndim() == 1 {
            let mut dv = dst.slice_mut(s![dest_rows.clone()]);
            let sv = source.slice(s![src_rows.clone()]);
            dv.assign(&sv);
        } else {
            let sec = source.shape()[1];
            let mut dv = dst.slice_mut(s![dest_rows.clone(), 0..sec]);
            let sv = source.slice(s![src_rows.clone(), ..]);
            dv.assign(&sv);
        }
    });
}

/// Return a copy of `col` with its secondary dimension grown to `new_secondary`,
/// backfilled with `col`'s dtype fill value.
pub(crate) fn extend_secondary(col: &ColumnData, new_secondary: usize) -> ColumnData {
    let shape = col.shape();
    let time_len = shape[0] as usize;
    let mut grown = fill_column(col.dtype(), &[time_len, new_secondary]);
    assign_rows(&mut grown, 0..time_len, col, 0..time_len);
    grown
}

/// Check equality of two columns, used to validate static coordinates (`beam`, `xyz`)
/// are unchanged across writes.
#[must_use]
pub fn columns_equal(a: &ColumnData, b: &ColumnData) -> bool {
    match (a, b) {
        (ColumnData::F32(x), ColumnData::F32(y)) => x == y,
        (ColumnData::F64(x), ColumnData::F64(y)) => x == y,
        (ColumnData::I32(x), ColumnData::I32(y)) => x == y,
        (ColumnData::I64(x), ColumnData::I64(y)) => x == y,
        (ColumnData::U8(x), ColumnData::U8(y)) => x == y,
        (ColumnData::String(x), ColumnData::String(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn create_then_write_then_read() {
        let dir = tempdir().unwrap();
        let mut arr = Array::create(
            dir.path().join("x"),
            "x",
            DataType::F64,
            vec![0],
            500,
            vec!["time".to_string()],
        )
        .unwrap();
        arr.resize_append(2000).unwrap();
        let batch0 = ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[1000]), (0..1000).map(f64::from).collect()).unwrap());
        arr.write_rows(0..1000, &batch0).unwrap();
        let batch1 = ColumnData::F64(ArrayD::from_shape_vec(IxDyn(&[1000]), (1000..2000).map(f64::from).collect()).unwrap());
        arr.write_rows(1000..2000, &batch1).unwrap();

        let back = arr.read_rows(0..2000).unwrap();
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
    fn secondary_growth_backfills_fill_value() {
        let dir = tempdir().unwrap();
        let mut arr = Array::create(
            dir.path().join("x"),
            "x",
            DataType::F64,
            vec![0, 256],
            100,
            vec!["time".to_string(), "beam".to_string()],
        )
        .unwrap();
        arr.resize_append(100).unwrap();
        let data = ColumnData::F64(ArrayD::from_elem(IxDyn(&[100, 256]), 1.0));
        arr.write_rows(0..100, &data).unwrap();

        arr.resize_secondary(400).unwrap();
        let back = arr.read_rows(0..100).unwrap();
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
    fn short_final_batch_narrows_write() {
        let dir = tempdir().unwrap();
        let mut arr = Array::create(
            dir.path().join("x"),
            "x",
            DataType::F64,
            vec![0],
            500,
            vec!["time".to_string()],
        )
        .unwrap();
        arr.resize_append(1300).unwrap();
        let tail = ColumnData::F64(array![1.0, 2.0, 3.0].into_dyn());
        arr.write_rows(1000..1300, &tail).unwrap();
        let back = arr.read_rows(1000..1300).unwrap();
        match back {
            ColumnData::F64(a) => {
                assert_eq!(a[0], 1.0);
                assert_eq!(a[1], 2.0);
                assert_eq!(a[2], 3.0);
                assert!(a[3].is_nan());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn schema_conflict_on_dtype_mismatch() {
        let dir = tempdir().unwrap();
        Array::create(dir.path().join("x"), "x", DataType::F64, vec![0], 500, vec!["time".to_string()]).unwrap();
        let err = Array::create(dir.path().join("x"), "x", DataType::I32, vec![0], 500, vec!["time".to_string()])
            .unwrap_err();
        assert!(matches!(err, StorageError::SchemaConflict { .. }));
    }
}
