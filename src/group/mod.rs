//! Group: a named persistent container of arrays and attributes (§3 "Group", §4.A).
//!
//! `open` creates the group directory (and an empty `attrs.json`) if absent,
//! otherwise loads the existing attribute file and every array subdirectory
//! it finds. Concurrent `open` from multiple workers is safe: all metadata
//! mutation takes the per-path advisory lock from [`crate::lock`].

pub mod attribute_merge;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::array::{Array, ColumnData};
use crate::data_type::DataType;
use crate::error::StorageError;
use crate::lock::group_lock;

pub use attribute_merge::combine_attributes;

const ATTRS_FILE: &str = "attrs.json";
const ARRAY_META_FILE: &str = ".array.json";

/// A named persistent container of [`Array`]s and attributes, identified by
/// a filesystem path (§3 "Group").
#[derive(Debug)]
pub struct Group {
    path: PathBuf,
    attrs: Map<String, Value>,
    arrays: std::collections::HashMap<String, Array>,
}

impl Group {
    /// Open a group at `path`, creating it (and an empty attribute file) if absent.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem or descriptor-parse failure, or
    /// [`StorageError::NotAGroup`] if `path` exists and is not a directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if path.exists() && !path.is_dir() {
            return Err(StorageError::NotAGroup(path));
        }
        let lock = group_lock(&path);
        let _guard = lock.lock();

        std::fs::create_dir_all(&path)?;
        let attrs_path = path.join(ATTRS_FILE);
        let attrs = if attrs_path.exists() {
            let bytes = std::fs::read(&attrs_path)?;
            serde_json::from_slice(&bytes)?
        } else {
            let empty = Map::new();
            write_attrs(&path, &empty)?;
            empty
        };

        let mut arrays = std::collections::HashMap::new();
        for entry in WalkDir::new(&path).min_depth(1).max_depth(1).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_dir() && entry.path().join(ARRAY_META_FILE).exists() {
                let name = entry.file_name().to_string_lossy().into_owned();
                let array = Array::open(entry.path().to_path_buf())?;
                arrays.insert(name, array);
            }
        }

        Ok(Self { path, attrs, arrays })
    }

    /// Re-read this group's attributes and every array's descriptor from
    /// disk, observing writes made by other workers, in the manner of
    /// `reload_zarr_records`.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem or descriptor-parse failure.
    pub fn reload(&mut self) -> Result<(), StorageError> {
        let bytes = std::fs::read(self.path.join(ATTRS_FILE))?;
        self.attrs = serde_json::from_slice(&bytes)?;
        for array in self.arrays.values_mut() {
            array.reload()?;
        }
        Ok(())
    }

    /// Create a new array, or return the existing one if `name` already
    /// exists with a matching dtype and chunk size.
    ///
    /// # Errors
    /// Returns [`StorageError::SchemaConflict`] if `name` already exists
    /// with a different dtype or chunk size.
    pub fn create_array(
        &mut self,
        name: &str,
        dtype: DataType,
        shape: Vec<u64>,
        chunk_size: u64,
        dim_names: Vec<String>,
    ) -> Result<&Array, StorageError> {
        let lock = group_lock(&self.path);
        let _guard = lock.lock();
        let array = Array::create(self.path.join(name), name, dtype, shape, chunk_size, dim_names)?;
        self.arrays.insert(name.to_string(), array);
        Ok(self.arrays.get(name).expect("just inserted"))
    }

    /// Resize `name`'s append dimension. Monotonically non-decreasing.
    ///
    /// # Errors
    /// Returns [`StorageError::NoSuchArray`] if no array named `name` exists,
    /// or [`StorageError`] on filesystem failure.
    pub fn resize_array(&mut self, name: &str, new_len: u64) -> Result<(), StorageError> {
        let lock = group_lock(&self.path);
        let _guard = lock.lock();
        let array = self.arrays.get_mut(name).ok_or_else(|| StorageError::NoSuchArray(name.to_string()))?;
        array.resize_append(new_len)
    }

    /// Grow `name`'s secondary (`beam`) dimension, backfilling new columns
    /// with the array's fill value. No-op if the array is rank 1 or
    /// `new_len` does not exceed the current secondary length.
    ///
    /// # Errors
    /// Returns [`StorageError::NoSuchArray`] if no array named `name` exists,
    /// or [`StorageError`] on filesystem failure.
    pub fn resize_secondary(&mut self, name: &str, new_len: u64) -> Result<(), StorageError> {
        let lock = group_lock(&self.path);
        let _guard = lock.lock();
        let array = self.arrays.get_mut(name).ok_or_else(|| StorageError::NoSuchArray(name.to_string()))?;
        array.resize_secondary(new_len)
    }

    /// This group's attribute dictionary.
    #[must_use]
    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    /// Set a single attribute, persisting the attribute file immediately.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure.
    pub fn set_attr(&mut self, key: impl Into<String>, value: Value) -> Result<(), StorageError> {
        let lock = group_lock(&self.path);
        let _guard = lock.lock();
        self.attrs.insert(key.into(), value);
        write_attrs(&self.path, &self.attrs)
    }

    /// Fold an already-merged attribute dictionary into this group's
    /// attributes, persisting the result immediately.
    ///
    /// # Errors
    /// Returns [`StorageError`] on filesystem failure.
    pub fn apply_merged_attrs(&mut self, merged: Map<String, Value>) -> Result<(), StorageError> {
        let lock = group_lock(&self.path);
        let _guard = lock.lock();
        for (k, v) in merged {
            self.attrs.insert(k, v);
        }
        write_attrs(&self.path, &self.attrs)
    }

    /// Names of every array currently registered in this group, sorted.
    #[must_use]
    pub fn array_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.arrays.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up an array by name.
    #[must_use]
    pub fn array(&self, name: &str) -> Option<&Array> {
        self.arrays.get(name)
    }

    /// Look up an array by name, mutably.
    #[must_use]
    pub fn array_mut(&mut self, name: &str) -> Option<&mut Array> {
        self.arrays.get_mut(name)
    }

    /// The group's current append-dim length, taken from any one array
    /// (every array in a group shares the same append-dim length per the
    /// store-wide invariant), or `None` if the group holds no arrays yet.
    #[must_use]
    pub fn append_len(&self) -> Option<u64> {
        self.arrays.values().next().map(|a| a.meta().shape.first().copied().unwrap_or(0))
    }

    /// Whether the `time` array already contains the exact value `t`
    /// (supplement; `validate_merge` against `_xyz_time_coord`-backed
    /// lookups in the original). Used by the Chunk Writer's merge-bounds
    /// check and independently useful to callers probing mergeability
    /// before committing a write.
    #[must_use]
    pub fn time_contains(&self, t: f64) -> bool {
        let Some(time) = self.arrays.get("time") else {
            return false;
        };
        let len = time.meta().shape.first().copied().unwrap_or(0);
        if len == 0 {
            return false;
        }
        match time.read_rows(0..len) {
            Ok(ColumnData::F64(values)) => values.iter().any(|&v| v == t),
            _ => false,
        }
    }

    /// This group's on-disk directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_attrs(path: &Path, attrs: &Map<String, Value>) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(attrs)?;
    let tmp = path.join(format!("{ATTRS_FILE}.tmp"));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path.join(ATTRS_FILE))?;
    Ok(())
}
