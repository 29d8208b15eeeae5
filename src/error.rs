//! Error types for the chunked columnar store.
//!
//! Each failure domain gets its own `thiserror`-derived enum, composed the
//! way [`crate::storage`] composes `StorageError`: `#[error(transparent)]`
//! variants wrapping a `#[from]` source, plus a handful of named variants
//! with their own message.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the on-disk path/chunk layout (§4.A).
#[derive(Debug, Error)]
pub enum StorageError {
    /// An IO error reading or writing a group, array descriptor, or chunk file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An error serializing or deserializing a JSON descriptor.
    #[error(transparent)]
    InvalidJson(#[from] serde_json::Error),
    /// An array was asked to be re-created with a different dtype or chunk size.
    #[error("array {name:?} already exists with dtype {existing_dtype} and chunk size {existing_chunks}, cannot re-create with dtype {requested_dtype} and chunk size {requested_chunks}")]
    SchemaConflict {
        /// Array name.
        name: String,
        /// The dtype already on disk.
        existing_dtype: String,
        /// The chunk size already on disk.
        existing_chunks: u64,
        /// The dtype the caller requested.
        requested_dtype: String,
        /// The chunk size the caller requested.
        requested_chunks: u64,
    },
    /// No array exists with the given name.
    #[error("no array named {0:?} in group")]
    NoSuchArray(String),
    /// The group path exists but is not a directory.
    #[error("group path {0:?} exists and is not a directory")]
    NotAGroup(PathBuf),
}

/// Errors from the chunk writer and write dispatcher (§4.C, §4.D, §4.H).
#[derive(Debug, Error)]
pub enum WriteError {
    /// A storage-layer error propagated from the path/chunk layout.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A merge-mode batch's first time value does not already exist in the group.
    #[error("merge write for variable {variable:?} requires the batch's first time value ({first_time}) to already exist in the group")]
    MergeBoundsError {
        /// The variable being merged in.
        variable: String,
        /// The offending first time value.
        first_time: f64,
    },
    /// A static coordinate (`beam`, `xyz`) differs from the value already on disk.
    #[error("coordinate {0:?} conflicts with the value already stored in the group")]
    CoordinateConflict(String),
    /// An attribute key's value changed JSON type across batches.
    #[error("attribute {key:?} changed type across batches: {previous_type} -> {new_type}")]
    AttributeConflict {
        /// The offending attribute key.
        key: String,
        /// The JSON type of the previously merged value.
        previous_type: &'static str,
        /// The JSON type of the newly merged value.
        new_type: &'static str,
    },
    /// The caller's row ranges disagree with the array's fixed chunk size and rechunking was required.
    #[error("rebase_write_offsets: first range length {first_range_len} does not match array chunk size {chunk_size}; this store has no rechunking facility")]
    RechunkUnsupported {
        /// Length of the caller's first queued range.
        first_range_len: u64,
        /// The array's fixed chunk size.
        chunk_size: u64,
    },
    /// A batch did not carry a variable required by the write.
    #[error("batch is missing variable {0:?}")]
    MissingVariable(String),
    /// A batch's variables disagree on their time length.
    #[error("variable {variable:?} has time length {actual}, expected {expected} to match the rest of the batch")]
    InconsistentBatchLength {
        /// The variable with the mismatched length.
        variable: String,
        /// The length found.
        actual: u64,
        /// The length expected.
        expected: u64,
    },
}

/// Errors from the chunk-aware interpolator (§4.E).
#[derive(Debug, Error)]
pub enum InterpError {
    /// The source series is not one of the accepted array kinds, or has more than one dimension.
    #[error("interpolator source must be a 1-D float series, got rank {0}")]
    InterpInputError(usize),
    /// `target_times` is not non-decreasing.
    #[error("target_times must be non-decreasing")]
    InterpOrderError,
}

/// Errors from the gap detector (§4.F).
#[derive(Debug, Error)]
pub enum GapError {
    /// A time series contained a non-finite value (NaN or infinite).
    #[error("{series} time series contains a non-finite value at index {index}")]
    NonFiniteTime {
        /// Which series (`"candidate"` or `"reference"`) the bad value came from.
        series: &'static str,
        /// Index of the offending value.
        index: usize,
    },
}
