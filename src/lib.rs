//! A chunked columnar datastore for multibeam sounding data.
//!
//! Data lives in [`group::Group`]s: named directories holding typed
//! [`array::Array`]s plus a merged attribute dictionary. The [`writer`] and
//! [`dispatcher`] place [`array::Batch`]es at caller-given row ranges across
//! one or more workers; [`interp`] resamples onto a new time base,
//! [`gaps`] finds coverage holes, [`ragged`] handles per-row ragged-beam
//! data, and [`chunk_slice`] partitions row ranges along the chunk grid that
//! every other module keys its parallelism off of.

pub mod array;
pub mod chunk_slice;
pub mod config;
pub mod data_type;
pub mod dispatcher;
pub mod error;
pub mod gaps;
pub mod group;
pub mod interp;
pub mod lock;
pub mod ragged;
pub mod writer;

pub use array::{Array, ArrayMetadata, Batch, ColumnData, Variable};
pub use data_type::DataType;
pub use dispatcher::{distribute, WriteTask};
pub use error::{GapError, InterpError, StorageError, WriteError};
pub use group::{combine_attributes, Group};
