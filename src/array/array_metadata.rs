//! On-disk per-array descriptor (`.array.json`).
//!
//! See <ArraySubset>-free layout: a group holds one directory per array, and
//! each array directory carries a small JSON descriptor alongside its chunk
//! files (§6). This is the Rust type for that descriptor.

use serde::{Deserialize, Serialize};

use crate::data_type::DataType;

/// The persisted shape, chunking, dtype, and dimension names of an [`crate::array::Array`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArrayMetadata {
    /// Element type.
    pub dtype: DataType,
    /// Current shape. Rank 1 (`[time]`) or rank 2 (`[time, beam]`).
    pub shape: Vec<u64>,
    /// Fixed chunk size along the append (`time`) dimension.
    pub chunk_size: u64,
    /// Dimension names, one per entry of `shape`.
    pub dim_names: Vec<String>,
}

impl ArrayMetadata {
    /// Number of chunks currently spanning the append dimension.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        let len = self.shape.first().copied().unwrap_or(0);
        if self.chunk_size == 0 {
            0
        } else {
            len.div_ceil(self.chunk_size)
        }
    }

    /// Secondary (beam) dimension length, if this array has rank 2.
    #[must_use]
    pub fn secondary_len(&self) -> Option<u64> {
        self.shape.get(1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_chunks_rounds_up() {
        let meta = ArrayMetadata {
            dtype: DataType::F64,
            shape: vec![1001],
            chunk_size: 500,
            dim_names: vec!["time".to_string()],
        };
        assert_eq!(meta.num_chunks(), 3);
    }

    #[test]
    fn num_chunks_exact() {
        let meta = ArrayMetadata {
            dtype: DataType::F64,
            shape: vec![1000],
            chunk_size: 500,
            dim_names: vec!["time".to_string()],
        };
        assert_eq!(meta.num_chunks(), 2);
    }
}
