//! In-memory typed blocks (§3 "Batch").
//!
//! A [`Batch`] is the typed, dense block a raw-file parser hands to the
//! [`crate::writer`] for one coordinated write task. It lives only for the
//! duration of that call.

use std::collections::HashMap;

use ndarray::ArrayD;

use crate::data_type::DataType;
use crate::error::WriteError;

/// A single variable's data within a [`Batch`], dense and rectangular.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// 32-bit float data, rank 1 or 2.
    F32(ArrayD<f32>),
    /// 64-bit float data, rank 1 or 2.
    F64(ArrayD<f64>),
    /// 32-bit integer data, rank 1 or 2.
    I32(ArrayD<i32>),
    /// 64-bit integer data, rank 1 or 2.
    I64(ArrayD<i64>),
    /// 8-bit unsigned integer data, rank 1 or 2.
    U8(ArrayD<u8>),
    /// Text data, rank 1 or 2.
    String(ArrayD<String>),
}

impl ColumnData {
    /// The dtype this column holds.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        match self {
            Self::F32(_) => DataType::F32,
            Self::F64(_) => DataType::F64,
            Self::I32(_) => DataType::I32,
            Self::I64(_) => DataType::I64,
            Self::U8(_) => DataType::U8,
            Self::String(_) => DataType::String,
        }
    }

    /// The shape of this column's data.
    #[must_use]
    pub fn shape(&self) -> Vec<u64> {
        let shape = match self {
            Self::F32(a) => a.shape(),
            Self::F64(a) => a.shape(),
            Self::I32(a) => a.shape(),
            Self::I64(a) => a.shape(),
            Self::U8(a) => a.shape(),
            Self::String(a) => a.shape(),
        };
        shape.iter().map(|&d| d as u64).collect()
    }

    /// Length along the append (`time`) dimension.
    #[must_use]
    pub fn time_len(&self) -> u64 {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Length along the secondary (`beam`) dimension, if rank 2.
    #[must_use]
    pub fn secondary_len(&self) -> Option<u64> {
        self.shape().get(1).copied()
    }
}

/// One variable within a [`Batch`]: its data plus the dimension names for each axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// The variable's data.
    pub data: ColumnData,
    /// Dimension name per axis of `data`, e.g. `["time"]` or `["time", "beam"]`.
    pub dim_names: Vec<String>,
}

impl Variable {
    /// Create a new variable, deriving canonical dim names from its rank.
    #[must_use]
    pub fn new(data: ColumnData) -> Self {
        let dim_names = match data.shape().len() {
            1 => vec!["time".to_string()],
            _ => vec!["time".to_string(), "beam".to_string()],
        };
        Self { data, dim_names }
    }
}

/// An in-memory typed block of one or more variables sharing a `time` length,
/// about to be written at a caller-specified row range (§3).
#[derive(Debug, Clone, Default)]
pub struct Batch {
    variables: HashMap<String, Variable>,
}

impl Batch {
    /// Build a batch from named variables, verifying they all share the same `time` length.
    ///
    /// # Errors
    /// Returns [`WriteError::InconsistentBatchLength`] if any variable's `time` length disagrees with the first.
    pub fn new(variables: HashMap<String, Variable>) -> Result<Self, WriteError> {
        let mut expected = None;
        for (name, var) in &variables {
            let len = var.data.time_len();
            match expected {
                None => expected = Some(len),
                Some(exp) if exp != len => {
                    return Err(WriteError::InconsistentBatchLength {
                        variable: name.clone(),
                        actual: len,
                        expected: exp,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(Self { variables })
    }

    /// The shared `time` length of every variable in this batch, or `0` if empty.
    #[must_use]
    pub fn time_len(&self) -> u64 {
        self.variables.values().next().map(|v| v.data.time_len()).unwrap_or(0)
    }

    /// Iterate over the batch's `(name, variable)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.variables.iter()
    }

    /// Look up a variable by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Variable names present in this batch.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn consistent_lengths_build() {
        let mut vars = HashMap::new();
        vars.insert(
            "x".to_string(),
            Variable::new(ColumnData::F64(array![1.0, 2.0, 3.0].into_dyn())),
        );
        vars.insert(
            "y".to_string(),
            Variable::new(ColumnData::I32(array![1, 2, 3].into_dyn())),
        );
        let batch = Batch::new(vars).unwrap();
        assert_eq!(batch.time_len(), 3);
    }

    #[test]
    fn inconsistent_lengths_reject() {
        let mut vars = HashMap::new();
        vars.insert(
            "x".to_string(),
            Variable::new(ColumnData::F64(array![1.0, 2.0, 3.0].into_dyn())),
        );
        vars.insert(
            "y".to_string(),
            Variable::new(ColumnData::I32(array![1, 2].into_dyn())),
        );
        assert!(matches!(
            Batch::new(vars),
            Err(WriteError::InconsistentBatchLength { .. })
        ));
    }

    #[test]
    fn default_dim_names_by_rank() {
        let v1 = Variable::new(ColumnData::F64(array![1.0, 2.0].into_dyn()));
        assert_eq!(v1.dim_names, vec!["time".to_string()]);
        let v2 = Variable::new(ColumnData::F64(array![[1.0, 2.0], [3.0, 4.0]].into_dyn()));
        assert_eq!(v2.dim_names, vec!["time".to_string(), "beam".to_string()]);
    }
}
