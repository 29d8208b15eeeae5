//! Element types supported by the store and their fill values.
//!
//! See [`fill_value_for`]: a single typed function replaces scattering the
//! literal sentinels (`NaN`, `999`, `""`) throughout the writer.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// An element type an [`crate::array::Array`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum DataType {
    /// 32-bit IEEE float.
    #[display(fmt = "f32")]
    F32,
    /// 64-bit IEEE float.
    #[display(fmt = "f64")]
    F64,
    /// 32-bit signed integer.
    #[display(fmt = "i32")]
    I32,
    /// 64-bit signed integer.
    #[display(fmt = "i64")]
    I64,
    /// 8-bit unsigned integer, used for small flag/counter columns.
    #[display(fmt = "u8")]
    U8,
    /// Variable-length UTF-8 text.
    #[display(fmt = "string")]
    String,
}

impl DataType {
    /// The fixed width in bytes of one element, or `None` for variable-length text.
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::F32 | Self::I32 => Some(4),
            Self::F64 | Self::I64 => Some(8),
            Self::U8 => Some(1),
            Self::String => None,
        }
    }
}

/// The per-dtype sentinel denoting "no data" at a position.
///
/// NaN for floats, the domain sentinel `999` for `i32`/`i64`, `0` for `u8`
/// (a zeroed flag/counter reads as "unset", unlike the ambiguous `999`
/// truncated into a byte), and the empty string otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    /// Float fill value (NaN).
    F32(f32),
    /// Float fill value (NaN).
    F64(f64),
    /// Integer sentinel fill value.
    I32(i32),
    /// Integer sentinel fill value.
    I64(i64),
    /// Zero fill value.
    U8(u8),
    /// Empty string fill value.
    String,
}

/// Returns the fill value to use for `dtype`.
#[must_use]
pub fn fill_value_for(dtype: DataType) -> FillValue {
    match dtype {
        DataType::F32 => FillValue::F32(f32::NAN),
        DataType::F64 => FillValue::F64(f64::NAN),
        DataType::I32 => FillValue::I32(999),
        DataType::I64 => FillValue::I64(999),
        DataType::U8 => FillValue::U8(0),
        DataType::String => FillValue::String,
    }
}
