//! Encoding and decoding of a single chunk file.
//!
//! Each chunk is one file holding the raw little-endian bytes of its
//! elements in row-major order (§6). Fixed-width dtypes are a flat byte
//! blob; `string` chunks are a sequence of `u32` LE length-prefixed UTF-8
//! blobs, since text is not fixed-width.

use std::io::{self, Read, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};

use crate::array::batch::ColumnData;
use crate::data_type::DataType;

/// Write `data` to `path` as a chunk file, atomically (write-rename).
pub fn write_chunk(path: &Path, data: &ColumnData) -> io::Result<()> {
    let bytes = encode(data);
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read a chunk file back into a [`ColumnData`] with the given `dtype` and `shape`.
pub fn read_chunk(path: &Path, dtype: DataType, shape: &[usize]) -> io::Result<ColumnData> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    decode(&bytes, dtype, shape)
}

fn encode(data: &ColumnData) -> Vec<u8> {
    match data {
        ColumnData::F32(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ColumnData::F64(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ColumnData::I32(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ColumnData::I64(a) => a.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ColumnData::U8(a) => a.iter().copied().collect(),
        ColumnData::String(a) => {
            let mut out = Vec::new();
            for s in a.iter() {
                let bytes = s.as_bytes();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            out
        }
    }
}

fn decode(bytes: &[u8], dtype: DataType, shape: &[usize]) -> io::Result<ColumnData> {
    let len: usize = shape.iter().product();
    let dim = IxDyn(shape);
    let bad = |msg: &str| io::Error::new(io::ErrorKind::InvalidData, msg.to_string());
    match dtype {
        DataType::F32 => {
            let vals: Vec<f32> = bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            ArrayD::from_shape_vec(dim, vals)
                .map(ColumnData::F32)
                .map_err(|_| bad("chunk byte length does not match shape"))
        }
        DataType::F64 => {
            let vals: Vec<f64> = bytes
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect();
            ArrayD::from_shape_vec(dim, vals)
                .map(ColumnData::F64)
                .map_err(|_| bad("chunk byte length does not match shape"))
        }
        DataType::I32 => {
            let vals: Vec<i32> = bytes
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            ArrayD::from_shape_vec(dim, vals)
                .map(ColumnData::I32)
                .map_err(|_| bad("chunk byte length does not match shape"))
        }
        DataType::I64 => {
            let vals: Vec<i64> = bytes
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
                .collect();
            ArrayD::from_shape_vec(dim, vals)
                .map(ColumnData::I64)
                .map_err(|_| bad("chunk byte length does not match shape"))
        }
        DataType::U8 => ArrayD::from_shape_vec(dim, bytes.to_vec())
            .map(ColumnData::U8)
            .map_err(|_| bad("chunk byte length does not match shape")),
        DataType::String => {
            let mut vals = Vec::with_capacity(len);
            let mut pos = 0;
            while pos < bytes.len() && vals.len() < len {
                let n = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
                pos += 4;
                let s = String::from_utf8(bytes[pos..pos + n].to_vec())
                    .map_err(|_| bad("chunk contains invalid utf-8"))?;
                pos += n;
                vals.push(s);
            }
            while vals.len() < len {
                vals.push(String::new());
            }
            ArrayD::from_shape_vec(dim, vals)
                .map(ColumnData::String)
                .map_err(|_| bad("chunk byte length does not match shape"))
        }
    }
}
