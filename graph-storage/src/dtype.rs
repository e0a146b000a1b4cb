//! Parameter dtypes and byte conversion to/from the f32 working buffer.

use crate::error::{Result, StorageError};
use safetensors::Dtype;

/// Storage dtype of a parameter tensor.
///
/// Values are always held as f32 while pruning; the dtype decides how the
/// buffer is written back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamDtype {
    #[default]
    F32,
    F16,
    BF16,
}

impl ParamDtype {
    /// Bytes per element on disk.
    pub fn size(self) -> usize {
        match self {
            ParamDtype::F32 => 4,
            ParamDtype::F16 | ParamDtype::BF16 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamDtype::F32 => "F32",
            ParamDtype::F16 => "F16",
            ParamDtype::BF16 => "BF16",
        }
    }

    pub fn to_safetensors(self) -> Dtype {
        match self {
            ParamDtype::F32 => Dtype::F32,
            ParamDtype::F16 => Dtype::F16,
            ParamDtype::BF16 => Dtype::BF16,
        }
    }
}

impl TryFrom<Dtype> for ParamDtype {
    type Error = StorageError;

    fn try_from(dtype: Dtype) -> Result<Self> {
        match dtype {
            Dtype::F32 => Ok(ParamDtype::F32),
            Dtype::F16 => Ok(ParamDtype::F16),
            Dtype::BF16 => Ok(ParamDtype::BF16),
            other => Err(StorageError::UnsupportedDtype(format!("{:?}", other))),
        }
    }
}

/// Convert raw little-endian bytes to f32 based on dtype.
pub fn bytes_to_f32(data: &[u8], dtype: ParamDtype, count: usize) -> Result<Vec<f32>> {
    let expected = count * dtype.size();
    if data.len() != expected {
        return Err(StorageError::ByteSize {
            dtype: dtype.as_str(),
            expected,
            got: data.len(),
        });
    }

    let values = match dtype {
        ParamDtype::F32 => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        ParamDtype::F16 => data
            .chunks_exact(2)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        ParamDtype::BF16 => data
            .chunks_exact(2)
            .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
    };
    Ok(values)
}

/// Encode f32 values as little-endian bytes of the given dtype.
pub fn f32_to_bytes(values: &[f32], dtype: ParamDtype) -> Vec<u8> {
    match dtype {
        ParamDtype::F32 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ParamDtype::F16 => values
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
            .collect(),
        ParamDtype::BF16 => values
            .iter()
            .flat_map(|&v| half::bf16::from_f32(v).to_le_bytes())
            .collect(),
    }
}
