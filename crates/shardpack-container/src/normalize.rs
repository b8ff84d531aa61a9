//! Element-type normalization.
//!
//! The container stores every floating tensor at f32 or wider. F16 and BF16
//! are widened to f32, which is exact for every value including signed
//! zeros, subnormals, infinities and NaN payloads. Other supported types are
//! emitted as-is.

use std::borrow::Cow;

use half::{bf16, f16};
use shardpack_core::{Result, ShardpackError, TensorDtype, TensorRecord};

/// Rewrites tensor bytes into a representation the container supports.
#[derive(Debug, Default, Clone, Copy)]
pub struct DtypeNormalizer;

impl DtypeNormalizer {
    /// Bytes to emit for `record`.
    ///
    /// Pass-through types borrow the record's buffer.
    pub fn normalize(record: &TensorRecord) -> Result<Cow<'_, [u8]>> {
        Self::element_width(record)?;

        match record.dtype {
            TensorDtype::F16 => Ok(Cow::Owned(widen(&record.data, |b| {
                f16::from_le_bytes(b).to_f32()
            }))),
            TensorDtype::BF16 => Ok(Cow::Owned(widen(&record.data, |b| {
                bf16::from_le_bytes(b).to_f32()
            }))),
            _ => Ok(Cow::Borrowed(record.data.as_slice())),
        }
    }

    /// Length in bytes of the normalized output, without converting.
    pub fn normalized_len(record: &TensorRecord) -> Result<usize> {
        let width = Self::element_width(record)?;
        if record.dtype.is_reduced_float() {
            Ok(record.data.len() / width * 4)
        } else {
            Ok(record.data.len())
        }
    }

    /// Width of one input element, rejecting types and buffers that cannot
    /// be emitted faithfully.
    fn element_width(record: &TensorRecord) -> Result<usize> {
        let unsupported = |dtype: String| ShardpackError::UnsupportedDtype {
            name: record.name.clone(),
            dtype,
        };

        let width = match &record.dtype {
            TensorDtype::F8E4M3 | TensorDtype::F8E5M2 | TensorDtype::Other(_) => {
                return Err(unsupported(record.dtype.to_string()));
            }
            dtype => dtype
                .size_bytes()
                .ok_or_else(|| unsupported(dtype.to_string()))?,
        };

        if record.data.len() % width != 0 {
            return Err(unsupported(format!(
                "{} buffer of {} bytes is not a whole number of elements",
                record.dtype,
                record.data.len()
            )));
        }

        Ok(width)
    }
}

fn widen(data: &[u8], to_f32: impl Fn([u8; 2]) -> f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for chunk in data.chunks_exact(2) {
        out.extend_from_slice(&to_f32([chunk[0], chunk[1]]).to_le_bytes());
    }
    out
}
