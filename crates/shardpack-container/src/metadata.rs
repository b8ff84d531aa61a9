//! Metadata block encoding.

use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use shardpack_core::{ConfigMap, ConfigValue, Result, ShardpackError};

use crate::ValueTag;

/// Serializes a [`ConfigMap`] into the container's key/value block.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataEncoder;

impl MetadataEncoder {
    /// Write the pair count followed by every pair in map order.
    ///
    /// Returns the number of bytes written. I/O errors are reported as
    /// [`ShardpackError::Write`] against `path`.
    pub fn encode<W: Write>(writer: &mut W, config: &ConfigMap, path: &Path) -> Result<u64> {
        Self::encode_pairs(writer, config).map_err(|e| ShardpackError::write(path, e))
    }

    fn encode_pairs<W: Write>(writer: &mut W, config: &ConfigMap) -> std::io::Result<u64> {
        writer.write_u64::<LittleEndian>(config.len() as u64)?;
        let mut written = 8;

        for (key, value) in config.iter() {
            written += write_string(writer, key)?;
            writer.write_u32::<LittleEndian>(ValueTag::of(value) as u32)?;
            written += 4;

            written += match value {
                ConfigValue::String(s) => write_string(writer, s)?,
                ConfigValue::Int(i) => {
                    writer.write_i64::<LittleEndian>(*i)?;
                    8
                }
                ConfigValue::Float(x) => {
                    writer.write_f64::<LittleEndian>(*x)?;
                    8
                }
                ConfigValue::Bool(b) => {
                    writer.write_u8(u8::from(*b))?;
                    1
                }
            };
        }

        Ok(written)
    }
}

/// Write a u64 length-prefixed UTF-8 string.
fn write_string<W: Write>(writer: &mut W, s: &str) -> std::io::Result<u64> {
    let bytes = s.as_bytes();
    writer.write_u64::<LittleEndian>(bytes.len() as u64)?;
    writer.write_all(bytes)?;
    Ok(8 + bytes.len() as u64)
}
