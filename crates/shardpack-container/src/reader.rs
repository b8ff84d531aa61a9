//! Container header reader.
//!
//! Reads the fixed header and the metadata block of a container file and
//! reports where the tensor data block begins. Tensor data itself is not
//! interpreted; splitting it requires an external shape/dtype manifest.
//!
//! # Example
//!
//! ```ignore
//! use shardpack_container::ContainerHeader;
//!
//! let header = ContainerHeader::from_file("model.gguf")?;
//! println!("{} tensors, data at offset {}", header.tensor_count, header.data_offset);
//! ```

use std::io::Read;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use shardpack_core::{ConfigMap, ConfigValue, Result, ShardpackError};

use crate::{ValueTag, CONTAINER_MAGIC, CONTAINER_VERSION, HEADER_SIZE};

/// Maximum accepted string length in the metadata block (10 MB).
pub const MAX_STRING_LENGTH: u64 = 10 * 1024 * 1024;

/// Maximum accepted number of metadata pairs.
pub const MAX_METADATA_COUNT: u64 = 100_000;

/// Decoded header and metadata of a container file.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHeader {
    /// Format version.
    pub version: u32,
    /// Number of tensors in the data block.
    pub tensor_count: u64,
    /// Metadata pairs in file order.
    pub metadata: ConfigMap,
    /// Byte offset of the tensor data block.
    pub data_offset: u64,
}

impl ContainerHeader {
    /// Read the header and metadata block from `reader`.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != CONTAINER_MAGIC {
            return Err(ShardpackError::InvalidContainer(format!(
                "bad magic {magic:02X?}"
            )));
        }

        let version = reader.read_u32::<LittleEndian>()?;
        if version != CONTAINER_VERSION {
            return Err(ShardpackError::InvalidContainer(format!(
                "unsupported version {version}"
            )));
        }

        let tensor_count = reader.read_u64::<LittleEndian>()?;
        let pair_count = reader.read_u64::<LittleEndian>()?;
        if pair_count > MAX_METADATA_COUNT {
            return Err(ShardpackError::InvalidContainer(format!(
                "{pair_count} metadata pairs exceeds maximum of {MAX_METADATA_COUNT}"
            )));
        }

        let mut offset = HEADER_SIZE + 8;
        let mut metadata = ConfigMap::new();
        for _ in 0..pair_count {
            let (key, key_len) = read_string(reader)?;
            let raw_tag = reader.read_u32::<LittleEndian>()?;
            let tag = ValueTag::try_from(raw_tag).map_err(|t| {
                ShardpackError::InvalidContainer(format!("unknown type tag {t} for key {key:?}"))
            })?;
            offset += key_len + 4;

            let value = match tag {
                ValueTag::String => {
                    let (s, len) = read_string(reader)?;
                    offset += len;
                    ConfigValue::String(s)
                }
                ValueTag::Int64 => {
                    offset += 8;
                    ConfigValue::Int(reader.read_i64::<LittleEndian>()?)
                }
                ValueTag::Float64 => {
                    offset += 8;
                    ConfigValue::Float(reader.read_f64::<LittleEndian>()?)
                }
                ValueTag::Bool => {
                    offset += 1;
                    match reader.read_u8()? {
                        0 => ConfigValue::Bool(false),
                        1 => ConfigValue::Bool(true),
                        b => {
                            return Err(ShardpackError::InvalidContainer(format!(
                                "invalid bool byte {b} for key {key:?}"
                            )))
                        }
                    }
                }
            };

            if metadata.insert(key.clone(), value).is_some() {
                return Err(ShardpackError::InvalidContainer(format!(
                    "duplicate metadata key {key:?}"
                )));
            }
        }

        Ok(Self {
            version,
            tensor_count,
            metadata,
            data_offset: offset,
        })
    }

    /// Read the header of the container at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}

/// Read a u64 length-prefixed UTF-8 string; returns it with its encoded size.
fn read_string<R: Read>(reader: &mut R) -> Result<(String, u64)> {
    let len = reader.read_u64::<LittleEndian>()?;
    if len > MAX_STRING_LENGTH {
        return Err(ShardpackError::InvalidContainer(format!(
            "string of {len} bytes exceeds maximum of {MAX_STRING_LENGTH} bytes"
        )));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    let s = String::from_utf8(buf)
        .map_err(|_| ShardpackError::InvalidContainer("invalid UTF-8 in string".to_string()))?;
    Ok((s, 8 + len))
}
