//! Container format types and constants.

use shardpack_core::ConfigValue;

/// Container magic bytes.
pub const CONTAINER_MAGIC: [u8; 4] = *b"GGUF";

/// Current container format version.
pub const CONTAINER_VERSION: u32 = 1;

/// Size of the fixed header: magic, version and tensor count.
pub const HEADER_SIZE: u64 = 16;

/// Metadata value type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ValueTag {
    /// Length-prefixed UTF-8 string
    String = 1,
    /// Signed 64-bit integer
    Int64 = 2,
    /// IEEE 754 double
    Float64 = 3,
    /// One byte, 0 or 1
    Bool = 4,
}

impl ValueTag {
    /// Tag used to encode `value`.
    pub fn of(value: &ConfigValue) -> Self {
        match value {
            ConfigValue::String(_) => Self::String,
            ConfigValue::Int(_) => Self::Int64,
            ConfigValue::Float(_) => Self::Float64,
            ConfigValue::Bool(_) => Self::Bool,
        }
    }
}

impl TryFrom<u32> for ValueTag {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::String),
            2 => Ok(Self::Int64),
            3 => Ok(Self::Float64),
            4 => Ok(Self::Bool),
            other => Err(other),
        }
    }
}
