//! Common type definitions.

use std::collections::HashMap;
use std::fmt;

/// Element type of a tensor as stored in a shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TensorDtype {
    /// 32-bit floating point.
    F32,
    /// 16-bit IEEE half precision.
    F16,
    /// Brain floating point (16-bit).
    BF16,
    /// 64-bit floating point.
    F64,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
    /// Boolean, one byte per element.
    Bool,
    /// 8-bit floating point (E4M3).
    F8E4M3,
    /// 8-bit floating point (E5M2).
    F8E5M2,
    /// A storage dtype this build does not know about.
    Other(String),
}

impl TensorDtype {
    /// Size of one element in bytes, if known.
    #[must_use]
    pub fn size_bytes(&self) -> Option<usize> {
        match self {
            Self::F64 | Self::I64 | Self::U64 => Some(8),
            Self::F32 | Self::I32 | Self::U32 => Some(4),
            Self::F16 | Self::BF16 | Self::I16 | Self::U16 => Some(2),
            Self::I8 | Self::U8 | Self::Bool | Self::F8E4M3 | Self::F8E5M2 => Some(1),
            Self::Other(_) => None,
        }
    }

    /// Whether this is one of the 16-bit float formats that get widened to f32.
    #[must_use]
    pub fn is_reduced_float(&self) -> bool {
        matches!(self, Self::F16 | Self::BF16)
    }
}

impl fmt::Display for TensorDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::BF16 => "BF16",
            Self::F64 => "F64",
            Self::I8 => "I8",
            Self::I16 => "I16",
            Self::I32 => "I32",
            Self::I64 => "I64",
            Self::U8 => "U8",
            Self::U16 => "U16",
            Self::U32 => "U32",
            Self::U64 => "U64",
            Self::Bool => "BOOL",
            Self::F8E4M3 => "F8_E4M3",
            Self::F8E5M2 => "F8_E5M2",
            Self::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// One named tensor loaded from a shard.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorRecord {
    /// Tensor name, unique within a merged model.
    pub name: String,
    /// Element type of `data`.
    pub dtype: TensorDtype,
    /// Shape as recorded in the shard. Informational only.
    pub shape: Vec<usize>,
    /// Raw little-endian element bytes.
    pub data: Vec<u8>,
}

impl TensorRecord {
    /// Create a new tensor record.
    pub fn new(
        name: impl Into<String>,
        dtype: TensorDtype,
        shape: Vec<usize>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
            data,
        }
    }
}

/// All tensors of a model keyed by name, in insertion order.
///
/// Inserting a name that already exists replaces the record but keeps the
/// position of the first insertion.
#[derive(Debug, Default, Clone)]
pub struct MergedModel {
    records: Vec<TensorRecord>,
    index: HashMap<String, usize>,
}

impl MergedModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the record it replaced if the name was taken.
    pub fn insert(&mut self, record: TensorRecord) -> Option<TensorRecord> {
        match self.index.get(&record.name) {
            Some(&idx) => Some(std::mem::replace(&mut self.records[idx], record)),
            None => {
                self.index.insert(record.name.clone(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    /// Look up a tensor by name.
    pub fn get(&self, name: &str) -> Option<&TensorRecord> {
        self.index.get(name).map(|&idx| &self.records[idx])
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the model holds no tensors.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Tensor names in merge order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    /// Iterate over records in merge order.
    pub fn iter(&self) -> std::slice::Iter<'_, TensorRecord> {
        self.records.iter()
    }

    /// Total size of the raw tensor buffers in bytes.
    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(|r| r.data.len()).sum()
    }
}

impl IntoIterator for MergedModel {
    type Item = TensorRecord;
    type IntoIter = std::vec::IntoIter<TensorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a MergedModel {
    type Item = &'a TensorRecord;
    type IntoIter = std::slice::Iter<'a, TensorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
