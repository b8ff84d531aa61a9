//! Binary container format implementation.
//!
//! The container is a single file holding a fixed header, a typed key/value
//! metadata block and the raw bytes of every tensor in merge order:
//!
//! ```text
//! magic "GGUF" | version u32 | tensor count u64
//! pair count u64 | (key len u64, key, tag u32, payload)*
//! tensor bytes, concatenated with no length prefix or padding
//! ```
//!
//! All integers are little-endian. Tensor boundaries are not recorded; a
//! reader needs an out-of-band shape/dtype manifest to split the data block.
//!
//! This crate provides:
//! - [`DtypeNormalizer`] for widening 16-bit floats to f32
//! - [`MetadataEncoder`] for the key/value block
//! - [`ContainerWriter`] for streaming to a temp file and publishing atomically
//! - [`ContainerHeader`] for reading the header and metadata back
//!
//! # Example
//!
//! ```ignore
//! use shardpack_container::ContainerWriter;
//! use shardpack_core::ConfigMap;
//!
//! let summary = ContainerWriter::new("model.gguf")
//!     .with_buffer_capacity(4 << 20)
//!     .write(model, &ConfigMap::with_defaults())?;
//! println!("wrote {} bytes", summary.bytes_written);
//! ```

#![warn(missing_docs)]

mod metadata;
mod normalize;
pub mod reader;
mod types;
mod writer;

pub use metadata::*;
pub use normalize::*;
pub use reader::{ContainerHeader, MAX_METADATA_COUNT, MAX_STRING_LENGTH};
pub use types::*;
pub use writer::*;
