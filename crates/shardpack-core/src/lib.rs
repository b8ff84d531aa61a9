//! Core types, configuration and errors for shardpack.
//!
//! This crate provides the foundational abstractions shared by the loader,
//! container and CLI crates:
//!
//! - Tensor records and the merged, insertion-ordered model mapping
//! - The scalar configuration map written into the container metadata
//! - Error handling infrastructure

#![warn(missing_docs)]

mod config;
mod error;
mod types;

pub use config::*;
pub use error::*;
pub use types::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigMap, ConfigValue};
    pub use crate::error::{Result, ShardpackError};
    pub use crate::types::{MergedModel, TensorDtype, TensorRecord};
}
