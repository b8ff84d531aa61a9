//! Error types for shardpack.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for shardpack operations.
pub type Result<T> = std::result::Result<T, ShardpackError>;

/// Main error type for shardpack operations.
///
/// Every variant is fatal to a conversion run.
#[derive(Error, Debug)]
pub enum ShardpackError {
    /// No `model-*.safetensors` files in the input directory.
    #[error("No model-*.safetensors shards found in {dir:?}")]
    ShardNotFound {
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// A merge was requested with no shards at all.
    #[error("No shards to merge: the shard list is empty")]
    NoShards,

    /// A shard could not be read or decoded.
    #[error("Failed to load shard {shard}: {reason}")]
    ShardLoad {
        /// Shard file name.
        shard: String,
        /// Underlying cause.
        reason: String,
    },

    /// A tensor or config value has a type the container cannot represent.
    #[error("Unsupported dtype for {name}: {dtype}")]
    UnsupportedDtype {
        /// Tensor name or config key.
        name: String,
        /// Description of the offending type.
        dtype: String,
    },

    /// The configuration overlay is unreadable or malformed.
    #[error("Failed to parse config {path:?}: {reason}")]
    ConfigParse {
        /// Overlay source.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },

    /// I/O error while streaming the container.
    #[error("Failed to write {path:?}: {source}")]
    Write {
        /// File being written.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The finished temporary file could not be renamed into place.
    #[error("Failed to publish {from:?} to {to:?}: {source}")]
    Publish {
        /// Temporary file.
        from: PathBuf,
        /// Final destination.
        to: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A container file failed validation while being read back.
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// I/O errors outside of container writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardpackError {
    /// Build a [`ShardpackError::ShardLoad`] from any displayable cause.
    pub fn shard_load(shard: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ShardLoad {
            shard: shard.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`ShardpackError::Write`] for `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
