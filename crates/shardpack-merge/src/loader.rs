//! Shard discovery and loading.
//!
//! Shards are the `model-*.safetensors` files directly under a checkpoint
//! directory. Each one is read fully into memory and split into owned
//! [`TensorRecord`]s so the file buffer can be dropped as soon as the shard
//! is decoded.

use safetensors::SafeTensors;
use shardpack_core::{Result, ShardpackError, TensorDtype, TensorRecord};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name prefix of a shard.
pub const SHARD_PREFIX: &str = "model-";

/// File name suffix of a shard.
pub const SHARD_SUFFIX: &str = ".safetensors";

/// One shard file of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardFile {
    /// File name, used for ordering and error messages.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
}

impl ShardFile {
    /// Create a shard entry from a path.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }
}

/// Whether `file_name` follows the shard naming convention.
pub fn is_shard_name(file_name: &str) -> bool {
    file_name.starts_with(SHARD_PREFIX) && file_name.ends_with(SHARD_SUFFIX)
}

/// Find all shards directly under `dir`, sorted by file name.
pub fn discover_shards(dir: impl AsRef<Path>) -> Result<Vec<ShardFile>> {
    let dir = dir.as_ref();
    let not_found = || ShardpackError::ShardNotFound {
        dir: dir.to_path_buf(),
    };

    let entries = std::fs::read_dir(dir).map_err(|e| {
        debug!("Cannot read {:?}: {}", dir, e);
        not_found()
    })?;

    let mut shards = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_shard_name(name) && path.is_file() {
            shards.push(ShardFile {
                name: name.to_string(),
                path: path.clone(),
            });
        }
    }

    if shards.is_empty() {
        return Err(not_found());
    }

    // Sort for deterministic ordering
    shards.sort();

    info!(
        "Found model files: {:?}",
        shards.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
    );

    Ok(shards)
}

/// Loads the complete tensor mapping of one shard.
pub trait ShardLoader: Send + Sync {
    /// Load every tensor in `shard`, sorted by tensor name.
    fn load(&self, shard: &ShardFile) -> Result<Vec<TensorRecord>>;
}

/// [`ShardLoader`] backed by the `safetensors` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetensorsShardLoader;

impl SafetensorsShardLoader {
    /// Create a new loader.
    pub fn new() -> Self {
        Self
    }

    /// Decode an in-memory safetensors buffer.
    pub fn decode(shard_name: &str, bytes: &[u8]) -> Result<Vec<TensorRecord>> {
        let tensors =
            SafeTensors::deserialize(bytes).map_err(|e| ShardpackError::shard_load(shard_name, e))?;

        let mut records: Vec<TensorRecord> = tensors
            .tensors()
            .into_iter()
            .map(|(name, view)| {
                TensorRecord::new(
                    name,
                    map_dtype(view.dtype()),
                    view.shape().to_vec(),
                    view.data().to_vec(),
                )
            })
            .collect();

        // Name order; the data section groups tensors by dtype alignment.
        records.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(records)
    }
}

impl ShardLoader for SafetensorsShardLoader {
    fn load(&self, shard: &ShardFile) -> Result<Vec<TensorRecord>> {
        info!("Loading {:?}...", shard.path);
        let bytes =
            std::fs::read(&shard.path).map_err(|e| ShardpackError::shard_load(&shard.name, e))?;
        let records = Self::decode(&shard.name, &bytes)?;
        debug!("Loaded {} tensors from {}", records.len(), shard.name);
        Ok(records)
    }
}

/// Map a safetensors dtype onto the crate's element type.
#[allow(unreachable_patterns)]
pub fn map_dtype(dtype: safetensors::Dtype) -> TensorDtype {
    use safetensors::Dtype;

    match dtype {
        Dtype::F32 => TensorDtype::F32,
        Dtype::F16 => TensorDtype::F16,
        Dtype::BF16 => TensorDtype::BF16,
        Dtype::F64 => TensorDtype::F64,
        Dtype::I8 => TensorDtype::I8,
        Dtype::I16 => TensorDtype::I16,
        Dtype::I32 => TensorDtype::I32,
        Dtype::I64 => TensorDtype::I64,
        Dtype::U8 => TensorDtype::U8,
        Dtype::U16 => TensorDtype::U16,
        Dtype::U32 => TensorDtype::U32,
        Dtype::U64 => TensorDtype::U64,
        Dtype::BOOL => TensorDtype::Bool,
        Dtype::F8_E4M3 => TensorDtype::F8E4M3,
        Dtype::F8_E5M2 => TensorDtype::F8E5M2,
        other => TensorDtype::Other(format!("{other:?}")),
    }
}
