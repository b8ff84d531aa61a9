//! Concurrent shard loading and last-write-wins merging.
//!
//! Loads run on the blocking thread pool, one task per shard. Every task is
//! awaited before any result is inspected, so a failing shard never leaves
//! other loads running in the background, and the merge itself always walks
//! shards in file-name order regardless of which load finished first.

use std::path::Path;
use std::sync::Arc;

use shardpack_core::{MergedModel, Result, ShardpackError, TensorRecord};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::loader::{discover_shards, SafetensorsShardLoader, ShardFile, ShardLoader};

/// Options for the concurrent load phase.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Maximum number of shards decoded at once. `None` loads every shard
    /// concurrently.
    pub max_concurrent_loads: Option<usize>,
}

impl LoadOptions {
    /// Limit concurrent shard loads to `limit` (at least one).
    pub fn with_max_concurrent_loads(mut self, limit: usize) -> Self {
        self.max_concurrent_loads = Some(limit.max(1));
        self
    }
}

/// Loads all shards of a checkpoint and merges them into one model.
#[derive(Clone)]
pub struct ShardMerger {
    loader: Arc<dyn ShardLoader>,
    options: LoadOptions,
}

impl std::fmt::Debug for ShardMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardMerger")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ShardMerger {
    /// Create a merger using a custom loader.
    pub fn new(loader: impl ShardLoader + 'static, options: LoadOptions) -> Self {
        Self {
            loader: Arc::new(loader),
            options,
        }
    }

    /// Create a merger that reads safetensors shards.
    pub fn safetensors(options: LoadOptions) -> Self {
        Self::new(SafetensorsShardLoader::new(), options)
    }

    /// Discover the shards under `dir` and merge them.
    pub async fn merge_dir(&self, dir: impl AsRef<Path>) -> Result<MergedModel> {
        let shards = discover_shards(dir)?;
        self.merge_shards(&shards).await
    }

    /// Load `shards` concurrently and merge them in the order given.
    ///
    /// Later shards overwrite earlier ones on a tensor-name collision. If any
    /// load fails, the error of the first failing shard (in the order given)
    /// is returned once all loads have settled.
    pub async fn merge_shards(&self, shards: &[ShardFile]) -> Result<MergedModel> {
        if shards.is_empty() {
            return Err(ShardpackError::NoShards);
        }

        let results = self.load_all(shards).await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if failures > 0 {
            error!("{} of {} shard loads failed", failures, shards.len());
        }

        let mut model = MergedModel::new();
        for (shard, result) in shards.iter().zip(results) {
            let records = result?;
            merge_into(&mut model, &shard.name, records);
        }

        info!(
            "Merged {} tensors ({} bytes) from {} shards",
            model.len(),
            model.total_bytes(),
            shards.len()
        );

        Ok(model)
    }

    /// Spawn one load per shard and wait for every one of them.
    async fn load_all(&self, shards: &[ShardFile]) -> Vec<Result<Vec<TensorRecord>>> {
        let limiter = self
            .options
            .max_concurrent_loads
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        debug!(
            "Spawning {} shard loads (limit: {:?})",
            shards.len(),
            self.options.max_concurrent_loads
        );

        let mut handles = Vec::with_capacity(shards.len());
        for shard in shards {
            // The semaphore is never closed, so acquisition only yields a permit.
            let permit = match &limiter {
                Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
                None => None,
            };
            let loader = Arc::clone(&self.loader);
            let shard = shard.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                loader.load(&shard)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (shard, handle) in shards.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ShardpackError::shard_load(
                    &shard.name,
                    format!("load task failed: {e}"),
                )),
            };
            if let Err(e) = &result {
                error!("{}", e);
            }
            results.push(result);
        }
        results
    }
}

fn merge_into(model: &mut MergedModel, shard_name: &str, records: Vec<TensorRecord>) {
    for record in records {
        if let Some(previous) = model.insert(record) {
            debug!(
                "Tensor {} from {} overrides an earlier shard",
                previous.name, shard_name
            );
        }
    }
}
