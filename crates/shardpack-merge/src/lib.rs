//! Shard loading and merging for shardpack.
//!
//! A sharded checkpoint is a directory of `model-*.safetensors` files that
//! together cover one model. This crate discovers those shards, loads them
//! concurrently, and merges them into a single [`MergedModel`] whose order is
//! fixed by shard file name rather than by which load finished first.
//!
//! # Example
//!
//! ```ignore
//! use shardpack_merge::{LoadOptions, ShardMerger};
//!
//! let merger = ShardMerger::safetensors(LoadOptions::default());
//! let model = merger.merge_dir("checkpoints/llama-7b").await?;
//! println!("{} tensors", model.len());
//! ```
//!
//! [`MergedModel`]: shardpack_core::MergedModel

#![warn(missing_docs)]

mod loader;
mod merge;

pub use loader::*;
pub use merge::*;
