//! Container file writer.
//!
//! Output is streamed to `<output>.temp` and renamed over the final path
//! only after every byte has been written and synced, so the final path
//! holds either a complete container or whatever was there before. A failed
//! write leaves the temp file behind for inspection.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use shardpack_core::{ConfigMap, MergedModel, Result, ShardpackError};
use tracing::{debug, info};

use crate::{DtypeNormalizer, MetadataEncoder, CONTAINER_MAGIC, CONTAINER_VERSION, HEADER_SIZE};

/// Default output buffer size (1 MiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Suffix appended to the output path for the in-progress file.
pub const TEMP_SUFFIX: &str = ".temp";

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Published container path.
    pub path: PathBuf,
    /// Number of tensors written.
    pub tensor_count: u64,
    /// Number of metadata pairs written.
    pub metadata_count: u64,
    /// Total file size in bytes.
    pub bytes_written: u64,
}

/// Writes a merged model to a container file with atomic publish.
#[derive(Debug, Clone)]
pub struct ContainerWriter {
    output_path: PathBuf,
    temp_path: PathBuf,
    buffer_capacity: usize,
}

impl ContainerWriter {
    /// Create a writer targeting `output_path`.
    pub fn new(output_path: impl AsRef<Path>) -> Self {
        let output_path = output_path.as_ref().to_path_buf();
        let mut temp = output_path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);

        Self {
            output_path,
            temp_path: PathBuf::from(temp),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Set the output buffer size. Affects I/O batching only, never the bytes.
    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes.max(1);
        self
    }

    /// Path of the in-progress file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Output buffer size in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Write `model` and `config` to the temp file, then publish it.
    ///
    /// Tensors are released one by one as they are streamed.
    pub fn write(&self, model: MergedModel, config: &ConfigMap) -> Result<WriteSummary> {
        let tensor_count = model.len() as u64;
        let payload: usize = model
            .iter()
            .filter_map(|r| DtypeNormalizer::normalized_len(r).ok())
            .sum();
        info!(
            "Converting {} tensors ({} bytes of tensor data) to {:?}",
            tensor_count, payload, self.output_path
        );

        let file = File::create(&self.temp_path).map_err(|e| self.write_err(e))?;
        let mut out = BufWriter::with_capacity(self.buffer_capacity, file);

        let bytes_written = self.write_stream(&mut out, model, config)?;

        let file = out
            .into_inner()
            .map_err(|e| self.write_err(e.into_error()))?;
        file.sync_all().map_err(|e| self.write_err(e))?;
        drop(file);

        self.publish()?;
        info!(
            "Conversion completed: {} tensors, {} bytes -> {:?}",
            tensor_count, bytes_written, self.output_path
        );

        Ok(WriteSummary {
            path: self.output_path.clone(),
            tensor_count,
            metadata_count: config.len() as u64,
            bytes_written,
        })
    }

    /// Stream header, metadata and tensor data to `writer` in format order.
    ///
    /// Returns the number of bytes written. I/O errors are attributed to the
    /// temp path.
    pub fn write_stream<W: Write>(
        &self,
        writer: &mut W,
        model: MergedModel,
        config: &ConfigMap,
    ) -> Result<u64> {
        let total = model.len();

        self.write_header(writer, total as u64)
            .map_err(|e| self.write_err(e))?;
        let mut written = HEADER_SIZE;

        written += MetadataEncoder::encode(writer, config, &self.temp_path)?;

        for (i, record) in model.into_iter().enumerate() {
            debug!(
                "Processing tensor {}/{}: {} (dtype: {})",
                i + 1,
                total,
                record.name,
                record.dtype
            );
            let bytes = DtypeNormalizer::normalize(&record)?;
            writer.write_all(&bytes).map_err(|e| self.write_err(e))?;
            written += bytes.len() as u64;
        }

        writer.flush().map_err(|e| self.write_err(e))?;
        Ok(written)
    }

    /// Build the container in memory.
    pub fn build_to_bytes(&self, model: MergedModel, config: &ConfigMap) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_stream(&mut buffer, model, config)?;
        Ok(buffer)
    }

    /// Rename the temp file over the output path.
    pub fn publish(&self) -> Result<()> {
        std::fs::rename(&self.temp_path, &self.output_path).map_err(|source| {
            ShardpackError::Publish {
                from: self.temp_path.clone(),
                to: self.output_path.clone(),
                source,
            }
        })?;
        debug!("Published {:?} -> {:?}", self.temp_path, self.output_path);
        Ok(())
    }

    fn write_header<W: Write>(&self, writer: &mut W, tensor_count: u64) -> std::io::Result<()> {
        writer.write_all(&CONTAINER_MAGIC)?;
        writer.write_u32::<LittleEndian>(CONTAINER_VERSION)?;
        writer.write_u64::<LittleEndian>(tensor_count)?;
        Ok(())
    }

    fn write_err(&self, source: std::io::Error) -> ShardpackError {
        ShardpackError::write(&self.temp_path, source)
    }
}
