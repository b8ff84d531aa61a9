//! shardpack CLI - convert sharded safetensors checkpoints into one container file.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use shardpack_container::{ContainerHeader, ContainerWriter, DEFAULT_BUFFER_CAPACITY};
use shardpack_core::ConfigMap;
use shardpack_merge::{LoadOptions, ShardMerger};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "shardpack")]
#[command(author, version, about = "Convert a sharded safetensors checkpoint into a single container file", long_about = None)]
struct Cli {
    /// Input directory containing model-*.safetensors files
    #[arg(short, long)]
    input: PathBuf,

    /// Output container file path
    #[arg(short, long)]
    output: PathBuf,

    /// Optional JSON file overriding the default model config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output buffer size in bytes (advisory, does not change the output)
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    batch_size: usize,

    /// Maximum number of shards loaded at once (default: all of them)
    #[arg(long)]
    max_concurrent_loads: Option<usize>,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        match self.max_concurrent_loads {
            Some(limit) => LoadOptions::default().with_max_concurrent_loads(limit),
            None => LoadOptions::default(),
        }
    }

    fn model_config(&self) -> anyhow::Result<ConfigMap> {
        match &self.config {
            Some(path) => ConfigMap::from_overlay_file(path)
                .with_context(|| format!("Failed to load config overlay {}", path.display())),
            None => Ok(ConfigMap::with_defaults()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    info!("Using {} CPU threads", cpus);

    let config = cli.model_config()?;
    for (key, value) in config.iter() {
        debug!("config {} = {} ({})", key, value, value.kind());
    }

    info!(
        "Starting conversion from {} to {}",
        cli.input.display(),
        cli.output.display()
    );

    let merger = ShardMerger::safetensors(cli.load_options());
    let model = merger
        .merge_dir(&cli.input)
        .await
        .with_context(|| format!("Failed to load shards from {}", cli.input.display()))?;

    let writer = ContainerWriter::new(&cli.output).with_buffer_capacity(cli.batch_size);
    let write_config = config.clone();
    let summary = tokio::task::spawn_blocking(move || writer.write(model, &write_config))
        .await
        .context("Writer task panicked")?
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    let header = ContainerHeader::from_file(&summary.path)
        .with_context(|| format!("Failed to read back {}", summary.path.display()))?;
    if header.tensor_count != summary.tensor_count || header.metadata != config {
        anyhow::bail!(
            "Published container {} does not match what was written",
            summary.path.display()
        );
    }

    info!(
        "Conversion complete! Model saved to {} ({} tensors, {} metadata keys, {} bytes)",
        summary.path.display(),
        summary.tensor_count,
        summary.metadata_count,
        summary.bytes_written
    );

    Ok(())
}
