use std::path::{Path, PathBuf};

use safetensors::tensor::TensorView;
use safetensors::Dtype;
use shardpack_container::{ContainerHeader, ContainerWriter, WriteSummary};
use shardpack_core::{ConfigMap, Result, ShardpackError};
use shardpack_merge::{LoadOptions, ShardMerger};

fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn f16_bytes(values: &[f32]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|&f| half::f16::from_f32(f).to_le_bytes())
        .collect()
}

fn bf16_bytes(values: &[f32]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|&f| half::bf16::from_f32(f).to_le_bytes())
        .collect()
}

fn write_shard(dir: &Path, file: &str, tensors: Vec<(&str, Dtype, Vec<u8>)>) {
    let views: Vec<(&str, TensorView<'_>)> = tensors
        .iter()
        .map(|(name, dtype, bytes)| {
            let elem = match dtype {
                Dtype::F16 | Dtype::BF16 => 2,
                _ => 4,
            };
            (
                *name,
                TensorView::new(*dtype, vec![bytes.len() / elem], bytes).unwrap(),
            )
        })
        .collect();
    safetensors::serialize_to_file(views, &None, &dir.join(file)).unwrap();
}

async fn convert(input: &Path, output: &Path, config: &ConfigMap) -> Result<WriteSummary> {
    let model = ShardMerger::safetensors(LoadOptions::default())
        .merge_dir(input)
        .await?;
    ContainerWriter::new(output).write(model, config)
}

fn temp_path(output: &Path) -> PathBuf {
    ContainerWriter::new(output).temp_path().to_path_buf()
}

#[tokio::test]
async fn test_two_shard_scenario() {
    let input = tempfile::tempdir().unwrap();
    write_shard(
        input.path(),
        "model-00001-of-00002.safetensors",
        vec![("a", Dtype::F16, f16_bytes(&[1.5]))],
    );
    write_shard(
        input.path(),
        "model-00002-of-00002.safetensors",
        vec![("b", Dtype::F32, f32_bytes(&[2.0]))],
    );

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("model.gguf");
    let config = ConfigMap::with_defaults();
    let summary = convert(input.path(), &output, &config).await.unwrap();
    assert_eq!(summary.tensor_count, 2);

    let bytes = std::fs::read(&output).unwrap();
    let header = ContainerHeader::from_file(&output).unwrap();
    assert_eq!(header.tensor_count, 2);
    assert_eq!(header.metadata, config);
    assert_eq!(header.metadata.len(), 6);

    let data = &bytes[header.data_offset as usize..];
    assert_eq!(data, &f32_bytes(&[1.5, 2.0])[..]);
    assert!(!temp_path(&output).exists());
}

#[tokio::test]
async fn test_conversion_is_deterministic() {
    let input = tempfile::tempdir().unwrap();
    for shard in 1..=4 {
        let tensors = (0..8)
            .map(|i| {
                let value = (shard * 100 + i) as f32;
                (format!("layers.{shard}.w{i}"), value)
            })
            .collect::<Vec<_>>();
        let named: Vec<(&str, Dtype, Vec<u8>)> = tensors
            .iter()
            .map(|(name, v)| (name.as_str(), Dtype::BF16, bf16_bytes(&[*v, -*v])))
            .collect();
        write_shard(
            input.path(),
            &format!("model-0000{shard}-of-00004.safetensors"),
            named,
        );
    }

    let out_dir = tempfile::tempdir().unwrap();
    let first = out_dir.path().join("first.gguf");
    let second = out_dir.path().join("second.gguf");
    let mut config = ConfigMap::with_defaults();
    config.insert("rms_norm_eps", 1e-5_f64);

    convert(input.path(), &first, &config).await.unwrap();
    convert(input.path(), &second, &config).await.unwrap();

    let a = std::fs::read(&first).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert_eq!(a, b);
    assert_eq!(ContainerHeader::from_file(&first).unwrap().tensor_count, 32);
}

#[tokio::test]
async fn test_later_shard_wins_on_duplicate_name() {
    let input = tempfile::tempdir().unwrap();
    write_shard(
        input.path(),
        "model-00001-of-00002.safetensors",
        vec![
            ("embed", Dtype::F32, f32_bytes(&[1.0])),
            ("shared", Dtype::F32, f32_bytes(&[10.0])),
        ],
    );
    write_shard(
        input.path(),
        "model-00002-of-00002.safetensors",
        vec![("shared", Dtype::F32, f32_bytes(&[20.0]))],
    );

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("model.gguf");
    convert(input.path(), &output, &ConfigMap::new()).await.unwrap();

    let bytes = std::fs::read(&output).unwrap();
    let header = ContainerHeader::from_file(&output).unwrap();
    assert_eq!(header.tensor_count, 2);
    // "embed" then "shared" (name order within the first shard), shared from shard 2
    assert_eq!(
        &bytes[header.data_offset as usize..],
        &f32_bytes(&[1.0, 20.0])[..]
    );
}

#[tokio::test]
async fn test_mixed_dtype_shard_is_written_in_name_order() {
    let input = tempfile::tempdir().unwrap();
    write_shard(
        input.path(),
        "model-00001-of-00001.safetensors",
        vec![
            ("a", Dtype::F16, f16_bytes(&[1.5])),
            ("b", Dtype::F32, f32_bytes(&[2.0, 4.0])),
        ],
    );

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("model.gguf");
    convert(input.path(), &output, &ConfigMap::new()).await.unwrap();

    let bytes = std::fs::read(&output).unwrap();
    let header = ContainerHeader::from_file(&output).unwrap();
    assert_eq!(
        &bytes[header.data_offset as usize..],
        &f32_bytes(&[1.5, 2.0, 4.0])[..]
    );
}

#[tokio::test]
async fn test_empty_directory_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("config.json"), b"{}").unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("model.gguf");
    let err = convert(input.path(), &output, &ConfigMap::with_defaults())
        .await
        .unwrap_err();

    assert!(matches!(err, ShardpackError::ShardNotFound { .. }));
    assert!(!output.exists());
    assert!(!temp_path(&output).exists());
}

#[tokio::test]
async fn test_corrupt_shard_leaves_output_untouched() {
    let input = tempfile::tempdir().unwrap();
    write_shard(
        input.path(),
        "model-00001-of-00003.safetensors",
        vec![("a", Dtype::F32, f32_bytes(&[1.0]))],
    );
    std::fs::write(
        input.path().join("model-00002-of-00003.safetensors"),
        b"\x08\x00\x00\x00\x00\x00\x00\x00{broken}",
    )
    .unwrap();
    write_shard(
        input.path(),
        "model-00003-of-00003.safetensors",
        vec![("c", Dtype::F32, f32_bytes(&[3.0]))],
    );

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("model.gguf");
    std::fs::write(&output, b"previous build").unwrap();

    let err = convert(input.path(), &output, &ConfigMap::with_defaults())
        .await
        .unwrap_err();

    match err {
        ShardpackError::ShardLoad { shard, .. } => {
            assert_eq!(shard, "model-00002-of-00003.safetensors")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(std::fs::read(&output).unwrap(), b"previous build");
    assert!(!temp_path(&output).exists());
}

#[tokio::test]
async fn test_fp8_tensor_aborts_before_publish() {
    let input = tempfile::tempdir().unwrap();
    write_shard(
        input.path(),
        "model-00001-of-00001.safetensors",
        vec![("a", Dtype::F32, f32_bytes(&[1.0]))],
    );
    // Second shard holds a one-byte-per-element tensor the container rejects.
    let fp8 = vec![0x38u8, 0x40, 0x44, 0x48];
    let view = TensorView::new(Dtype::F8_E4M3, vec![4], &fp8).unwrap();
    safetensors::serialize_to_file(
        vec![("scales", view)],
        &None,
        &input.path().join("model-00002-of-00002.safetensors"),
    )
    .unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("model.gguf");
    let err = convert(input.path(), &output, &ConfigMap::with_defaults())
        .await
        .unwrap_err();

    assert!(matches!(err, ShardpackError::UnsupportedDtype { ref name, .. } if name == "scales"));
    assert!(!output.exists());
    assert!(temp_path(&output).exists());
}
