//! Converts a training checkpoint into the runtime model layout: the
//! embedding table moves into the on-disk store, the remaining tensors are
//! renamed into the runtime weights file, and the derived dimensions are
//! written as `config.json`.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use safetensors::{serialize, tensor::TensorView, SafeTensors};

use crate::embeddings::write_embedding_store;
use crate::rnn::RnnConfig;
use crate::store::{tensor_f32, CONFIG_FILE, EMBEDDINGS_FILE, WEIGHTS_FILE};

/// Name of the checkpoint file the converter reads.
pub const CHECKPOINT_FILE: &str = "model.safetensors";

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub model_dir: PathBuf,
    pub overwrite_if_exist: bool,
}

/// Runs the conversion. A no-op (with a log line) when the runtime weights
/// already exist and overwriting is off.
pub fn convert_checkpoint(config: ConverterConfig) -> Result<()> {
    let target = config.model_dir.join(WEIGHTS_FILE);
    if target.exists() && !config.overwrite_if_exist {
        info!("runtime model already exists at {}, skipping", target.display());
        return Ok(());
    }

    let checkpoint = config.model_dir.join(CHECKPOINT_FILE);
    let buf = fs::read(&checkpoint)
        .with_context(|| format!("reading checkpoint {}", checkpoint.display()))?;
    let st = SafeTensors::deserialize(&buf).context("parsing checkpoint")?;

    // The embedding table leaves the weights file for the disk store.
    let (emb_shape, emb_data) = tensor_f32(&st, "emb.weight")?;
    if emb_shape.len() != 2 {
        bail!("emb.weight has rank {}, expected 2", emb_shape.len());
    }
    let (vocab_size, d_model) = (emb_shape[0], emb_shape[1]);

    let num_layers = count_blocks(&st);
    if num_layers == 0 {
        bail!("checkpoint contains no blocks.N.* tensors");
    }
    debug!("checkpoint: d_model={d_model} layers={num_layers} vocab={vocab_size}");

    let mut renamed: Vec<(String, TensorView)> = Vec::new();
    for i in 0..num_layers {
        for (source, runtime) in [
            (format!("blocks.{i}.wx.weight"), format!("layers.{i}.wx")),
            (format!("blocks.{i}.wh.weight"), format!("layers.{i}.wh")),
            (format!("blocks.{i}.bias"), format!("layers.{i}.bias")),
        ] {
            renamed.push((runtime, view(&st, &source)?));
        }
    }
    renamed.push(("norm.weight".to_string(), view(&st, "ln_out.weight")?));
    renamed.push(("norm.bias".to_string(), view(&st, "ln_out.bias")?));
    renamed.push(("head.weight".to_string(), view(&st, "head.weight")?));

    write_embedding_store(
        &config.model_dir.join(EMBEDDINGS_FILE),
        vocab_size,
        d_model,
        &emb_data,
    )
    .context("writing embedding store")?;

    let serialized = serialize(renamed, &None).context("serializing runtime weights")?;
    fs::write(&target, serialized)
        .with_context(|| format!("writing {}", target.display()))?;

    let rnn_config = RnnConfig {
        d_model,
        num_layers,
        vocab_size,
    };
    fs::write(
        config.model_dir.join(CONFIG_FILE),
        serde_json::to_vec_pretty(&rnn_config)?,
    )
    .context("writing config.json")?;

    info!("converted checkpoint into {}", config.model_dir.display());
    Ok(())
}

fn count_blocks(st: &SafeTensors) -> usize {
    let mut n = 0;
    while st.tensor(&format!("blocks.{n}.wx.weight")).is_ok() {
        n += 1;
    }
    n
}

fn view<'a>(st: &'a SafeTensors, name: &str) -> Result<TensorView<'a>> {
    let v = st
        .tensor(name)
        .map_err(|_| anyhow!("checkpoint is missing tensor {name}"))?;
    // Re-wrap so the renamed entry borrows the checkpoint buffer directly.
    TensorView::new(v.dtype(), v.shape().to_vec(), v.data())
        .map_err(|e| anyhow!("tensor {name}: {e:?}"))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use safetensors::tensor::Dtype;

    use super::*;
    use crate::model::RecurrentLanguageModel;
    use crate::store;

    fn le_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Writes a tiny training checkpoint plus vocab into `dir`:
    /// d_model 2, one layer, vocabulary of 3 tokens.
    fn write_checkpoint(dir: &Path) {
        let tensors: Vec<(&str, Vec<f32>, Vec<usize>)> = vec![
            ("emb.weight", vec![0.1, 0.2, -0.1, 0.3, 0.0, -0.2], vec![3, 2]),
            ("blocks.0.wx.weight", vec![0.2, -0.1, 0.1, 0.2], vec![2, 2]),
            ("blocks.0.wh.weight", vec![0.1, 0.1, -0.1, 0.1], vec![2, 2]),
            ("blocks.0.bias", vec![0.01, -0.01], vec![2]),
            ("ln_out.weight", vec![1.0, 1.0], vec![2]),
            ("ln_out.bias", vec![0.0, 0.0], vec![2]),
            ("head.weight", vec![0.3, -0.2, 0.1, 0.4, -0.5, 0.2], vec![3, 2]),
        ];
        let buffers: Vec<(String, Vec<u8>, Vec<usize>)> = tensors
            .into_iter()
            .map(|(name, data, shape)| (name.to_string(), le_bytes(&data), shape))
            .collect();
        let views: Vec<(String, TensorView)> = buffers
            .iter()
            .map(|(name, bytes, shape)| {
                (
                    name.clone(),
                    TensorView::new(Dtype::F32, shape.clone(), bytes).unwrap(),
                )
            })
            .collect();
        let serialized = serialize(views, &None).unwrap();
        fs::write(dir.join(CHECKPOINT_FILE), serialized).unwrap();
        fs::write(dir.join(store::VOCAB_FILE), r#"["<eos>", "a", "b"]"#).unwrap();
    }

    #[test]
    fn test_convert_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path());

        convert_checkpoint(ConverterConfig {
            model_dir: dir.path().to_path_buf(),
            overwrite_if_exist: false,
        })
        .unwrap();

        assert!(dir.path().join(WEIGHTS_FILE).exists());
        assert!(dir.path().join(EMBEDDINGS_FILE).exists());
        assert!(dir.path().join(CONFIG_FILE).exists());

        let (model, vocab) = store::load(dir.path()).unwrap();
        assert_eq!(model.vocab_size(), 3);
        assert_eq!(vocab.len(), 3);

        let (hidden, state) = model
            .encode(&[1, 2], model.initial_state(), true)
            .unwrap();
        let logits = model.predict(&hidden).unwrap();
        assert_eq!(logits.len(), 3);
        // The state threads forward for incremental steps.
        let (hidden2, _) = model.encode(&[1], state, false).unwrap();
        assert_eq!(hidden2.len(), 2);
    }

    #[test]
    fn test_convert_skips_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path());
        fs::write(dir.path().join(WEIGHTS_FILE), b"sentinel").unwrap();

        convert_checkpoint(ConverterConfig {
            model_dir: dir.path().to_path_buf(),
            overwrite_if_exist: false,
        })
        .unwrap();
        assert_eq!(fs::read(dir.path().join(WEIGHTS_FILE)).unwrap(), b"sentinel");

        convert_checkpoint(ConverterConfig {
            model_dir: dir.path().to_path_buf(),
            overwrite_if_exist: true,
        })
        .unwrap();
        assert_ne!(fs::read(dir.path().join(WEIGHTS_FILE)).unwrap(), b"sentinel");
    }

    #[test]
    fn test_convert_missing_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(convert_checkpoint(ConverterConfig {
            model_dir: dir.path().to_path_buf(),
            overwrite_if_exist: false,
        })
        .is_err());
    }

    #[test]
    fn test_converted_model_prefers_disk_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path());
        convert_checkpoint(ConverterConfig {
            model_dir: dir.path().to_path_buf(),
            overwrite_if_exist: false,
        })
        .unwrap();

        // Corrupt the disk store: load must now fail, proving it is the
        // backend actually in use.
        fs::write(dir.path().join(EMBEDDINGS_FILE), b"garbage").unwrap();
        assert!(store::load(dir.path()).is_err());
    }

    #[test]
    fn test_model_decodes_through_the_core() {
        use crate::cancel::CancellationToken;
        use crate::decode::Decoder;
        use crate::options::DecodingOptions;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path());
        convert_checkpoint(ConverterConfig {
            model_dir: dir.path().to_path_buf(),
            overwrite_if_exist: false,
        })
        .unwrap();
        let (model, _vocab) = store::load(dir.path()).unwrap();

        let options = DecodingOptions {
            max_len: 4,
            end_token_id: 100,
            use_sampling: false,
            ..Default::default()
        };
        let decoder = Decoder::new(Arc::new(model), options).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (steps, reason) = rt
            .block_on(decoder.decode_collect(&[1, 2], CancellationToken::never()))
            .unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(reason, crate::decode::FinishReason::MaxLength);
    }
}
