//! Loading a runtime model directory: config, weights, embeddings and
//! vocabulary. Load failures are fatal to the caller; nothing here is
//! retried and no generation starts against a half-loaded model.

use std::fs;
use std::path::Path;

use log::debug;
use ndarray::{Array1, Array2};
use safetensors::{tensor::Dtype, SafeTensors};
use thiserror::Error;

use crate::embeddings::{DiskEmbeddings, EmbeddingLookup, InMemoryEmbeddings};
use crate::model::InferenceError;
use crate::rnn::{LayerNorm, RecurrentLayer, RnnConfig, RnnLm};
use crate::vocab::{Vocabulary, VocabularyError};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.rt.safetensors";
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";
pub const VOCAB_FILE: &str = "vocab.json";

/// The model or vocabulary failed to load.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("weights error: {0}")]
    Weights(#[from] safetensors::SafeTensorError),

    #[error("vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    #[error("embedding store error: {0}")]
    EmbeddingStore(#[from] InferenceError),

    #[error("missing tensor {0}")]
    MissingTensor(String),

    #[error("unsupported dtype for tensor {0}")]
    BadDType(String),

    #[error("tensor {tensor} has shape {actual:?}, expected {expected:?}")]
    BadTensorShape {
        tensor: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Loads the runtime model and its vocabulary from `dir`.
///
/// The embedding table comes from the on-disk store when `embeddings.bin`
/// is present, otherwise from the inline `embedding.weight` tensor.
pub fn load(dir: &Path) -> Result<(RnnLm, Vocabulary), ModelLoadError> {
    let config: RnnConfig = serde_json::from_reader(fs::File::open(dir.join(CONFIG_FILE))?)?;
    debug!(
        "loading model: d_model={} layers={} vocab={}",
        config.d_model, config.num_layers, config.vocab_size
    );

    let buf = fs::read(dir.join(WEIGHTS_FILE))?;
    let st = SafeTensors::deserialize(&buf)?;

    let embeddings_path = dir.join(EMBEDDINGS_FILE);
    let embeddings: Box<dyn EmbeddingLookup> = if embeddings_path.exists() {
        debug!("using disk-backed embedding store");
        Box::new(DiskEmbeddings::open(&embeddings_path)?)
    } else {
        let (shape, data) = tensor_f32(&st, "embedding.weight")?;
        if shape.len() != 2 {
            return Err(ModelLoadError::BadTensorShape {
                tensor: "embedding.weight".to_string(),
                expected: vec![config.vocab_size, config.d_model],
                actual: shape,
            });
        }
        Box::new(InMemoryEmbeddings::new(data, shape[1])?)
    };
    if embeddings.len() != config.vocab_size || embeddings.dim() != config.d_model {
        return Err(ModelLoadError::Invalid(format!(
            "embedding table is {}x{}, config says {}x{}",
            embeddings.len(),
            embeddings.dim(),
            config.vocab_size,
            config.d_model
        )));
    }

    let layers = (0..config.num_layers)
        .map(|i| {
            let wx = array2(&st, &format!("layers.{i}.wx"))?;
            let wh = array2(&st, &format!("layers.{i}.wh"))?;
            let bias = array1(&st, &format!("layers.{i}.bias"))?;
            RecurrentLayer::new(wx, wh, bias, config.d_model)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let norm = LayerNorm::new(array1(&st, "norm.weight")?, array1(&st, "norm.bias")?);
    let head = array2(&st, "head.weight")?;

    let model = RnnLm::new(config.clone(), embeddings, layers, norm, head)?;

    let vocab = Vocabulary::load(&dir.join(VOCAB_FILE))?;
    if vocab.len() != config.vocab_size {
        return Err(ModelLoadError::Invalid(format!(
            "vocabulary has {} entries, config says {}",
            vocab.len(),
            config.vocab_size
        )));
    }

    Ok((model, vocab))
}

/// Raw f32 tensor data and shape by name.
pub(crate) fn tensor_f32(
    st: &SafeTensors,
    name: &str,
) -> Result<(Vec<usize>, Vec<f32>), ModelLoadError> {
    let view = st
        .tensor(name)
        .map_err(|_| ModelLoadError::MissingTensor(name.to_string()))?;
    if view.dtype() != Dtype::F32 {
        return Err(ModelLoadError::BadDType(name.to_string()));
    }
    let data = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect();
    Ok((view.shape().to_vec(), data))
}

fn array2(st: &SafeTensors, name: &str) -> Result<Array2<f32>, ModelLoadError> {
    let (shape, data) = tensor_f32(st, name)?;
    if shape.len() != 2 {
        return Err(ModelLoadError::BadTensorShape {
            tensor: name.to_string(),
            expected: vec![0, 0],
            actual: shape,
        });
    }
    Array2::from_shape_vec((shape[0], shape[1]), data)
        .map_err(|e| ModelLoadError::Invalid(format!("{name}: {e}")))
}

fn array1(st: &SafeTensors, name: &str) -> Result<Array1<f32>, ModelLoadError> {
    let (shape, data) = tensor_f32(st, name)?;
    if shape.len() != 1 {
        return Err(ModelLoadError::BadTensorShape {
            tensor: name.to_string(),
            expected: vec![0],
            actual: shape,
        });
    }
    Ok(Array1::from_vec(data))
}
