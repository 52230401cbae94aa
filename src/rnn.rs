//! The runtime recurrent language model: embeddings, a stack of simple
//! recurrent layers, a final layer norm and a linear head. The decode loop
//! only ever sees this through [RecurrentLanguageModel].

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingLookup;
use crate::model::{InferenceError, RecurrentLanguageModel};
use crate::store::ModelLoadError;
use crate::types::TID;

const NORM_EPS: f32 = 1e-6;

/// Dimensions of a runtime model, persisted as `config.json` next to the
/// weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RnnConfig {
    pub d_model: usize,
    pub num_layers: usize,
    pub vocab_size: usize,
}

/// One recurrent layer: `h' = tanh(Wx·x + Wh·h + b)`.
#[derive(Debug, Clone)]
pub struct RecurrentLayer {
    wx: Array2<f32>,
    wh: Array2<f32>,
    bias: Array1<f32>,
}

impl RecurrentLayer {
    pub fn new(
        wx: Array2<f32>,
        wh: Array2<f32>,
        bias: Array1<f32>,
        d_model: usize,
    ) -> Result<Self, ModelLoadError> {
        for (name, shape) in [("wx", wx.dim()), ("wh", wh.dim())] {
            if shape != (d_model, d_model) {
                return Err(ModelLoadError::BadTensorShape {
                    tensor: name.to_string(),
                    expected: vec![d_model, d_model],
                    actual: vec![shape.0, shape.1],
                });
            }
        }
        if bias.len() != d_model {
            return Err(ModelLoadError::BadTensorShape {
                tensor: "bias".to_string(),
                expected: vec![d_model],
                actual: vec![bias.len()],
            });
        }
        Ok(Self { wx, wh, bias })
    }

    fn forward(&self, x: &Array1<f32>, h: &Array1<f32>) -> Array1<f32> {
        let mut out = self.wx.dot(x) + self.wh.dot(h) + &self.bias;
        out.mapv_inplace(f32::tanh);
        out
    }
}

#[derive(Debug, Clone)]
pub struct LayerNorm {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    eps: f32,
}

impl LayerNorm {
    pub fn new(gamma: Array1<f32>, beta: Array1<f32>) -> Self {
        Self {
            gamma,
            beta,
            eps: NORM_EPS,
        }
    }

    fn forward(&self, x: &Array1<f32>) -> Array1<f32> {
        let mean = x.mean().unwrap_or(0.0);
        let var = x.mapv(|v| (v - mean) * (v - mean)).mean().unwrap_or(0.0);
        let denom = (var + self.eps).sqrt();
        x.mapv(|v| (v - mean) / denom) * &self.gamma + &self.beta
    }
}

/// Per-layer hidden vectors carried between steps. Replaced wholesale on
/// every step; an old snapshot stays valid.
#[derive(Debug, Clone)]
pub struct RnnState(Vec<Array1<f32>>);

pub struct RnnLm {
    config: RnnConfig,
    embeddings: Box<dyn EmbeddingLookup>,
    layers: Vec<RecurrentLayer>,
    norm: LayerNorm,
    head: Array2<f32>,
}

impl std::fmt::Debug for RnnLm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RnnLm")
            .field("config", &self.config)
            .field("layers", &self.layers)
            .field("norm", &self.norm)
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

impl RnnLm {
    pub fn new(
        config: RnnConfig,
        embeddings: Box<dyn EmbeddingLookup>,
        layers: Vec<RecurrentLayer>,
        norm: LayerNorm,
        head: Array2<f32>,
    ) -> Result<Self, ModelLoadError> {
        if embeddings.dim() != config.d_model {
            return Err(ModelLoadError::BadTensorShape {
                tensor: "embeddings".to_string(),
                expected: vec![config.vocab_size, config.d_model],
                actual: vec![embeddings.len(), embeddings.dim()],
            });
        }
        if layers.len() != config.num_layers {
            return Err(ModelLoadError::Invalid(format!(
                "expected {} layers, found {}",
                config.num_layers,
                layers.len()
            )));
        }
        if head.dim() != (config.vocab_size, config.d_model) {
            return Err(ModelLoadError::BadTensorShape {
                tensor: "head.weight".to_string(),
                expected: vec![config.vocab_size, config.d_model],
                actual: vec![head.dim().0, head.dim().1],
            });
        }
        if norm.gamma.len() != config.d_model || norm.beta.len() != config.d_model {
            return Err(ModelLoadError::BadTensorShape {
                tensor: "norm".to_string(),
                expected: vec![config.d_model],
                actual: vec![norm.gamma.len()],
            });
        }
        Ok(Self {
            config,
            embeddings,
            layers,
            norm,
            head,
        })
    }

    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    fn step_cell(&self, x: Array1<f32>, state: &RnnState) -> (Array1<f32>, RnnState) {
        let mut next = Vec::with_capacity(self.layers.len());
        let mut x = x;
        for (layer, h) in self.layers.iter().zip(state.0.iter()) {
            let out = layer.forward(&x, h);
            next.push(out.clone());
            x = out;
        }
        (x, RnnState(next))
    }
}

impl RecurrentLanguageModel for RnnLm {
    type State = RnnState;

    fn initial_state(&self) -> RnnState {
        RnnState(
            (0..self.config.num_layers)
                .map(|_| Array1::zeros(self.config.d_model))
                .collect(),
        )
    }

    fn encode(
        &self,
        tokens: &[TID],
        state: RnnState,
        full_sequence: bool,
    ) -> Result<(Array1<f32>, RnnState), InferenceError> {
        if tokens.is_empty() {
            return Err(InferenceError::EmptyInput);
        }
        if !full_sequence && tokens.len() != 1 {
            return Err(InferenceError::NotSingleToken(tokens.len()));
        }
        let mut state = state;
        let mut hidden = None;
        for &token in tokens {
            let x = self.embeddings.lookup(token)?;
            let (h, next) = self.step_cell(x, &state);
            hidden = Some(h);
            state = next;
        }
        // Non-empty input, so the loop ran at least once.
        Ok((hidden.expect("non-empty token sequence"), state))
    }

    fn predict(&self, hidden: &Array1<f32>) -> Result<Vec<f32>, InferenceError> {
        if hidden.len() != self.config.d_model {
            return Err(InferenceError::Internal(format!(
                "hidden vector of length {} for d_model {}",
                hidden.len(),
                self.config.d_model
            )));
        }
        let normed = self.norm.forward(hidden);
        Ok(self.head.dot(&normed).to_vec())
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }
}
