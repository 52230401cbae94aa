use ndarray::Array1;
use thiserror::Error;

use crate::types::TID;

/// An encode/predict call on the model failed mid-generation. Propagated,
/// never retried: the recurrent state after a failed step is not known-good,
/// so the caller must restart from the original prompt.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("cannot encode an empty token sequence")]
    EmptyInput,

    #[error("incremental encode expects exactly one token, got {0}")]
    NotSingleToken(usize),

    #[error("token id {id} outside vocabulary of size {vocab_size}")]
    TokenOutOfRange { id: TID, vocab_size: usize },

    #[error("model io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal inference error: {0}")]
    Internal(String),
}

/// The two operations the decode loop needs from a recurrent language
/// model. Everything else about the model (parameters, layer shapes, where
/// the embeddings live) is opaque to the loop.
///
/// `encode` with `full_sequence = true` folds every token of `tokens`
/// sequentially through the recurrent cell and returns only the final
/// hidden vector and state; intermediate hidden vectors are discarded.
/// With `full_sequence = false`, `tokens` must contain exactly one element
/// (the newest token) and `state` carries everything the model remembers
/// about the rest of the context. The prompt is folded in once, after
/// which every generation step costs one cell application regardless of
/// context length.
///
/// The returned state is a replacement value, not an in-place mutation, so
/// a caller holding an old state snapshot still holds something valid.
pub trait RecurrentLanguageModel: Send + Sync {
    /// Opaque per-layer recurrent state threaded between steps. Owned by a
    /// single in-flight generation, never shared across concurrent calls.
    type State: Clone + Send;

    /// The state before any token has been processed.
    fn initial_state(&self) -> Self::State;

    /// Encodes `tokens` on top of `state`, returning the hidden vector of
    /// the last token and the replacement state.
    fn encode(
        &self,
        tokens: &[TID],
        state: Self::State,
        full_sequence: bool,
    ) -> Result<(Array1<f32>, Self::State), InferenceError>;

    /// Next-token logits for a hidden vector, length [Self::vocab_size].
    fn predict(&self, hidden: &Array1<f32>) -> Result<Vec<f32>, InferenceError>;

    /// Number of entries in the output distribution.
    fn vocab_size(&self) -> usize;
}
