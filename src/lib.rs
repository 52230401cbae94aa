//! # RNN Decoder
//!
//! A streaming decode engine for recurrent language models: sampler
//! chains, stop conditions, and a state-threaded generation loop that
//! publishes tokens into a bounded channel as they are accepted.
//!
//! The model itself is an opaque collaborator behind
//! [crate::model::RecurrentLanguageModel]: one full-context `encode` folds
//! the prompt into the recurrent state, then every generation step pays for
//! exactly one `predict` and one single-token `encode`, regardless of how
//! long the context has grown.
//!
//! ## Examples
//!
//! Sampling policies are built the same way as any other sampler chain:
//! filtering samplers first, a token-picking sampler last.
//!
//! ```rust
//! use anyhow::Result;
//!
//! use rnn_decoder::prelude::*;
//!
//! pub fn test_chain() -> Result<()> {
//!     let mut logits = Logits::try_from_iter([0.1f32, 0.2, 0.3, 0.4])?;
//!
//!     let mut sc = SamplerChain::new() + SampleTemperature::new(0.8);
//!     sc += SampleTopK::new(2, 1);
//!     sc.push_sampler(SampleGreedy::new());
//!
//!     assert_eq!(
//!         sc.sample_token(&mut NilSamplerResources::default(), &mut logits)?,
//!         Some(3)
//!     );
//!     Ok(())
//! }
//! ```
//!
//! You normally won't drive a chain by hand, though: [crate::decode::Decoder]
//! assembles the chain from [crate::options::DecodingOptions] and runs the
//! whole predict → sample → stop-check → encode cycle:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ndarray::Array1;
//!
//! use rnn_decoder::prelude::*;
//!
//! /// A model that just counts the tokens it has seen.
//! #[derive(Debug)]
//! struct CountModel;
//!
//! impl RecurrentLanguageModel for CountModel {
//!     type State = u32;
//!
//!     fn initial_state(&self) -> u32 {
//!         0
//!     }
//!
//!     fn encode(
//!         &self,
//!         tokens: &[TID],
//!         state: u32,
//!         _full_sequence: bool,
//!     ) -> Result<(Array1<f32>, u32), InferenceError> {
//!         let state = state + tokens.len() as u32;
//!         Ok((Array1::from_elem(1, state as f32), state))
//!     }
//!
//!     fn predict(&self, hidden: &Array1<f32>) -> Result<Vec<f32>, InferenceError> {
//!         let mut logits = vec![0.0; 4];
//!         logits[hidden[0] as usize % 4] = 1.0;
//!         Ok(logits)
//!     }
//!
//!     fn vocab_size(&self) -> usize {
//!         4
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let options = DecodingOptions {
//!         max_len: 3,
//!         end_token_id: 9,
//!         use_sampling: false,
//!         ..Default::default()
//!     };
//!     let decoder = Decoder::new(Arc::new(CountModel), options)?;
//!
//!     let rt = tokio::runtime::Builder::new_current_thread().build()?;
//!     let (steps, reason) =
//!         rt.block_on(decoder.decode_collect(&[1, 2], CancellationToken::never()))?;
//!
//!     assert_eq!(steps.len(), 3);
//!     assert_eq!(reason, FinishReason::MaxLength);
//!     Ok(())
//! }
//! ```
//!
//! For real streaming, hand [crate::decode::Decoder::decode] a bounded
//! `tokio::sync::mpsc` sender sized to `max_len`, spawn a consumer that
//! drains the receiver, and join on the consumer; the channel closing is
//! the end-of-stream signal, on normal stops and cancellation alike.

/// Types and traits.
pub mod types;

/// Sampler chains
mod chain;

/// Sampler resources
mod resource;

/// # Samplers live here!
pub mod samplers;

/// Decoding configuration.
pub mod options;

/// Stop-condition evaluation.
pub mod stop;

/// The streaming decode loop.
pub mod decode;

/// Cooperative cancellation.
pub mod cancel;

/// The recurrent language model contract.
pub mod model;

/// Embedding storage backends.
pub mod embeddings;

/// Token vocabulary.
pub mod vocab;

/// The runtime recurrent model.
pub mod rnn;

/// Model directory loading.
pub mod store;

/// Checkpoint conversion.
pub mod convert;

/// Model artifact download.
pub mod download;


/// Convenient rexports. The simplest way to use the crate is to just throw a
/// `use rnn_decoder::prelude::*;`
/// into your project.
pub mod prelude {
    #[doc(inline)]
    pub use crate::{
        cancel::*, chain::*, decode::*, model::*, options::*, resource::*, samplers::*, stop::*,
        types::*,
    };
}
