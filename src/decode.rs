//! The streaming decode loop: predict, sample, stop-check, encode, one
//! token per cycle, published into a bounded event channel.

use std::sync::Arc;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    cancel::CancellationToken,
    model::{InferenceError, RecurrentLanguageModel},
    options::{ConfigurationError, DecodingOptions, EndThresholdBasis},
    resource::SimpleSamplerResources,
    stop::{StopConditions, StopVerdict},
    types::{softmax_prob, Logits, Sampler, SamplerError, TID},
};

/// One emitted token of a generation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodingStep {
    /// The accepted token.
    pub token_id: TID,
    /// 0-based generation step the token was produced at.
    pub step: usize,
}

/// Why a generation stopped. Cancellation is a first-class outcome, not an
/// error: the stream simply closes early with everything already emitted
/// still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The end token was sampled past all its gates.
    EndToken,
    /// A configured stop sequence completed.
    StopSequence,
    /// The generated token count reached `max_len`.
    MaxLength,
    /// The cancellation token fired.
    Cancelled,
}

/// A generation call failed. No retry happens anywhere in the loop: the
/// recurrent state after a failed step is not known-good, so the only safe
/// recovery is a fresh call from the original prompt.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot decode from an empty prompt")]
    EmptyPrompt,

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("sampling failed: {0}")]
    Sampling(anyhow::Error),

    #[error("event buffer closed by consumer")]
    BufferClosed,
}

/// Orchestrates one recurrent language model, a sampler chain and the stop
/// conditions into a stream of [DecodingStep]s.
///
/// The model and options are fixed at construction (options are validated
/// there, so a decode call never starts misconfigured); each [Decoder::decode]
/// call owns its context and recurrent state exclusively and the model is
/// only read, so one decoder can serve many sequential calls.
pub struct Decoder<M: RecurrentLanguageModel> {
    model: Arc<M>,
    options: DecodingOptions,
    stop: StopConditions,
}

impl<M: RecurrentLanguageModel> Decoder<M> {
    pub fn new(model: Arc<M>, options: DecodingOptions) -> Result<Self, ConfigurationError> {
        options.validate()?;
        let stop = StopConditions::new(&options);
        Ok(Self {
            model,
            options,
            stop,
        })
    }

    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// Runs one generation, publishing each accepted token into `buffer`.
    ///
    /// The prompt is folded into the recurrent state with a single
    /// full-context encode; after that every step costs one `predict`, one
    /// sampler-chain pass and one single-token `encode`. The channel is
    /// closed exactly once: the sender is owned here and dropped on every
    /// return path. Callers that want deterministic completion should size
    /// `buffer` with capacity `max_len` (the producer then never waits on
    /// a slow consumer) and join on the consumer draining it.
    ///
    /// Cancellation is checked at the top of each step: at most the
    /// current step finishes, the next model call never starts, and
    /// nothing already emitted is rolled back.
    pub async fn decode(
        &self,
        prompt: &[TID],
        buffer: mpsc::Sender<DecodingStep>,
        cancel: CancellationToken,
    ) -> Result<FinishReason, DecodeError> {
        if prompt.is_empty() {
            return Err(DecodeError::EmptyPrompt);
        }
        let opts = &self.options;
        let mut chain = opts.sampler_chain();
        let mut res = SimpleSamplerResources::seedable(opts.seed);

        debug!("encoding {} prompt tokens", prompt.len());
        let (mut hidden, mut state) =
            self.model
                .encode(prompt, self.model.initial_state(), true)?;

        let mut generated: Vec<TID> = Vec::new();
        for step in 0..opts.max_len {
            if cancel.is_cancelled() {
                debug!("generation cancelled at step {step}");
                return Ok(FinishReason::Cancelled);
            }

            let raw = self.model.predict(&hidden)?;
            let mut logits = Logits::try_from_iter(raw.iter().copied())
                .map_err(|e| DecodeError::Sampling(e.into()))?;
            let token = chain
                .sample_token(&mut res, &mut logits)
                .map_err(DecodeError::Sampling)?
                .ok_or_else(|| DecodeError::Sampling(SamplerError::NoTokenSampled.into()))?;
            generated.push(token);

            let end_prob = match opts.end_threshold_basis {
                EndThresholdBasis::Raw => softmax_prob(&raw, opts.end_token_id),
                EndThresholdBasis::Filtered => logits.prob_of(opts.end_token_id),
            };
            let verdict = self.stop.evaluate(&generated, step, token, end_prob);

            // The end token is appended to the context either way (the
            // state must stay consistent with everything encoded), but a
            // suppressed end token never reaches the consumer.
            let suppressed = opts.skip_end_token_id && token == opts.end_token_id;
            if !suppressed {
                buffer
                    .send(DecodingStep {
                        token_id: token,
                        step,
                    })
                    .await
                    .map_err(|_| DecodeError::BufferClosed)?;
            }

            match verdict {
                StopVerdict::EndToken => {
                    trace!("end token {token} at step {step}");
                    return Ok(FinishReason::EndToken);
                }
                StopVerdict::StopSequence => {
                    trace!("stop sequence completed at step {step}");
                    return Ok(FinishReason::StopSequence);
                }
                StopVerdict::MaxLength => return Ok(FinishReason::MaxLength),
                StopVerdict::Continue => {}
            }

            let (next_hidden, next_state) =
                self.model
                    .encode(&generated[generated.len() - 1..], state, false)?;
            hidden = next_hidden;
            state = next_state;
        }

        Ok(FinishReason::MaxLength)
    }

    /// Convenience wrapper that collects the whole stream in-process.
    ///
    /// The internal channel has capacity `max_len`, so the producer cannot
    /// block and draining after the loop returns is deadlock-free.
    pub async fn decode_collect(
        &self,
        prompt: &[TID],
        cancel: CancellationToken,
    ) -> Result<(Vec<DecodingStep>, FinishReason), DecodeError> {
        let (tx, mut rx) = mpsc::channel(self.options.max_len);
        let reason = self.decode(prompt, tx, cancel).await?;
        let mut steps = Vec::new();
        while let Some(step) = rx.recv().await {
            steps.push(step);
        }
        Ok((steps, reason))
    }
}
