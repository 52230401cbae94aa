use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chain::SamplerChain,
    samplers::{SampleGreedy, SampleRandDistrib, SampleTemperature, SampleTopK, SampleTopP},
    types::TID,
};

/// Invalid decoding options. Rejected before the decode loop starts; a
/// generation call never begins with a bad configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("min_len ({min_len}) greater than max_len ({max_len})")]
    MinLenExceedsMaxLen { min_len: usize, max_len: usize },

    #[error("max_len must be at least 1")]
    ZeroMaxLen,

    #[error("top_p must be in (0, 1], got {0}")]
    TopPOutOfRange(f32),

    #[error("temperature must be positive and finite, got {0}")]
    BadTemperature(f32),

    #[error("end_threshold must be in (0, 1], got {0}")]
    EndThresholdOutOfRange(f32),

    #[error("stop sequence at index {0} is empty")]
    EmptyStopSequence(usize),
}

/// Which distribution the end-token probability mass is measured against
/// when `end_threshold` is set.
///
/// The observed behavior of threshold-vs-filter interaction is ambiguous,
/// so it is a policy knob rather than a baked-in choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndThresholdBasis {
    /// Softmax over the raw logits, before any top-k/top-p filtering.
    #[default]
    Raw,
    /// The renormalized distribution left after filtering; a filtered-out
    /// end token has mass 0 and can never clear the threshold.
    Filtered,
}

/// Configuration for one generation call. All fields are immutable for the
/// duration of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodingOptions {
    /// Minimum number of generated tokens before the end token may stop
    /// the generation.
    pub min_len: usize,

    /// Maximum number of generated tokens.
    pub max_len: usize,

    /// Token id that marks the end of the output.
    pub end_token_id: TID,

    /// Whether the end token is swallowed rather than emitted to the
    /// consumer.
    pub skip_end_token_id: bool,

    /// Temperature applied to the logits before filtering.
    pub temperature: f32,

    /// Nucleus threshold; `1.0` disables the filter.
    pub top_p: f32,

    /// Top-K cutoff; `0` disables the filter.
    pub top_k: usize,

    /// When false, sampling knobs are ignored and decoding is greedy
    /// arg-max.
    pub use_sampling: bool,

    /// Probability mass the end token must clear before it may stop the
    /// generation. `None` leaves the end token ungated.
    pub end_threshold: Option<f32>,

    /// Distribution the end-token mass is measured against.
    #[serde(default)]
    pub end_threshold_basis: EndThresholdBasis,

    /// Token-id sequences that halt generation when they appear as a
    /// suffix of the generated output.
    #[serde(default)]
    pub stop_sequences_ids: Vec<Vec<TID>>,

    /// Random seed for reproducible sampling.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            min_len: 0,
            max_len: 200,
            end_token_id: 0,
            skip_end_token_id: true,
            temperature: 1.0,
            top_p: 0.8,
            top_k: 120,
            use_sampling: true,
            end_threshold: None,
            end_threshold_basis: EndThresholdBasis::Raw,
            stop_sequences_ids: vec![],
            seed: None,
        }
    }
}

impl DecodingOptions {
    /// Rejects configurations the decode loop must never start with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_len == 0 {
            return Err(ConfigurationError::ZeroMaxLen);
        }
        if self.min_len > self.max_len {
            return Err(ConfigurationError::MinLenExceedsMaxLen {
                min_len: self.min_len,
                max_len: self.max_len,
            });
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ConfigurationError::TopPOutOfRange(self.top_p));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ConfigurationError::BadTemperature(self.temperature));
        }
        if let Some(t) = self.end_threshold {
            if !(t > 0.0 && t <= 1.0) {
                return Err(ConfigurationError::EndThresholdOutOfRange(t));
            }
        }
        if let Some(idx) = self.stop_sequences_ids.iter().position(|s| s.is_empty()) {
            return Err(ConfigurationError::EmptyStopSequence(idx));
        }
        Ok(())
    }

    /// Builds the sampler chain for one generation call.
    ///
    /// Greedy decoding is a bare arg-max; sampling applies temperature
    /// before the top-k and top-p filters, then draws from the surviving
    /// renormalized candidates.
    pub fn sampler_chain(&self) -> SamplerChain {
        let mut chain = SamplerChain::new();
        if !self.use_sampling {
            chain += SampleGreedy::new();
            return chain;
        }
        chain += SampleTemperature::new(self.temperature);
        if self.top_k > 0 {
            chain += SampleTopK::new(self.top_k, 1);
        }
        if self.top_p < 1.0 {
            chain += SampleTopP::new(self.top_p, 1);
        }
        chain += SampleRandDistrib::new();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DecodingOptions {
        DecodingOptions::default()
    }

    #[test]
    fn test_default_options_valid() {
        base().validate().unwrap();
    }

    #[test]
    fn test_min_len_exceeds_max_len() {
        let opts = DecodingOptions {
            min_len: 10,
            max_len: 5,
            ..base()
        };
        assert_eq!(
            opts.validate(),
            Err(ConfigurationError::MinLenExceedsMaxLen {
                min_len: 10,
                max_len: 5
            })
        );
    }

    #[test]
    fn test_zero_max_len() {
        let opts = DecodingOptions {
            max_len: 0,
            ..base()
        };
        assert_eq!(opts.validate(), Err(ConfigurationError::ZeroMaxLen));
    }

    #[test]
    fn test_top_p_bounds() {
        for bad in [0.0, -0.5, 1.5] {
            let opts = DecodingOptions {
                top_p: bad,
                ..base()
            };
            assert!(opts.validate().is_err(), "top_p {bad} should be rejected");
        }
        let opts = DecodingOptions {
            top_p: 1.0,
            ..base()
        };
        opts.validate().unwrap();
    }

    #[test]
    fn test_bad_temperature() {
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let opts = DecodingOptions {
                temperature: bad,
                ..base()
            };
            assert!(opts.validate().is_err());
        }
    }

    #[test]
    fn test_empty_stop_sequence_rejected() {
        let opts = DecodingOptions {
            stop_sequences_ids: vec![vec![1, 2], vec![]],
            ..base()
        };
        assert_eq!(opts.validate(), Err(ConfigurationError::EmptyStopSequence(1)));
    }

    #[test]
    fn test_end_threshold_bounds() {
        let opts = DecodingOptions {
            end_threshold: Some(1.0),
            ..base()
        };
        opts.validate().unwrap();
        let opts = DecodingOptions {
            end_threshold: Some(0.0),
            ..base()
        };
        assert!(opts.validate().is_err());
    }
}
