use crate::{options::DecodingOptions, types::TID};

/// Outcome of the per-step stop check.
///
/// [StopVerdict::EndToken] stops before the token would be emitted, which
/// is what makes end-token suppression possible; the other stopping
/// verdicts keep the boundary token in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopVerdict {
    /// Keep generating.
    Continue,
    /// The sampled token is the (unsuppressed-or-not) end token and all
    /// gates cleared.
    EndToken,
    /// The generated suffix matches a configured stop sequence.
    StopSequence,
    /// The generated token count hit the configured maximum.
    MaxLength,
}

/// Tracks the stopping rules of one generation call.
///
/// The checks run in a fixed order and the first satisfied one wins: end
/// token (gated by `min_len` and `end_threshold`), then stop-sequence
/// suffix match (independent of `min_len`), then the length bound.
#[derive(Debug, Clone)]
pub struct StopConditions {
    min_len: usize,
    max_len: usize,
    end_token_id: TID,
    end_threshold: Option<f32>,
    stop_sequences: Vec<Vec<TID>>,
}

impl StopConditions {
    pub fn new(options: &DecodingOptions) -> Self {
        Self {
            min_len: options.min_len,
            max_len: options.max_len,
            end_token_id: options.end_token_id,
            end_threshold: options.end_threshold,
            stop_sequences: options.stop_sequences_ids.clone(),
        }
    }

    /// Evaluates the stop conditions after `sampled` was appended as the
    /// `step`-th generated token (0-based). `generated` holds every
    /// generated token so far including `sampled`; `end_prob` is the
    /// probability mass of the end token this step, measured on the
    /// configured basis.
    pub fn evaluate(&self, generated: &[TID], step: usize, sampled: TID, end_prob: f32) -> StopVerdict {
        if sampled == self.end_token_id
            && step + 1 >= self.min_len
            && self.end_threshold.map_or(true, |t| end_prob >= t)
        {
            return StopVerdict::EndToken;
        }

        if self.matches_stop_sequence(generated) {
            return StopVerdict::StopSequence;
        }

        if step + 1 >= self.max_len {
            return StopVerdict::MaxLength;
        }

        StopVerdict::Continue
    }

    /// Suffix-exact match of the generated tokens against any configured
    /// stop sequence. Sequences longer than the generated output cannot
    /// match.
    fn matches_stop_sequence(&self, generated: &[TID]) -> bool {
        self.stop_sequences
            .iter()
            .any(|seq| generated.len() >= seq.len() && generated.ends_with(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DecodingOptions;

    fn conditions(options: DecodingOptions) -> StopConditions {
        StopConditions::new(&options)
    }

    #[test]
    fn test_end_token_stops() {
        let sc = conditions(DecodingOptions {
            end_token_id: 0,
            min_len: 0,
            max_len: 10,
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[0], 0, 0, 0.9), StopVerdict::EndToken);
    }

    #[test]
    fn test_min_len_suppresses_end_token() {
        let sc = conditions(DecodingOptions {
            end_token_id: 0,
            min_len: 3,
            max_len: 10,
            ..Default::default()
        });
        // step+1 < min_len: end token must not stop, whatever the mass.
        assert_eq!(sc.evaluate(&[0], 0, 0, 1.0), StopVerdict::Continue);
        assert_eq!(sc.evaluate(&[0, 0], 1, 0, 1.0), StopVerdict::Continue);
        // Boundary: step+1 == min_len.
        assert_eq!(sc.evaluate(&[0, 0, 0], 2, 0, 1.0), StopVerdict::EndToken);
    }

    #[test]
    fn test_min_len_suppression_holds_for_any_threshold() {
        let sc = conditions(DecodingOptions {
            end_token_id: 0,
            min_len: 5,
            max_len: 10,
            end_threshold: Some(0.01),
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[0], 0, 0, 1.0), StopVerdict::Continue);
    }

    #[test]
    fn test_end_threshold_gates_end_token() {
        let sc = conditions(DecodingOptions {
            end_token_id: 0,
            min_len: 0,
            max_len: 10,
            end_threshold: Some(0.5),
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[0], 0, 0, 0.4), StopVerdict::Continue);
        assert_eq!(sc.evaluate(&[0], 0, 0, 0.5), StopVerdict::EndToken);
    }

    #[test]
    fn test_stop_sequence_fires_on_exact_completing_step() {
        let sc = conditions(DecodingOptions {
            end_token_id: 99,
            max_len: 10,
            stop_sequences_ids: vec![vec![5, 6]],
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[1], 0, 1, 0.0), StopVerdict::Continue);
        assert_eq!(sc.evaluate(&[1, 5], 1, 5, 0.0), StopVerdict::Continue);
        assert_eq!(sc.evaluate(&[1, 5, 6], 2, 6, 0.0), StopVerdict::StopSequence);
    }

    #[test]
    fn test_stop_sequence_ignores_min_len() {
        let sc = conditions(DecodingOptions {
            end_token_id: 99,
            min_len: 8,
            max_len: 10,
            stop_sequences_ids: vec![vec![5, 6]],
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[5, 6], 1, 6, 0.0), StopVerdict::StopSequence);
    }

    #[test]
    fn test_stop_sequence_longer_than_output() {
        let sc = conditions(DecodingOptions {
            end_token_id: 99,
            max_len: 10,
            stop_sequences_ids: vec![vec![1, 2, 3]],
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[2, 3], 1, 3, 0.0), StopVerdict::Continue);
    }

    #[test]
    fn test_max_len_forces_stop() {
        let sc = conditions(DecodingOptions {
            end_token_id: 99,
            max_len: 3,
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[1, 2], 1, 2, 0.0), StopVerdict::Continue);
        assert_eq!(sc.evaluate(&[1, 2, 3], 2, 3, 0.0), StopVerdict::MaxLength);
    }

    #[test]
    fn test_end_token_wins_over_stop_sequence() {
        // Both fire on the same step: the end-token check runs first.
        let sc = conditions(DecodingOptions {
            end_token_id: 6,
            min_len: 0,
            max_len: 10,
            stop_sequences_ids: vec![vec![5, 6]],
            ..Default::default()
        });
        assert_eq!(sc.evaluate(&[5, 6], 1, 6, 1.0), StopVerdict::EndToken);
    }
}
