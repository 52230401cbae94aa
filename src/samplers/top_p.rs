use crate::types::*;

/// # Top-P (nucleus) sampling
/// This sampler adds up the token probabilities in descending order until
/// the cumulative value is greater or equal to `p` and at least `min_keep`
/// tokens have been encountered. The remaining tokens are eliminated; the
/// survivors are renormalized by the token-picking sampler's softmax.
///
/// **Properties**:
/// - Filters logits
///
/// **Parameters**:
/// - `p`: Target value. Use `1.0` (or more) to disable the filter.
///   (default: `0.9`)
/// - `min_keep`: Minimum number of entries to keep. (default: `1`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTopP {
    p: L,
    min_keep: usize,
}

impl Default for SampleTopP {
    fn default() -> Self {
        Self {
            p: 0.9,
            min_keep: 1,
        }
    }
}

impl SampleTopP {
    pub fn new(p: L, min_keep: usize) -> Self {
        Self { p, min_keep }
    }

    pub fn min_keep(mut self, val: usize) -> Self {
        self.min_keep = val;
        self
    }

    pub fn p(mut self, val: L) -> Self {
        self.p = val;
        self
    }
}

impl Sampler for SampleTopP {
    fn sample<'a>(
        &mut self,
        _res: &mut dyn HasSamplerResources,
        logits: &'a mut Logits,
    ) -> anyhow::Result<&'a mut Logits> {
        use std::ops::ControlFlow::*;

        let Self { p, min_keep } = *self;
        if p >= 1.0 || logits.is_empty() {
            return Ok(logits);
        }
        logits.softmax()?;

        let mut cum_sum = 0f32;
        let last_idx =
            match logits
                .iter()
                .enumerate()
                .try_fold(logits.len(), |last_idx, (idx, logit)| {
                    cum_sum += logit.prob;
                    if cum_sum >= p && idx + 1 >= min_keep {
                        return Break(idx + 1);
                    }
                    Continue(last_idx)
                }) {
                Continue(i) => i,
                Break(i) => i,
            };
        logits.truncate(last_idx);
        Ok(logits)
    }
}
