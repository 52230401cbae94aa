use crate::types::*;

/// # Top-K sampling
/// Restricts the candidate set to the `k` entries with the highest logit
/// values. The descending sort is stable, so on a tie at the boundary the
/// lowest token ids are the ones kept.
///
/// **Properties**:
/// - Filters logits
///
/// **Parameters**:
/// - `k`: Number of entries to keep. Use `0` to disable the filter.
///   (default: `40`)
/// - `min_keep`: Minimum number of entries to keep when the filter is
///   active. (default: `1`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTopK {
    k: usize,
    min_keep: usize,
}

impl Default for SampleTopK {
    fn default() -> Self {
        Self { k: 40, min_keep: 1 }
    }
}

impl SampleTopK {
    pub fn new(k: usize, min_keep: usize) -> Self {
        Self { k, min_keep }
    }

    pub fn min_keep(mut self, val: usize) -> Self {
        self.min_keep = val;
        self
    }

    pub fn k(mut self, val: usize) -> Self {
        self.k = val;
        self
    }
}

impl Sampler for SampleTopK {
    fn sample<'a>(
        &mut self,
        _res: &mut dyn HasSamplerResources,
        logits: &'a mut Logits,
    ) -> anyhow::Result<&'a mut Logits> {
        if self.k == 0 {
            return Ok(logits);
        }
        let k = self.k.max(self.min_keep).min(logits.len());
        logits
            .ensure_sorted()
            .map_err(SamplerError::LogitsError)?
            .truncate(k);
        Ok(logits)
    }
}
