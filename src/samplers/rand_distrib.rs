use rand::distributions::{Distribution, WeightedIndex};

use crate::types::*;

/// # Random distribution sampling
/// Softmaxes the surviving candidates (this is the renormalization step
/// after any filtering samplers) and draws one token from the resulting
/// distribution with a single uniform draw from the resource RNG.
/// Candidates removed by earlier filters are simply absent, so their
/// selection probability is exactly zero.
///
/// **Properties**:
/// - Selects a token
///
/// **Parameters**:
/// - (none)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleRandDistrib {
    token_id: Option<TID>,
}

impl SampleRandDistrib {
    pub fn new() -> Self {
        Self { token_id: None }
    }

    pub fn get_token_id(&self) -> Option<TID> {
        self.token_id
    }
}

impl Sampler for SampleRandDistrib {
    fn sample<'a>(
        &mut self,
        res: &mut dyn HasSamplerResources,
        logits: &'a mut Logits,
    ) -> anyhow::Result<&'a mut Logits> {
        self.token_id = None;
        if logits.is_empty() {
            return Ok(logits);
        }
        logits.softmax()?;
        let dist = WeightedIndex::new(logits.iter().map(|l| l.prob))
            .map_err(SamplerError::RandWeightedError)?;
        let mut choice = None;
        res.with_rng_mut(&mut |rng| {
            choice = Some(dist.sample(rng));
        })?;
        let idx = choice
            .ok_or_else(|| SamplerError::InternalError("rng did not run".to_string()))?;
        self.token_id = Some(logits[idx].token_id);
        Ok(logits)
    }

    fn sampled_token_id(&self) -> Option<TID> {
        self.token_id
    }
}
