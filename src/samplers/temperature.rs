use crate::types::*;

/// # Temperature sampling
/// Divides the logits by `temperature`, sharpening the distribution for
/// values below 1 and flattening it for values above 1.
///
/// **Properties**:
/// - Modifies logits
///
/// **Parameters**:
/// - `temperature`: Must be positive; a value of exactly 1 leaves the
///   logits untouched. (default: `1.0`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTemperature {
    temperature: L,
}

impl Default for SampleTemperature {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl SampleTemperature {
    pub fn new(temperature: L) -> Self {
        Self { temperature }
    }
}

impl Sampler for SampleTemperature {
    fn sample<'a>(
        &mut self,
        _res: &mut dyn HasSamplerResources,
        logits: &'a mut Logits,
    ) -> anyhow::Result<&'a mut Logits> {
        let temp = self.temperature;
        if temp != 1.0 {
            logits.iter_mut().for_each(|l| l.logit /= temp);
        }
        Ok(logits)
    }
}
