use std::fmt::Debug;

use rand::{rngs::StdRng, SeedableRng};

use crate::types::SamplerError;

/// Trait for providing resources to samplers.
///
/// The only resource the built-in samplers need is an RNG for the final
/// token draw, so that is all this trait carries.
pub trait HasSamplerResources: Debug {
    /// Allows a sampler to mutably access the RNG (if present).
    fn with_rng_mut(
        &mut self,
        _fun: &mut dyn FnMut(&mut dyn rand::RngCore),
    ) -> Result<(), SamplerError> {
        Err(SamplerError::MissingResource("rng".to_string()))
    }
}

#[derive(Debug, Clone, Default)]
/// Empty resource structure for use with samplers that don't require
/// any resources.
pub struct NilSamplerResources;

impl NilSamplerResources {
    pub fn new() -> Self {
        Self
    }
}

impl HasSamplerResources for NilSamplerResources {}

impl HasSamplerResources for () {}

/// Simple resources that can provide an RNG to samplers.
pub struct SimpleSamplerResources {
    pub(crate) rng: Option<Box<dyn rand::RngCore + Send + Sync>>,
}

impl Debug for SimpleSamplerResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerResources")
            .field("rng", &self.rng.is_some())
            .finish()
    }
}

impl SimpleSamplerResources {
    pub fn new(rng: Option<Box<dyn rand::RngCore + Send + Sync>>) -> Self {
        Self { rng }
    }

    /// Resources holding a [StdRng] seeded from `seed`, or from entropy
    /// when no seed is given. A fixed seed makes repeated runs over
    /// identical logits reproduce the same token ids.
    pub fn seedable(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            rng: Some(Box::new(rng)),
        }
    }
}

impl HasSamplerResources for SimpleSamplerResources {
    fn with_rng_mut(
        &mut self,
        fun: &mut dyn FnMut(&mut dyn rand::RngCore),
    ) -> Result<(), SamplerError> {
        self.rng.as_mut().map_or_else(
            || Err(SamplerError::MissingResource("rng".to_string())),
            |rng| {
                fun(rng);
                Ok(())
            },
        )
    }
}
