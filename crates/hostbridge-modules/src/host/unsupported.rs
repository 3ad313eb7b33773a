//! Placeholder for modules with no source on this host.

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde_json::Value;

use crate::sampler::{ModuleSampler, SampleError};

/// Always reports [`SampleError::Unsupported`], so the module's entry stays
/// `ok=false` with an explanatory error instead of never being sampled.
pub struct UnsupportedSampler(pub ModuleName);

#[async_trait]
impl ModuleSampler for UnsupportedSampler {
    fn module(&self) -> ModuleName {
        self.0
    }

    async fn sample(&self) -> Result<Value, SampleError> {
        Err(SampleError::Unsupported)
    }
}
