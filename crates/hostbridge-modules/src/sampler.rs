//! Module sampler trait and schema validation.
//!
//! Samplers are the only code that touches the host. The protocol layer
//! treats module data as an opaque JSON value, so the concrete shape is
//! declared here: a [`SchemaSampler`] names its `Data` type and the
//! [`Typed`] adaptor checks every sample against it before it reaches the
//! cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Why a sample produced no data.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    /// Collection failed.
    #[error("{0}")]
    Failed(String),
    /// The host has no source for this module.
    #[error("not supported on this host")]
    Unsupported,
    /// The sample did not match the module's declared schema.
    #[error("schema violation: {0}")]
    Schema(String),
    /// The blocking collection task panicked or was cancelled.
    #[error("sampler task failed: {0}")]
    Join(String),
}

impl From<std::io::Error> for SampleError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Produces the current data for one module.
#[async_trait]
pub trait ModuleSampler: Send + Sync {
    /// Module this sampler feeds.
    fn module(&self) -> ModuleName;

    /// Take one sample.
    async fn sample(&self) -> Result<Value, SampleError>;
}

/// A sampler with a concrete data schema.
#[async_trait]
pub trait SchemaSampler: Send + Sync {
    /// Declared shape of this module's data.
    type Data: Serialize + DeserializeOwned + Send;

    /// Module this sampler feeds.
    const MODULE: ModuleName;

    /// Collect one typed sample.
    async fn collect(&self) -> Result<Self::Data, SampleError>;
}

/// Adapts a [`SchemaSampler`] to [`ModuleSampler`], validating each sample.
pub struct Typed<S>(pub S);

#[async_trait]
impl<S> ModuleSampler for Typed<S>
where
    S: SchemaSampler + 'static,
{
    fn module(&self) -> ModuleName {
        S::MODULE
    }

    async fn sample(&self) -> Result<Value, SampleError> {
        let data = self.0.collect().await?;
        validate_schema(&data)
    }
}

/// Serialize `data` and check it against its own type.
///
/// Module data must be a JSON object or array, and must deserialize back
/// into `T` (catches non-finite floats and hand-written `Serialize` impls
/// that drift from the type).
pub fn validate_schema<T>(data: &T) -> Result<Value, SampleError>
where
    T: Serialize + DeserializeOwned,
{
    let value = serde_json::to_value(data).map_err(|e| SampleError::Schema(e.to_string()))?;
    if !(value.is_object() || value.is_array()) {
        return Err(SampleError::Schema(
            "module data must be an object or array".into(),
        ));
    }
    let _: T = serde_json::from_value(value.clone()).map_err(|e| SampleError::Schema(e.to_string()))?;
    Ok(value)
}

/// At most one sampler per module.
#[derive(Clone, Default)]
pub struct SamplerSet {
    samplers: HashMap<ModuleName, Arc<dyn ModuleSampler>>,
}

impl SamplerSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sampler, replacing any existing one for the same module.
    pub fn insert(&mut self, sampler: Arc<dyn ModuleSampler>) {
        let _ = self.samplers.insert(sampler.module(), sampler);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, sampler: impl ModuleSampler + 'static) -> Self {
        self.insert(Arc::new(sampler));
        self
    }

    /// Remove the sampler for `module`.
    pub fn remove(&mut self, module: ModuleName) {
        let _ = self.samplers.remove(&module);
    }

    /// Sampler for `module`, if any.
    pub fn get(&self, module: ModuleName) -> Option<Arc<dyn ModuleSampler>> {
        self.samplers.get(&module).cloned()
    }

    /// Modules that have a sampler (sorted).
    pub fn modules(&self) -> Vec<ModuleName> {
        let mut modules: Vec<_> = self.samplers.keys().copied().collect();
        modules.sort();
        modules
    }

    /// Number of samplers.
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    /// Whether no sampler is registered.
    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }
}
