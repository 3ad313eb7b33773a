//! Sampling cadence settings.

use std::collections::BTreeMap;
use std::time::Duration;

use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};

/// How often each module is sampled and how long a sample may take.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    /// Cadence for modules without an override.
    pub default_interval_ms: u64,
    /// Per-module cadence overrides.
    pub intervals_ms: BTreeMap<ModuleName, u64>,
    /// Deadline for a single sample.
    pub sample_timeout_ms: u64,
    /// Modules that are never sampled. Their cache entry stays at the default.
    pub disabled: Vec<ModuleName>,
}

impl PollingSettings {
    /// Effective cadence for `module`.
    pub fn interval_for(&self, module: ModuleName) -> Duration {
        let ms = self
            .intervals_ms
            .get(&module)
            .copied()
            .unwrap_or(self.default_interval_ms);
        Duration::from_millis(ms)
    }

    /// Sample deadline.
    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    /// Whether `module` should be scheduled.
    pub fn is_enabled(&self, module: ModuleName) -> bool {
        !self.disabled.contains(&module)
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            default_interval_ms: 30_000,
            intervals_ms: BTreeMap::from([
                (ModuleName::Cpu, 5_000),
                (ModuleName::Memory, 5_000),
                (ModuleName::Networks, 10_000),
                (ModuleName::Processes, 10_000),
            ]),
            sample_timeout_ms: 10_000,
            disabled: Vec::new(),
        }
    }
}
