//! RAM and swap.

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};

use super::{OwnedSystem, blocking, owned_system};
use crate::sampler::{SampleError, SchemaSampler};

/// `memory` module data, in bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryData {
    /// Installed RAM.
    pub total: u64,
    /// RAM in use.
    pub used: u64,
    /// RAM available for new allocations.
    pub available: u64,
    /// Unused RAM.
    pub free: u64,
    /// Used percentage of total RAM.
    pub used_percent: f64,
    /// Swap size.
    pub swap_total: u64,
    /// Swap in use.
    pub swap_used: u64,
}

/// Samples memory counters.
pub struct MemorySampler {
    pub(super) system: OwnedSystem,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self {
            system: owned_system(),
        }
    }
}

/// Percentage of `part` in `total`, or zero when `total` is zero.
pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[async_trait]
impl SchemaSampler for MemorySampler {
    type Data = MemoryData;
    const MODULE: ModuleName = ModuleName::Memory;

    async fn collect(&self) -> Result<MemoryData, SampleError> {
        let system = self.system.clone();
        blocking(move || {
            let mut sys = system.lock();
            sys.refresh_memory();
            let total = sys.total_memory();
            let used = sys.used_memory();
            Ok(MemoryData {
                total,
                used,
                available: sys.available_memory(),
                free: sys.free_memory(),
                used_percent: percent(used, total),
                swap_total: sys.total_swap(),
                swap_used: sys.used_swap(),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_handles_zero_total() {
        assert!(percent(5, 0).abs() < f64::EPSILON);
        assert!((percent(25, 100) - 25.0).abs() < f64::EPSILON);
    }
}
