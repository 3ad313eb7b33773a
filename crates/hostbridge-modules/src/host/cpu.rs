//! Processor usage.

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};

use super::{OwnedSystem, blocking, owned_system};
use crate::sampler::{SampleError, SchemaSampler};

/// `cpu` module data.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuData {
    /// Brand string of the first core.
    pub brand: String,
    /// Overall usage percent.
    pub usage: f32,
    /// Per-core figures.
    pub cores: Vec<CpuCore>,
}

/// One logical core.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuCore {
    /// Kernel name, e.g. `cpu0`.
    pub name: String,
    /// Usage percent.
    pub usage: f32,
    /// Current frequency in MHz.
    pub frequency_mhz: u64,
}

/// Samples CPU usage. The first sample after start reports zero usage,
/// since usage is measured between refreshes.
pub struct CpuSampler {
    pub(super) system: OwnedSystem,
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self {
            system: owned_system(),
        }
    }
}

#[async_trait]
impl SchemaSampler for CpuSampler {
    type Data = CpuData;
    const MODULE: ModuleName = ModuleName::Cpu;

    async fn collect(&self) -> Result<CpuData, SampleError> {
        let system = self.system.clone();
        blocking(move || {
            let mut sys = system.lock();
            sys.refresh_cpu_all();
            let cores: Vec<CpuCore> = sys
                .cpus()
                .iter()
                .map(|cpu| CpuCore {
                    name: cpu.name().to_owned(),
                    usage: cpu.cpu_usage(),
                    frequency_mhz: cpu.frequency(),
                })
                .collect();
            if cores.is_empty() {
                return Err(SampleError::Unsupported);
            }
            Ok(CpuData {
                brand: sys.cpus().first().map(|c| c.brand().trim().to_owned()).unwrap_or_default(),
                usage: sys.global_cpu_usage(),
                cores,
            })
        })
        .await
    }
}
