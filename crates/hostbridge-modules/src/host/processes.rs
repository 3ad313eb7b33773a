//! Running processes.

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};
use sysinfo::ProcessesToUpdate;

use super::{OwnedSystem, blocking, owned_system};
use crate::sampler::{SampleError, SchemaSampler};

/// Processes reported per sample, busiest first.
const MAX_PROCESSES: usize = 200;

/// One process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessData {
    /// Process id.
    pub pid: u32,
    /// Executable name.
    pub name: String,
    /// CPU usage percent (may exceed 100 on multi-core hosts).
    pub cpu_usage: f32,
    /// Resident memory in bytes.
    pub memory: u64,
    /// Scheduler status.
    pub status: String,
    /// Seconds since the process started.
    pub run_time: u64,
}

/// Samples the process table.
pub struct ProcessesSampler {
    pub(super) system: OwnedSystem,
}

impl Default for ProcessesSampler {
    fn default() -> Self {
        Self {
            system: owned_system(),
        }
    }
}

#[async_trait]
impl SchemaSampler for ProcessesSampler {
    type Data = Vec<ProcessData>;
    const MODULE: ModuleName = ModuleName::Processes;

    async fn collect(&self) -> Result<Vec<ProcessData>, SampleError> {
        let system = self.system.clone();
        blocking(move || {
            let mut sys = system.lock();
            let _ = sys.refresh_processes(ProcessesToUpdate::All, true);
            let mut list: Vec<ProcessData> = sys
                .processes()
                .iter()
                .map(|(pid, process)| ProcessData {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    cpu_usage: process.cpu_usage(),
                    memory: process.memory(),
                    status: process.status().to_string(),
                    run_time: process.run_time(),
                })
                .collect();
            list.sort_by(|a, b| {
                b.cpu_usage
                    .total_cmp(&a.cpu_usage)
                    .then_with(|| b.memory.cmp(&a.memory))
            });
            list.truncate(MAX_PROCESSES);
            Ok(list)
        })
        .await
    }
}
