//! Default samplers for the local host.
//!
//! Each sysinfo-backed sampler owns its own `sysinfo::System` and refreshes
//! only the parts it reports, so a slow refresh in one module never holds
//! up another. All collection runs on the blocking pool.

mod battery;
mod cpu;
mod disks;
mod memory;
mod networks;
mod processes;
mod sensors;
mod system;
mod unsupported;

pub use battery::{BatteryData, BatterySampler};
pub use cpu::{CpuCore, CpuData, CpuSampler};
pub use disks::{DiskData, DisksSampler};
pub use memory::{MemoryData, MemorySampler};
pub use networks::{NetworkData, NetworksSampler};
pub use processes::{ProcessData, ProcessesSampler};
pub use sensors::{SensorData, SensorsSampler};
pub use system::{SystemData, SystemSampler};
pub use unsupported::UnsupportedSampler;

use std::sync::Arc;

use hostbridge_core::ModuleName;
use parking_lot::Mutex;
use sysinfo::System;

use crate::sampler::{SampleError, SamplerSet, Typed};

/// A sampler's private `sysinfo::System`.
///
/// Kept behind a lock so the blocking closure can own a handle; only the
/// owning sampler ever takes it.
pub(crate) type OwnedSystem = Arc<Mutex<System>>;

pub(crate) fn owned_system() -> OwnedSystem {
    Arc::new(Mutex::new(System::new()))
}

/// Run `f` on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, SampleError>
where
    F: FnOnce() -> Result<T, SampleError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SampleError::Join(e.to_string()))?
}

/// Every default sampler, one per module.
pub fn default_samplers() -> SamplerSet {
    SamplerSet::new()
        .with(Typed(BatterySampler::default()))
        .with(Typed(CpuSampler::default()))
        .with(Typed(DisksSampler))
        .with(UnsupportedSampler(ModuleName::Displays))
        .with(UnsupportedSampler(ModuleName::Gpus))
        .with(UnsupportedSampler(ModuleName::Media))
        .with(Typed(MemorySampler::default()))
        .with(Typed(NetworksSampler::default()))
        .with(Typed(ProcessesSampler::default()))
        .with(Typed(SensorsSampler))
        .with(Typed(SystemSampler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::ModuleSampler;
    use std::time::Duration;

    #[test]
    fn default_set_covers_every_module() {
        assert_eq!(default_samplers().modules(), ModuleName::ALL.to_vec());
    }

    #[tokio::test]
    async fn busy_processes_sampler_does_not_stall_cpu_or_memory() {
        let processes = ProcessesSampler::default();
        let busy = Arc::clone(&processes.system);
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = busy.lock();
            locked_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(1500));
        });
        locked_rx.recv().unwrap();

        let deadline = Duration::from_millis(500);
        let memory = tokio::time::timeout(deadline, Typed(MemorySampler::default()).sample())
            .await
            .expect("memory sampling blocked by the processes sampler");
        assert!(memory.is_ok());
        let cpu = tokio::time::timeout(deadline, Typed(CpuSampler::default()).sample())
            .await
            .expect("cpu sampling blocked by the processes sampler");
        assert!(!matches!(cpu, Err(SampleError::Join(_))));

        holder.join().unwrap();
    }

    #[tokio::test]
    async fn blocking_propagates_result() {
        let v = blocking(|| Ok(7)).await.unwrap();
        assert_eq!(v, 7);
        let err = blocking::<(), _>(|| Err(SampleError::Unsupported)).await.unwrap_err();
        assert!(matches!(err, SampleError::Unsupported));
    }
}
