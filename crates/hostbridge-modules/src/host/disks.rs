//! Mounted filesystems.

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};
use sysinfo::Disks;

use super::blocking;
use super::memory::percent;
use crate::sampler::{SampleError, SchemaSampler};

/// One mounted filesystem. Sizes in bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskData {
    /// Device name.
    pub name: String,
    /// Mount point.
    pub mount_point: String,
    /// Filesystem type.
    pub file_system: String,
    /// Capacity.
    pub total: u64,
    /// Free space available to unprivileged users.
    pub available: u64,
    /// Space in use.
    pub used: u64,
    /// Used percentage of capacity.
    pub used_percent: f64,
    /// Whether the device is removable.
    pub removable: bool,
}

/// Samples mounted filesystems. The `disks` data is an array.
pub struct DisksSampler;

#[async_trait]
impl SchemaSampler for DisksSampler {
    type Data = Vec<DiskData>;
    const MODULE: ModuleName = ModuleName::Disks;

    async fn collect(&self) -> Result<Vec<DiskData>, SampleError> {
        blocking(|| {
            let disks = Disks::new_with_refreshed_list();
            Ok(disks
                .iter()
                .filter(|d| d.total_space() > 0)
                .map(|disk| {
                    let total = disk.total_space();
                    let available = disk.available_space();
                    let used = total.saturating_sub(available);
                    DiskData {
                        name: disk.name().to_string_lossy().into_owned(),
                        mount_point: disk.mount_point().to_string_lossy().into_owned(),
                        file_system: disk.file_system().to_string_lossy().into_owned(),
                        total,
                        available,
                        used,
                        used_percent: percent(used, total),
                        removable: disk.is_removable(),
                    }
                })
                .collect())
        })
        .await
    }
}
