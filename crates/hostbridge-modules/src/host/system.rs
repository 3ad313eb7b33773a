//! Host identity and uptime.

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use super::blocking;
use crate::sampler::{SampleError, SchemaSampler};

/// `system` module data.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    /// Host name.
    pub hostname: Option<String>,
    /// OS name, e.g. `Ubuntu`.
    pub os_name: Option<String>,
    /// OS version.
    pub os_version: Option<String>,
    /// Kernel version.
    pub kernel_version: Option<String>,
    /// Seconds since boot.
    pub uptime: u64,
    /// Boot time as a Unix timestamp.
    pub boot_time: u64,
    /// Daemon version.
    pub version: String,
}

/// Samples host identity.
pub struct SystemSampler;

#[async_trait]
impl SchemaSampler for SystemSampler {
    type Data = SystemData;
    const MODULE: ModuleName = ModuleName::System;

    async fn collect(&self) -> Result<SystemData, SampleError> {
        blocking(|| {
            Ok(SystemData {
                hostname: System::host_name(),
                os_name: System::name(),
                os_version: System::os_version(),
                kernel_version: System::kernel_version(),
                uptime: System::uptime(),
                boot_time: System::boot_time(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            })
        })
        .await
    }
}
