//! Battery state from the Linux power-supply class.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};

use super::blocking;
use crate::sampler::{SampleError, SchemaSampler};

/// Default sysfs directory for power supplies.
const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

/// `battery` module data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryData {
    /// Whether a battery was found.
    pub present: bool,
    /// Charge percent.
    pub percentage: Option<u8>,
    /// `Charging`, `Discharging`, `Full`, ...
    pub status: Option<String>,
    /// Whether the battery is charging.
    pub is_charging: bool,
    /// Whether external power is connected.
    pub on_ac_power: bool,
}

/// Reads the first battery under a power-supply directory.
pub struct BatterySampler {
    root: PathBuf,
}

impl BatterySampler {
    /// Sampler reading from `root` instead of the system directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for BatterySampler {
    fn default() -> Self {
        Self::with_root(POWER_SUPPLY_DIR)
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Scan `root` for supplies and summarize the first battery.
fn read_power_supplies(root: &Path) -> Result<BatteryData, SampleError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SampleError::Unsupported),
        Err(e) => return Err(e.into()),
    };

    let mut supplies: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    supplies.sort();

    let mut data = BatteryData::default();
    for supply in supplies {
        match read_trimmed(&supply.join("type")).as_deref() {
            Some("Mains" | "USB") => {
                if read_trimmed(&supply.join("online")).as_deref() == Some("1") {
                    data.on_ac_power = true;
                }
            }
            Some("Battery") if !data.present => {
                data.present = true;
                data.percentage = read_trimmed(&supply.join("capacity"))
                    .and_then(|c| c.parse::<u8>().ok())
                    .map(|c| c.min(100));
                data.status = read_trimmed(&supply.join("status"));
                data.is_charging = data.status.as_deref() == Some("Charging");
            }
            _ => {}
        }
    }
    Ok(data)
}

#[async_trait]
impl SchemaSampler for BatterySampler {
    type Data = BatteryData;
    const MODULE: ModuleName = ModuleName::Battery;

    async fn collect(&self) -> Result<BatteryData, SampleError> {
        let root = self.root.clone();
        blocking(move || read_power_supplies(&root)).await
    }
}
