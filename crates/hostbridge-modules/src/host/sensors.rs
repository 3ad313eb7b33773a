//! Temperature sensors.

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use serde::{Deserialize, Serialize};
use sysinfo::Components;

use super::blocking;
use crate::sampler::{SampleError, SchemaSampler};

/// One sensor. Temperatures in degrees Celsius.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    /// Sensor label.
    pub label: String,
    /// Current reading.
    pub temperature: Option<f32>,
    /// Highest reading seen.
    pub max: Option<f32>,
    /// Critical threshold.
    pub critical: Option<f32>,
}

/// Samples hardware sensors.
pub struct SensorsSampler;

#[async_trait]
impl SchemaSampler for SensorsSampler {
    type Data = Vec<SensorData>;
    const MODULE: ModuleName = ModuleName::Sensors;

    async fn collect(&self) -> Result<Vec<SensorData>, SampleError> {
        blocking(|| {
            let components = Components::new_with_refreshed_list();
            Ok(components
                .iter()
                .map(|c| SensorData {
                    label: c.label().to_owned(),
                    temperature: c.temperature().filter(|t| t.is_finite()),
                    max: c.max().filter(|t| t.is_finite()),
                    critical: c.critical().filter(|t| t.is_finite()),
                })
                .collect())
        })
        .await
    }
}
