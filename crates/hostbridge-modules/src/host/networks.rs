//! Network interfaces with throughput since the previous sample.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hostbridge_core::ModuleName;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::Networks;

use super::blocking;
use crate::sampler::{SampleError, SchemaSampler};

/// One interface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkData {
    /// Interface name.
    pub name: String,
    /// Hardware address.
    pub mac_address: String,
    /// Bytes received since boot.
    pub total_received: u64,
    /// Bytes sent since boot.
    pub total_transmitted: u64,
    /// Receive rate since the previous sample, bytes per second.
    pub received_per_sec: f64,
    /// Send rate since the previous sample, bytes per second.
    pub transmitted_per_sec: f64,
}

struct NetState {
    networks: Networks,
    refreshed_at: Instant,
}

/// Samples interfaces. Rates are zero on the first sample.
pub struct NetworksSampler {
    state: Arc<Mutex<NetState>>,
}

impl Default for NetworksSampler {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetState {
                networks: Networks::new_with_refreshed_list(),
                refreshed_at: Instant::now(),
            })),
        }
    }
}

/// Bytes per second for `bytes` over `secs`, zero for an empty window.
fn rate(bytes: u64, secs: f64) -> f64 {
    if secs > 0.0 { bytes as f64 / secs } else { 0.0 }
}

#[async_trait]
impl SchemaSampler for NetworksSampler {
    type Data = Vec<NetworkData>;
    const MODULE: ModuleName = ModuleName::Networks;

    async fn collect(&self) -> Result<Vec<NetworkData>, SampleError> {
        let state = self.state.clone();
        blocking(move || {
            let mut state = state.lock();
            state.networks.refresh(true);
            let now = Instant::now();
            let secs = now.duration_since(state.refreshed_at).as_secs_f64();
            state.refreshed_at = now;

            let mut out: Vec<NetworkData> = state
                .networks
                .iter()
                .map(|(name, data)| NetworkData {
                    name: name.clone(),
                    mac_address: data.mac_address().to_string(),
                    total_received: data.total_received(),
                    total_transmitted: data.total_transmitted(),
                    received_per_sec: rate(data.received(), secs),
                    transmitted_per_sec: rate(data.transmitted(), secs),
                })
                .collect();
            out.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(out)
        })
        .await
    }
}
