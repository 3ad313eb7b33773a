//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON files deserialize with missing fields taken from [`Default`].

mod commands;
mod polling;
mod server;

pub use commands::*;
pub use polling::*;
pub use server::*;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the daemon.
///
/// ```json
/// {
///   "api": { "port": 9170, "token": "..." },
///   "polling": { "intervalsMs": { "cpu": 2000 } },
///   "commands": { "allowlist": [{ "id": "backup", "name": "Backup", "command": "/usr/bin/backup" }] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Listener address and shared-secret token.
    pub api: ApiSettings,
    /// Sampling cadence and deadlines.
    pub polling: PollingSettings,
    /// Connection limits, heartbeat, and command deadlines.
    pub server: ServerSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
    /// Commands runnable through `command-execute`.
    pub commands: CommandSettings,
}

impl BridgeSettings {
    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.polling.default_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "polling.defaultIntervalMs must be positive".into(),
            ));
        }
        if let Some((module, _)) = self.polling.intervals_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(SettingsError::InvalidValue(format!(
                "polling.intervalsMs.{module} must be positive"
            )));
        }
        if self.polling.sample_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "polling.sampleTimeoutMs must be positive".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be positive".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be positive".into(),
            ));
        }
        let mut seen = HashSet::new();
        for cmd in &self.commands.allowlist {
            if cmd.id.is_empty() || cmd.command.is_empty() {
                return Err(SettingsError::InvalidValue(
                    "commands.allowlist entries need an id and a command".into(),
                ));
            }
            if !seen.insert(cmd.id.as_str()) {
                return Err(SettingsError::InvalidValue(format!(
                    "duplicate command id in allowlist: {}",
                    cmd.id
                )));
            }
        }
        Ok(())
    }

    /// Copy with the token removed, for display to clients.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api.token = None;
        copy
    }
}
