//! Settings inspection and update, and the exit command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hostbridge_settings::{BridgeSettings, SettingsError, update_settings};
use serde_json::{Value, json};
use tracing::info;

use super::{CommandError, CommandHandler, SharedSettings};
use crate::shutdown::ShutdownCoordinator;

fn redacted_value(settings: &BridgeSettings) -> Result<Value, CommandError> {
    serde_json::to_value(settings.redacted()).map_err(|e| CommandError::Failed(e.to_string()))
}

/// Current settings with the token removed.
pub struct GetSettingsHandler {
    settings: SharedSettings,
}

impl GetSettingsHandler {
    /// Handler reporting `settings`.
    pub fn new(settings: SharedSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CommandHandler for GetSettingsHandler {
    async fn execute(&self, _data: Value) -> Result<Value, CommandError> {
        redacted_value(&self.settings.read())
    }
}

/// Merges `data` into the settings, persists it, and replies with the result.
///
/// Listener and polling changes apply on the next start; the command
/// allowlist applies immediately.
pub struct UpdateSettingsHandler {
    settings: SharedSettings,
    path: PathBuf,
}

impl UpdateSettingsHandler {
    /// Handler writing to the settings file at `path`.
    pub fn new(settings: SharedSettings, path: PathBuf) -> Self {
        Self { settings, path }
    }
}

#[async_trait]
impl CommandHandler for UpdateSettingsHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let current = self.settings.read().clone();
        let path = self.path.clone();
        let updated = tokio::task::spawn_blocking(move || update_settings(&path, &current, data))
            .await
            .map_err(|e| CommandError::Failed(e.to_string()))?
            .map_err(|e| match e {
                SettingsError::Io(io) => CommandError::Failed(io.to_string()),
                other => CommandError::InvalidParams(other.to_string()),
            })?;
        let reply = redacted_value(&updated)?;
        *self.settings.write() = updated;
        info!(path = %self.path.display(), "settings updated by client");
        Ok(reply)
    }
}

/// Triggers daemon shutdown after the reply has had time to go out.
pub struct ExitApplicationHandler {
    shutdown: Arc<ShutdownCoordinator>,
    delay: Duration,
}

impl ExitApplicationHandler {
    /// Grace period between the reply and the shutdown signal.
    pub const REPLY_GRACE: Duration = Duration::from_millis(250);

    /// Handler triggering `shutdown`.
    pub fn new(shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self {
            shutdown,
            delay: Self::REPLY_GRACE,
        }
    }
}

#[async_trait]
impl CommandHandler for ExitApplicationHandler {
    async fn execute(&self, _data: Value) -> Result<Value, CommandError> {
        info!("exit requested by client");
        let shutdown = Arc::clone(&self.shutdown);
        let delay = self.delay;
        drop(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shutdown.shutdown();
        }));
        Ok(json!({ "status": "exiting" }))
    }
}
