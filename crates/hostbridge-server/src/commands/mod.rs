//! Command router and built-in command handlers.
//!
//! Every command is a name mapped to a [`CommandHandler`], registered once
//! at startup. The router bounds each invocation with a timeout and turns
//! the outcome into a `commandResult` or `error` response.

mod brightness;
mod execute;
mod filesystem;
mod open;
mod power;
pub mod process;
mod settings;

pub use brightness::{BACKLIGHT_DIR, SetBrightnessHandler};
pub use execute::CommandExecuteHandler;
pub use filesystem::{
    BaseDirectories, BaseDirectory, FileEntry, GetDirectoriesHandler, GetDirectoryHandler,
    GetFileHandler, GetFilesHandler, ValidateDirectoryHandler,
};
pub use open::OpenHandler;
pub use power::{PowerAction, PowerHandler};
pub use process::{ProcessOutput, ProcessRunner, ProcessSpec, TokioProcessRunner};
pub use settings::{ExitApplicationHandler, GetSettingsHandler, UpdateSettingsHandler};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hostbridge_core::protocol::is_reserved_event;
use hostbridge_core::{BridgeError, ModuleName, Response};
use hostbridge_settings::BridgeSettings;
use metrics::{counter, histogram};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::metrics::{COMMAND_DURATION_SECONDS, COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL};
use crate::shutdown::ShutdownCoordinator;

/// Why a command failed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Missing or malformed `data` fields.
    #[error("{0}")]
    InvalidParams(String),
    /// Path, command id, or device not found.
    #[error("{0}")]
    NotFound(String),
    /// Not available on this platform.
    #[error("{0}")]
    Unsupported(String),
    /// Execution failed.
    #[error("{0}")]
    Failed(String),
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Failed(err.to_string()),
        }
    }
}

/// Trait implemented by every command handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Execute with the request's `data`.
    async fn execute(&self, data: Value) -> Result<Value, CommandError>;
}

/// Read a required string field from `data`.
pub(crate) fn require_str<'a>(data: &'a Value, key: &str) -> Result<&'a str, CommandError> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CommandError::InvalidParams(format!("missing '{key}'")))
}

/// Why a registration was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistrationError {
    /// Name is a module name.
    #[error("command name '{0}' collides with a module")]
    ModuleName(String),
    /// Name is a protocol event.
    #[error("command name '{0}' is a reserved event")]
    Reserved(String),
    /// Name already registered.
    #[error("command '{0}' is already registered")]
    Duplicate(String),
}

/// Registry mapping command names to handlers.
pub struct CommandRouter {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    timeout: Duration,
}

impl CommandRouter {
    /// Default per-command deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Empty router with the given deadline.
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    /// Register a handler for a command name.
    pub fn register(
        &mut self,
        name: &str,
        handler: impl CommandHandler + 'static,
    ) -> Result<(), RegistrationError> {
        if ModuleName::is_module(name) {
            return Err(RegistrationError::ModuleName(name.to_owned()));
        }
        if is_reserved_event(name) {
            return Err(RegistrationError::Reserved(name.to_owned()));
        }
        if self.handlers.contains_key(name) {
            return Err(RegistrationError::Duplicate(name.to_owned()));
        }
        let _ = self.handlers.insert(name.to_owned(), Arc::new(handler));
        Ok(())
    }

    /// Run `name` with `data` and build the response echoing `id`.
    ///
    /// Callers check [`has_command`](Self::has_command) first; an unknown
    /// name yields an `UNKNOWN_EVENT` error.
    pub async fn dispatch(&self, id: Option<String>, name: &str, data: Value) -> Response {
        let Some(handler) = self.handlers.get(name) else {
            return BridgeError::UnknownEvent(name.to_owned()).to_response(id);
        };
        counter!(COMMANDS_TOTAL, "command" => name.to_owned()).increment(1);

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, handler.execute(data)).await;
        histogram!(COMMAND_DURATION_SECONDS, "command" => name.to_owned())
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(Ok(value)) => {
                debug!(command = name, "command succeeded");
                Response::command_result(id, value)
            }
            Ok(Err(err)) => {
                counter!(COMMAND_ERRORS_TOTAL, "command" => name.to_owned(), "error_type" => "failed")
                    .increment(1);
                warn!(command = name, error = %err, "command failed");
                BridgeError::CommandHandler {
                    command: name.to_owned(),
                    message: err.to_string(),
                }
                .to_response(id)
            }
            Err(_elapsed) => {
                counter!(COMMAND_ERRORS_TOTAL, "command" => name.to_owned(), "error_type" => "timeout")
                    .increment(1);
                warn!(command = name, "command timed out after {:?}", self.timeout);
                BridgeError::CommandTimeout {
                    command: name.to_owned(),
                    timeout: self.timeout,
                }
                .to_response(id)
            }
        }
    }

    /// List all registered command names (sorted).
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a command is registered.
    pub fn has_command(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

/// Settings shared between the handlers that read and update them.
pub type SharedSettings = Arc<RwLock<BridgeSettings>>;

/// Collaborators the built-in handlers need.
pub struct CommandDeps {
    /// Subprocess runner.
    pub runner: Arc<dyn ProcessRunner>,
    /// Live settings (allowlist, display copy, updates).
    pub settings: SharedSettings,
    /// File that `update-settings` writes to.
    pub settings_path: PathBuf,
    /// Base directories for the file browsing commands.
    pub directories: Arc<BaseDirectories>,
    /// Shutdown trigger for `exit-application`.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Backlight sysfs directory for `set-brightness`.
    pub backlight_dir: PathBuf,
}

/// Register every built-in command.
pub fn register_builtin(
    router: &mut CommandRouter,
    deps: &CommandDeps,
) -> Result<(), RegistrationError> {
    router.register("open", OpenHandler::new(deps.runner.clone()))?;
    router.register("set-brightness", SetBrightnessHandler::new(deps.backlight_dir.clone()))?;
    router.register("power", PowerHandler::new(deps.runner.clone()))?;
    router.register(
        "command-execute",
        CommandExecuteHandler::new(deps.runner.clone(), deps.settings.clone()),
    )?;
    router.register("get-directories", GetDirectoriesHandler::new(deps.directories.clone()))?;
    router.register("get-directory", GetDirectoryHandler::new(deps.directories.clone()))?;
    router.register("get-files", GetFilesHandler::new(deps.directories.clone()))?;
    router.register("get-file", GetFileHandler)?;
    router.register("validate-directory", ValidateDirectoryHandler)?;
    router.register("get-settings", GetSettingsHandler::new(deps.settings.clone()))?;
    router.register(
        "update-settings",
        UpdateSettingsHandler::new(deps.settings.clone(), deps.settings_path.clone()),
    )?;
    router.register("exit-application", ExitApplicationHandler::new(deps.shutdown.clone()))?;
    Ok(())
}
