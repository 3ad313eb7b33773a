//! Power actions: lock, sleep, restart and friends.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{CommandError, CommandHandler, ProcessRunner, ProcessSpec, require_str};

/// Session and power-state transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerAction {
    /// Lock the screen.
    Lock,
    /// Suspend to RAM.
    Sleep,
    /// Suspend to disk.
    Hibernate,
    /// Reboot.
    Restart,
    /// Power off.
    Shutdown,
    /// End the user session.
    Logout,
}

impl PowerAction {
    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Sleep => "sleep",
            Self::Hibernate => "hibernate",
            Self::Restart => "restart",
            Self::Shutdown => "shutdown",
            Self::Logout => "logout",
        }
    }

    /// Platform command for this action.
    pub fn spec(self) -> ProcessSpec {
        if cfg!(windows) {
            match self {
                Self::Lock => ProcessSpec::new("rundll32.exe", ["user32.dll,LockWorkStation"]),
                Self::Sleep => {
                    ProcessSpec::new("rundll32.exe", ["powrprof.dll,SetSuspendState", "0,1,0"])
                }
                Self::Hibernate => {
                    ProcessSpec::new("rundll32.exe", ["powrprof.dll,SetSuspendState", "1,1,0"])
                }
                Self::Restart => ProcessSpec::new("shutdown", ["/r", "/t", "0"]),
                Self::Shutdown => ProcessSpec::new("shutdown", ["/s", "/t", "0"]),
                Self::Logout => ProcessSpec::new("shutdown", ["/l"]),
            }
        } else if cfg!(target_os = "macos") {
            match self {
                Self::Lock => ProcessSpec::new("pmset", ["displaysleepnow"]),
                Self::Sleep | Self::Hibernate => ProcessSpec::new("pmset", ["sleepnow"]),
                Self::Restart => ProcessSpec::new("shutdown", ["-r", "now"]),
                Self::Shutdown => ProcessSpec::new("shutdown", ["-h", "now"]),
                Self::Logout => ProcessSpec::new(
                    "osascript",
                    ["-e", "tell application \"System Events\" to log out"],
                ),
            }
        } else {
            match self {
                Self::Lock => ProcessSpec::new("loginctl", ["lock-session"]),
                Self::Sleep => ProcessSpec::new("systemctl", ["suspend"]),
                Self::Hibernate => ProcessSpec::new("systemctl", ["hibernate"]),
                Self::Restart => ProcessSpec::new("systemctl", ["reboot"]),
                Self::Shutdown => ProcessSpec::new("systemctl", ["poweroff"]),
                Self::Logout => {
                    let user = std::env::var("USER").unwrap_or_default();
                    ProcessSpec::new("loginctl", ["terminate-user".to_owned(), user])
                }
            }
        }
    }
}

impl FromStr for PowerAction {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "lock" => Self::Lock,
            "sleep" | "suspend" => Self::Sleep,
            "hibernate" => Self::Hibernate,
            "restart" | "reboot" => Self::Restart,
            "shutdown" | "poweroff" => Self::Shutdown,
            "logout" => Self::Logout,
            other => {
                return Err(CommandError::InvalidParams(format!(
                    "unknown power action: {other}"
                )));
            }
        })
    }
}

/// Runs the platform command for `data.action`.
pub struct PowerHandler {
    runner: Arc<dyn ProcessRunner>,
}

impl PowerHandler {
    /// Handler running through `runner`.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl CommandHandler for PowerHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let action: PowerAction = require_str(&data, "action")?.parse()?;
        let spec = action.spec();

        info!(action = action.as_str(), program = %spec.program, "power action");
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            warn!(
                action = action.as_str(),
                code = output.exit_code,
                stderr = %output.stderr.trim(),
                "power action failed"
            );
            return Err(CommandError::Failed(format!(
                "{} exited with {}: {}",
                spec.program,
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(json!({ "action": action.as_str() }))
    }
}
