//! `open`: hand a URL or path to the desktop opener.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{CommandError, CommandHandler, ProcessRunner, ProcessSpec};

/// Hands a URL or an existing path to the desktop opener.
pub struct OpenHandler {
    runner: Arc<dyn ProcessRunner>,
}

impl OpenHandler {
    /// Handler spawning through `runner`.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

/// `scheme://rest` with a non-empty alphanumeric scheme.
fn is_url(target: &str) -> bool {
    target.split_once("://").is_some_and(|(scheme, rest)| {
        !scheme.is_empty()
            && !rest.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Platform opener invocation for `target`.
fn opener(target: &str) -> ProcessSpec {
    if cfg!(target_os = "macos") {
        ProcessSpec::new("open", [target])
    } else if cfg!(windows) {
        ProcessSpec::new("cmd", ["/C", "start", "", target])
    } else {
        ProcessSpec::new("xdg-open", [target])
    }
}

#[async_trait]
impl CommandHandler for OpenHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let target = data
            .get("url")
            .or_else(|| data.get("path"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CommandError::InvalidParams("missing 'path' or 'url'".into()))?;

        if !is_url(target) && !Path::new(target).exists() {
            return Err(CommandError::NotFound(format!("path not found: {target}")));
        }

        let pid = self.runner.spawn_detached(&opener(target))?;
        info!(target, ?pid, "opened");
        Ok(data)
    }
}
