//! `command-execute`: run a command from the settings allowlist.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{CommandError, CommandHandler, ProcessRunner, ProcessSpec, SharedSettings, require_str};

/// Runs an allow-listed command in the background.
///
/// Replies as soon as the command is started; its output is only logged.
pub struct CommandExecuteHandler {
    runner: Arc<dyn ProcessRunner>,
    settings: SharedSettings,
}

impl CommandExecuteHandler {
    /// Handler resolving ids against `settings.commands.allowlist`.
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: SharedSettings) -> Self {
        Self { runner, settings }
    }
}

#[async_trait]
impl CommandHandler for CommandExecuteHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let id = require_str(&data, "commandID")?;
        let allowed = self
            .settings
            .read()
            .commands
            .find(id)
            .cloned()
            .ok_or_else(|| CommandError::NotFound(format!("command not allowed: {id}")))?;

        let mut spec = ProcessSpec::new(&allowed.command, allowed.arguments.iter().cloned());
        spec.working_dir.clone_from(&allowed.working_dir);

        let runner = Arc::clone(&self.runner);
        let command_id = allowed.id.clone();
        info!(command_id = %command_id, program = %spec.program, "executing allow-listed command");
        drop(tokio::spawn(async move {
            match runner.run(&spec).await {
                Ok(output) if output.success() => {
                    info!(command_id = %command_id, duration_ms = output.duration_ms, "command finished");
                }
                Ok(output) => {
                    warn!(
                        command_id = %command_id,
                        code = output.exit_code,
                        stderr = %output.stderr.trim(),
                        "command exited with failure"
                    );
                }
                Err(err) => warn!(command_id = %command_id, error = %err, "command could not start"),
            }
        }));

        Ok(json!({ "commandID": allowed.id, "status": "executing" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ProcessOutput;
    use crate::commands::process::MockProcessRunner;
    use assert_matches::assert_matches;
    use hostbridge_settings::{AllowedCommand, BridgeSettings};
    use parking_lot::RwLock;
    use tokio::sync::mpsc;

    fn settings_with(cmd: AllowedCommand) -> SharedSettings {
        let mut settings = BridgeSettings::default();
        settings.commands.allowlist.push(cmd);
        Arc::new(RwLock::new(settings))
    }

    fn backup() -> AllowedCommand {
        AllowedCommand {
            id: "backup".into(),
            name: "Backup".into(),
            command: "rsync".into(),
            working_dir: Some("/tmp".into()),
            arguments: vec!["-a".into(), "src".into(), "dst".into()],
        }
    }

    #[tokio::test]
    async fn allowed_command_runs_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = MockProcessRunner::new();
        let _ = runner.expect_run().times(1).returning(move |spec| {
            let _ = tx.send(spec.clone());
            Ok(ProcessOutput::default())
        });
        let handler = CommandExecuteHandler::new(Arc::new(runner), settings_with(backup()));

        let result = handler.execute(json!({"commandID": "backup"})).await.unwrap();
        assert_eq!(result, json!({"commandID": "backup", "status": "executing"}));

        let spec = rx.recv().await.unwrap();
        assert_eq!(spec.program, "rsync");
        assert_eq!(spec.args, vec!["-a", "src", "dst"]);
        assert_eq!(spec.working_dir.as_deref(), Some("/tmp"));
    }

    #[tokio::test]
    async fn unknown_id_not_found() {
        let mut runner = MockProcessRunner::new();
        let _ = runner.expect_run().times(0);
        let handler = CommandExecuteHandler::new(Arc::new(runner), settings_with(backup()));
        let err = handler
            .execute(json!({"commandID": "rm-rf"}))
            .await
            .unwrap_err();
        assert_matches!(err, CommandError::NotFound(_));
    }

    #[tokio::test]
    async fn missing_id_invalid() {
        let handler = CommandExecuteHandler::new(
            Arc::new(MockProcessRunner::new()),
            Arc::new(RwLock::new(BridgeSettings::default())),
        );
        let err = handler.execute(json!({})).await.unwrap_err();
        assert_matches!(err, CommandError::InvalidParams(_));
    }
}
