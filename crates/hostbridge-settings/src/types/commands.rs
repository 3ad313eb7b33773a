//! Allow-listed commands for `command-execute`.

use serde::{Deserialize, Serialize};

/// Command allowlist.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandSettings {
    /// Commands clients may run by id.
    pub allowlist: Vec<AllowedCommand>,
}

impl CommandSettings {
    /// Look up a command by id.
    pub fn find(&self, id: &str) -> Option<&AllowedCommand> {
        self.allowlist.iter().find(|c| c.id == id)
    }
}

/// One runnable command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedCommand {
    /// Identifier clients send as `commandID`.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Program to run.
    pub command: String,
    /// Working directory, if not the daemon's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Program arguments.
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_id() {
        let settings: CommandSettings = serde_json::from_str(
            r#"{"allowlist": [{"id": "lock", "command": "loginctl", "arguments": ["lock-session"]}]}"#,
        )
        .unwrap();
        let cmd = settings.find("lock").unwrap();
        assert_eq!(cmd.command, "loginctl");
        assert_eq!(cmd.arguments, vec!["lock-session"]);
        assert!(settings.find("missing").is_none());
    }

    #[test]
    fn working_dir_uses_camel_case() {
        let cmd: AllowedCommand = serde_json::from_str(
            r#"{"id": "a", "command": "ls", "workingDir": "/tmp"}"#,
        )
        .unwrap();
        assert_eq!(cmd.working_dir.as_deref(), Some("/tmp"));
    }
}
