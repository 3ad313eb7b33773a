//! Shared-secret token bootstrap.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::info;

use crate::errors::Result;
use crate::loader::patch_settings_file;
use crate::types::BridgeSettings;

/// Generate a random URL-safe token (32 bytes of entropy).
pub fn generate_token() -> String {
    let random_bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Make sure `settings` carries a token.
///
/// When none is configured, a fresh token is generated and written to the
/// settings file at `path` so that clients can read it and the value is
/// stable across restarts. Returns the token in use.
pub fn ensure_token(settings: &mut BridgeSettings, path: &Path) -> Result<String> {
    if let Some(token) = settings.api.token.as_ref().filter(|t| !t.is_empty()) {
        return Ok(token.clone());
    }
    let token = generate_token();
    patch_settings_file(path, serde_json::json!({ "api": { "token": token } }))?;
    info!(?path, "generated new API token");
    settings.api.token = Some(token.clone());
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_settings_from_path;

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn existing_token_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut s = BridgeSettings::default();
        s.api.token = Some("fixed".into());
        assert_eq!(ensure_token(&mut s, &path).unwrap(), "fixed");
        assert!(!path.exists());
    }

    #[test]
    fn missing_token_generated_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut s = BridgeSettings::default();
        let token = ensure_token(&mut s, &path).unwrap();
        assert_eq!(s.api.token.as_deref(), Some(token.as_str()));

        let reloaded = load_settings_from_path(&path).unwrap();
        // An env override could mask the file value, so only compare when unset.
        if std::env::var("HOSTBRIDGE_TOKEN").is_err() {
            assert_eq!(reloaded.api.token.as_deref(), Some(token.as_str()));
        }
    }
}
