//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `HOSTBRIDGE_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::BridgeSettings;

/// Resolve the settings file path.
///
/// `$XDG_CONFIG_HOME/hostbridge/settings.json`, falling back to
/// `~/.config/hostbridge/settings.json`.
pub fn settings_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(
            || {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            },
            PathBuf::from,
        );
    base.join("hostbridge").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or invalid values, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the user file, without env overrides.
fn load_file_layer(path: &Path) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Apply a client-supplied partial settings object.
///
/// The patch is deep-merged over `current` and validated, then merged into
/// the user file at `path` so keys it does not mention stay as written.
/// `api.token` is never taken from a patch.
pub fn update_settings(
    path: &Path,
    current: &BridgeSettings,
    mut patch: Value,
) -> Result<BridgeSettings> {
    let Value::Object(fields) = &mut patch else {
        return Err(SettingsError::InvalidValue(
            "settings update must be a JSON object".into(),
        ));
    };
    if let Some(Value::Object(api)) = fields.get_mut("api") {
        let _ = api.remove("token");
    }

    let merged = deep_merge(serde_json::to_value(current)?, patch.clone());
    let updated: BridgeSettings = serde_json::from_value(merged)?;
    updated.validate()?;
    patch_settings_file(path, patch)?;
    debug!(?path, "settings updated");
    Ok(updated)
}

/// Merge `patch` into the JSON stored at `path` and write it back.
///
/// Keys the patch does not mention are preserved as the user wrote them,
/// so env overrides never leak into the file.
pub(crate) fn patch_settings_file(path: &Path, patch: Value) -> Result<()> {
    let current = if path.exists() {
        serde_json::from_str(&std::fs::read_to_string(path)?)?
    } else {
        Value::Object(serde_json::Map::new())
    };
    let merged = deep_merge(current, patch);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&merged)?)?;
    Ok(())
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    if let Some(v) = read_env_string("HOSTBRIDGE_HOST") {
        settings.api.host = v;
    }
    if let Some(v) = read_env_u16("HOSTBRIDGE_PORT", 0, 65535) {
        settings.api.port = v;
    }
    if let Some(v) = read_env_string("HOSTBRIDGE_TOKEN") {
        settings.api.token = Some(v);
    }
    if let Some(v) = read_env_string("HOSTBRIDGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("HOSTBRIDGE_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = read_env_u64("HOSTBRIDGE_POLL_INTERVAL_MS", 100, 86_400_000) {
        settings.polling.default_interval_ms = v;
    }
    if let Some(v) = read_env_u64("HOSTBRIDGE_SAMPLE_TIMEOUT_MS", 100, 600_000) {
        settings.polling.sample_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("HOSTBRIDGE_MAX_CONNECTIONS", 1, 10_000) {
        settings.server.max_connections = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
