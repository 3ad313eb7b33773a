//! # hostbridge-settings
//!
//! Configuration for the hostbridge daemon.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **User file**: `~/.config/hostbridge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HOSTBRIDGE_*` overrides (highest priority)
//!
//! The API token is bootstrapped on first start: when no layer provides one,
//! [`ensure_token`] generates a random token and persists it to the user file.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod token;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path, update_settings};
pub use token::{ensure_token, generate_token};
pub use types::*;
