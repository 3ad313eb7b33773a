//! `set-brightness` through the Linux backlight class.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{CommandError, CommandHandler};

/// Default Linux backlight class directory.
pub const BACKLIGHT_DIR: &str = "/sys/class/backlight";

/// Sets display brightness through the backlight sysfs interface.
pub struct SetBrightnessHandler {
    root: PathBuf,
}

impl SetBrightnessHandler {
    /// Handler writing under `root` (normally [`BACKLIGHT_DIR`]).
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// First device directory under the root, by name.
    fn device(&self) -> Result<PathBuf, CommandError> {
        let entries = std::fs::read_dir(&self.root).map_err(|_| {
            CommandError::Unsupported(format!("no backlight at {}", self.root.display()))
        })?;
        let mut devices: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.join("max_brightness").exists())
            .collect();
        devices.sort();
        devices
            .into_iter()
            .next()
            .ok_or_else(|| CommandError::NotFound("no backlight device".into()))
    }
}

fn read_u64(path: &Path) -> Result<u64, CommandError> {
    let raw = std::fs::read_to_string(path)?;
    raw.trim()
        .parse()
        .map_err(|_| CommandError::Failed(format!("unreadable {}", path.display())))
}

/// Percentage to raw device units, rounded.
fn to_raw(percent: f64, max: u64) -> u64 {
    (percent / 100.0 * max as f64).round() as u64
}

#[async_trait]
impl CommandHandler for SetBrightnessHandler {
    async fn execute(&self, data: Value) -> Result<Value, CommandError> {
        let value = data
            .get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| CommandError::InvalidParams("missing 'value'".into()))?;
        if !(0.0..=100.0).contains(&value) {
            return Err(CommandError::InvalidParams(format!(
                "value {value} outside 0-100"
            )));
        }

        let device = self.device()?;
        let max = read_u64(&device.join("max_brightness"))?;
        let raw = to_raw(value, max);
        std::fs::write(device.join("brightness"), raw.to_string())?;
        info!(device = %device.display(), value, raw, "brightness set");
        Ok(json!({ "value": value, "raw": raw }))
    }
}
