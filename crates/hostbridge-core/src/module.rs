//! Module catalog and per-module snapshots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// A named category of host telemetry.
///
/// The set is closed: anything not listed here is rejected at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleName {
    /// Battery charge and power state.
    Battery,
    /// Processor usage and frequencies.
    Cpu,
    /// Mounted filesystems.
    Disks,
    /// Attached displays.
    Displays,
    /// Graphics adapters.
    Gpus,
    /// Currently playing media.
    Media,
    /// RAM and swap.
    Memory,
    /// Network interfaces.
    Networks,
    /// Running processes.
    Processes,
    /// Temperature and fan sensors.
    Sensors,
    /// Host identity, OS, and uptime.
    System,
}

impl ModuleName {
    /// Every known module, in wire-name order.
    pub const ALL: [Self; 11] = [
        Self::Battery,
        Self::Cpu,
        Self::Disks,
        Self::Displays,
        Self::Gpus,
        Self::Media,
        Self::Memory,
        Self::Networks,
        Self::Processes,
        Self::Sensors,
        Self::System,
    ];

    /// Lowercase wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Battery => "battery",
            Self::Cpu => "cpu",
            Self::Disks => "disks",
            Self::Displays => "displays",
            Self::Gpus => "gpus",
            Self::Media => "media",
            Self::Memory => "memory",
            Self::Networks => "networks",
            Self::Processes => "processes",
            Self::Sensors => "sensors",
            Self::System => "system",
        }
    }

    /// Whether `name` is a known module.
    pub fn is_module(name: &str) -> bool {
        name.parse::<Self>().is_ok()
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known module.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModuleError(pub String);

impl FromStr for ModuleName {
    type Err = UnknownModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownModuleError(s.to_owned()))
    }
}

/// Parse a list of module names, failing on the first unknown entry.
///
/// Duplicates are collapsed while preserving first-seen order.
pub fn parse_modules<I, S>(names: I) -> Result<Vec<ModuleName>, UnknownModuleError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for name in names {
        let module: ModuleName = name.as_ref().parse()?;
        if !out.contains(&module) {
            out.push(module);
        }
    }
    Ok(out)
}

/// The latest known value for one module.
///
/// Failed samples keep the previous `data` but flip `ok` to `false` and
/// carry the failure in `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSnapshot {
    /// Module this snapshot belongs to.
    pub module: ModuleName,
    /// Sampled payload. Opaque at the protocol layer.
    pub data: Value,
    /// When the payload was produced. `None` until the first sample.
    #[serde(serialize_with = "serialize_millis")]
    pub sampled_at: Option<DateTime<Utc>>,
    /// Whether the most recent sample succeeded.
    pub ok: bool,
    /// Failure description for the most recent sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleSnapshot {
    /// Default entry for a module that has never been sampled.
    pub fn empty(module: ModuleName) -> Self {
        Self {
            module,
            data: Value::Object(serde_json::Map::new()),
            sampled_at: None,
            ok: false,
            error: None,
        }
    }

    /// A successful sample taken now.
    pub fn sampled(module: ModuleName, data: Value) -> Self {
        Self {
            module,
            data,
            sampled_at: Some(Utc::now()),
            ok: true,
            error: None,
        }
    }

    /// Derive a failed entry from `self`, keeping the last good data.
    #[must_use]
    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            module: self.module,
            data: self.data.clone(),
            sampled_at: Some(Utc::now()),
            ok: false,
            error: Some(error.into()),
        }
    }

    /// Serialize to a JSON value for embedding in a response.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn serialize_millis<S: Serializer>(
    at: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => serializer.serialize_none(),
    }
}
