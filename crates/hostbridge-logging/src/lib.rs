//! # hostbridge-logging
//!
//! Structured logging with `tracing`.
//!
//! [`init_subscriber`] installs a global subscriber with an `EnvFilter`
//! (`RUST_LOG` wins over the configured level) and either a human-readable
//! or a JSON fmt layer.

#![deny(unsafe_code)]

pub mod types;

pub use types::LogLevel;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Subscriber configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default level for every target.
    pub level: LogLevel,
    /// Per-target level overrides, e.g. `("tower_http", Warn)`.
    pub target_levels: Vec<(String, LogLevel)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            target_levels: vec![
                ("hyper".into(), LogLevel::Warn),
                ("tungstenite".into(), LogLevel::Warn),
            ],
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Config at `level` with default target overrides.
    pub fn with_level(level: LogLevel, json: bool) -> Self {
        Self {
            level,
            json,
            ..Self::default()
        }
    }

    /// `EnvFilter` directive string for this config.
    pub fn filter_directive(&self) -> String {
        let mut directive = self.level.as_filter().to_owned();
        for (target, level) in &self.target_levels {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(level.as_filter());
        }
        directive
    }
}

/// Failure installing the global subscriber.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingError(String);

/// Install the global tracing subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| LoggingError(e.to_string()))
}
