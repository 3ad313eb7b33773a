//! # hostbridge
//!
//! Daemon binary: loads settings, starts per-module sampling, and serves
//! the WebSocket bridge until ctrl-c or `exit-application`.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hostbridge_core::ModuleName;
use hostbridge_logging::{LogLevel, LoggingConfig};
use hostbridge_modules::host::default_samplers;
use hostbridge_modules::{ModuleCache, PollScheduler, SamplerSet, SchedulerConfig};
use hostbridge_server::commands::{BACKLIGHT_DIR, BaseDirectories, TokioProcessRunner};
use hostbridge_server::{
    BridgeContext, BridgeServer, CommandDeps, CommandRouter, DispatchEngine, ServerConfig,
    SessionRegistry, ShutdownCoordinator, register_builtin,
};
use hostbridge_settings::{BridgeSettings, PollingSettings};
use parking_lot::RwLock;
use tracing::info;

/// Host telemetry bridge.
#[derive(Parser, Debug)]
#[command(name = "hostbridge", about = "Host telemetry bridge", version)]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.config/hostbridge/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(hostbridge_settings::settings_path)
    }

    /// CLI flags win over file and env.
    fn apply(&self, settings: &mut BridgeSettings) {
        if let Some(host) = &self.host {
            settings.api.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.api.port = port;
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn scheduler_config(polling: &PollingSettings) -> SchedulerConfig {
    SchedulerConfig {
        default_interval: std::time::Duration::from_millis(polling.default_interval_ms),
        intervals: ModuleName::ALL
            .iter()
            .map(|m| (*m, polling.interval_for(*m)))
            .collect(),
        sample_timeout: polling.sample_timeout(),
    }
}

fn enabled_samplers(polling: &PollingSettings) -> SamplerSet {
    let mut samplers = default_samplers();
    for module in &polling.disabled {
        samplers.remove(*module);
    }
    samplers
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.settings_path();
    let mut settings = hostbridge_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    hostbridge_logging::init_subscriber(&LoggingConfig::with_level(
        LogLevel::from_str_lossy(&settings.logging.level),
        settings.logging.json,
    ))
    .context("failed to initialize logging")?;

    let token = hostbridge_settings::ensure_token(&mut settings, &path)
        .context("failed to persist generated token")?;
    let metrics = hostbridge_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;
    info!(path = %path.display(), "settings loaded");

    let shutdown = Arc::new(ShutdownCoordinator::new());

    // Subscribe before the first sample can land.
    let cache = Arc::new(ModuleCache::new());
    let changes = cache.subscribe();
    let samplers = enabled_samplers(&settings.polling);
    let mut scheduler = PollScheduler::start(
        &samplers,
        cache,
        &scheduler_config(&settings.polling),
        &shutdown.token(),
    );
    let mut handles = scheduler.take_handles();

    let sessions = Arc::new(SessionRegistry::new());
    let dispatch = Arc::new(DispatchEngine::new(Arc::new(scheduler), Arc::clone(&sessions)));
    handles.push(tokio::spawn(Arc::clone(&dispatch).run(changes, shutdown.token())));

    let server_config = ServerConfig::from_settings(&settings);
    let mut router = CommandRouter::new(settings.server.command_timeout());
    register_builtin(
        &mut router,
        &CommandDeps {
            runner: Arc::new(TokioProcessRunner),
            settings: Arc::new(RwLock::new(settings)),
            settings_path: path,
            directories: Arc::new(BaseDirectories::from_env()),
            shutdown: Arc::clone(&shutdown),
            backlight_dir: PathBuf::from(BACKLIGHT_DIR),
        },
    )
    .context("failed to register built-in commands")?;
    let commands = router.commands();

    let ctx = Arc::new(BridgeContext::new(token, dispatch, Arc::new(router)));
    let server = BridgeServer::new(
        server_config,
        ctx,
        sessions,
        Arc::clone(&shutdown),
    )
    .with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    handles.push(handle);
    info!(
        modules = samplers.len(),
        commands = commands.len(),
        "hostbridge listening on ws://{addr}/ws"
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("ctrl-c received");
        }
        () = shutdown.wait() => {}
    }

    info!("shutting down...");
    shutdown.graceful_shutdown(handles, None).await;
    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["hostbridge"]);
        let mut settings = BridgeSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.api.host, "127.0.0.1");
        assert_eq!(settings.api.port, 9170);
        assert!(!settings.logging.json);
    }

    #[test]
    fn cli_flags_override() {
        let cli = Cli::parse_from([
            "hostbridge",
            "--host",
            "0.0.0.0",
            "--port",
            "9999",
            "--log-json",
        ]);
        let mut settings = BridgeSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.api.host, "0.0.0.0");
        assert_eq!(settings.api.port, 9999);
        assert!(settings.logging.json);
    }

    #[test]
    fn explicit_settings_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        let cli = Cli::parse_from(["hostbridge", "--settings", path.to_str().unwrap()]);
        assert_eq!(cli.settings_path(), path);
    }

    #[test]
    fn scheduler_config_uses_per_module_cadence() {
        let polling = PollingSettings::default();
        let config = scheduler_config(&polling);
        assert_eq!(config.interval_for(ModuleName::Cpu), Duration::from_secs(5));
        assert_eq!(config.interval_for(ModuleName::System), Duration::from_secs(30));
        assert_eq!(config.sample_timeout, Duration::from_secs(10));
    }

    #[test]
    fn disabled_modules_are_not_sampled() {
        let polling = PollingSettings {
            disabled: vec![ModuleName::Processes, ModuleName::Media],
            ..PollingSettings::default()
        };
        let samplers = enabled_samplers(&polling);
        assert!(samplers.get(ModuleName::Processes).is_none());
        assert!(samplers.get(ModuleName::Media).is_none());
        assert_eq!(samplers.len(), ModuleName::ALL.len() - 2);
    }
}
