//! Listener and transport configuration.

use hostbridge_settings::BridgeSettings;

use crate::websocket::session::SessionConfig;

/// Configuration for the HTTP/WebSocket listener.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Upgrades beyond this many open sessions get HTTP 503.
    pub max_connections: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Per-session queue and heartbeat settings.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            host: settings.api.host.clone(),
            port: settings.api.port,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            session: SessionConfig {
                send_queue_capacity: settings.server.send_queue_capacity,
                heartbeat_interval: settings.server.heartbeat_interval(),
                heartbeat_timeout: settings.server.heartbeat_timeout(),
                auth_timeout: settings.server.heartbeat_interval(),
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            max_message_size: 1024 * 1024,
            session: SessionConfig::default(),
        }
    }
}
