//! # hostbridge-server
//!
//! Axum HTTP + `WebSocket` front end for the telemetry bridge.
//!
//! - `WebSocket` gateway: token auth, per-session queues, heartbeat
//! - Subscription dispatch: immediate `dataGet` replies and `dataUpdate`
//!   pushes to current subscribers
//! - Command routing to built-in handlers with per-call deadlines
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use commands::{CommandDeps, CommandError, CommandHandler, CommandRouter, register_builtin};
pub use config::ServerConfig;
pub use context::BridgeContext;
pub use dispatch::DispatchEngine;
pub use server::BridgeServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::registry::SessionRegistry;
