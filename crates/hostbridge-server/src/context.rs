//! Shared state handed to every session.

use std::sync::Arc;
use std::time::Instant;

use crate::commands::CommandRouter;
use crate::dispatch::DispatchEngine;

/// What a session needs to answer requests.
pub struct BridgeContext {
    /// Shared secret every client must present.
    pub token: String,
    /// Subscription and data-request handling.
    pub dispatch: Arc<DispatchEngine>,
    /// Command name to handler table.
    pub commands: Arc<CommandRouter>,
    /// Daemon start time, for `/health`.
    pub started_at: Instant,
}

impl BridgeContext {
    /// Context checking requests against `token`.
    pub fn new(token: String, dispatch: Arc<DispatchEngine>, commands: Arc<CommandRouter>) -> Self {
        Self {
            token,
            dispatch,
            commands,
            started_at: Instant::now(),
        }
    }

    /// Compare a presented token without short-circuiting on the first
    /// differing byte.
    pub fn token_matches(&self, presented: &str) -> bool {
        let expected = self.token.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
