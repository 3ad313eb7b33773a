//! Index of live sessions.

use std::sync::Arc;

use dashmap::DashMap;
use hostbridge_core::ModuleName;

use super::connection::{ClientSession, CloseReason};

/// Live sessions keyed by connection ID.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<ClientSession>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session.
    pub fn add(&self, session: Arc<ClientSession>) {
        let _ = self.sessions.insert(session.id.clone(), session);
    }

    /// Stop tracking a session.
    pub fn remove(&self, id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    /// Number of tracked sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Open, authenticated sessions subscribed to `module` right now.
    pub fn subscribers_of(&self, module: ModuleName) -> Vec<Arc<ClientSession>> {
        self.sessions
            .iter()
            .filter(|s| !s.is_closed() && s.is_authenticated() && s.is_subscribed(module))
            .map(|s| Arc::clone(s.value()))
            .collect()
    }

    /// Close every session with `reason`.
    pub fn close_all(&self, reason: CloseReason) {
        for session in &self.sessions {
            session.close(reason);
        }
    }
}
