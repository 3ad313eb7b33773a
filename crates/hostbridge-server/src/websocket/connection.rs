//! Per-client session state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use hostbridge_core::{ModuleName, Response};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Authentication state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    /// No valid token seen yet.
    Unauthenticated,
    /// Presented the configured token.
    Authenticated,
    /// Presented a wrong token before authenticating; closing.
    Rejected,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent Close or the stream ended.
    ClientClosed,
    /// Bad token on an unauthenticated session.
    Rejected,
    /// No successful authentication within the allowed window.
    AuthTimeout,
    /// Outbound queue was full.
    Overflow,
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
    /// Writing to the socket failed.
    SendFailed,
    /// Daemon shutting down.
    Shutdown,
}

impl CloseReason {
    /// Metric label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::Rejected => "rejected",
            Self::AuthTimeout => "auth_timeout",
            Self::Overflow => "overflow",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::SendFailed => "send_failed",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether frames queued before the close should still be written.
    pub const fn flushes_queue(self) -> bool {
        matches!(self, Self::Rejected | Self::Shutdown | Self::ClientClosed)
    }
}

/// A connected client.
pub struct ClientSession {
    /// Unique connection ID.
    pub id: String,
    state: Mutex<AuthState>,
    subscriptions: Mutex<HashSet<ModuleName>>,
    /// Serialized frames for the socket writer task.
    tx: mpsc::Sender<Arc<String>>,
    /// When the connection was accepted.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
    closed: CancellationToken,
    close_reason: Mutex<Option<CloseReason>>,
}

impl ClientSession {
    /// Create an unauthenticated session writing into `tx`.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: Mutex::new(AuthState::Unauthenticated),
            subscriptions: Mutex::new(HashSet::new()),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed: CancellationToken::new(),
            close_reason: Mutex::new(None),
        }
    }

    // ── Auth ────────────────────────────────────────────────────────

    /// Current auth state.
    pub fn state(&self) -> AuthState {
        *self.state.lock()
    }

    /// Whether requests from this session may be processed.
    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::Authenticated
    }

    /// Mark authenticated. No effect once rejected.
    pub fn authenticate(&self) {
        let mut state = self.state.lock();
        if *state == AuthState::Unauthenticated {
            *state = AuthState::Authenticated;
            debug!(session_id = %self.id, "session authenticated");
        }
    }

    /// Mark rejected and close. Frames already queued are still flushed.
    pub fn reject(&self) {
        *self.state.lock() = AuthState::Rejected;
        self.close(CloseReason::Rejected);
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Add modules; returns those not already present.
    pub fn subscribe(&self, modules: &[ModuleName]) -> Vec<ModuleName> {
        let mut subs = self.subscriptions.lock();
        modules.iter().copied().filter(|m| subs.insert(*m)).collect()
    }

    /// Remove modules; returns those that were present.
    pub fn unsubscribe(&self, modules: &[ModuleName]) -> Vec<ModuleName> {
        let mut subs = self.subscriptions.lock();
        modules.iter().copied().filter(|m| subs.remove(m)).collect()
    }

    /// Remove everything; returns what was present, in catalog order.
    pub fn unsubscribe_all(&self) -> Vec<ModuleName> {
        let mut subs = self.subscriptions.lock();
        let mut removed: Vec<ModuleName> = subs.drain().collect();
        removed.sort();
        removed
    }

    /// Whether `module` is currently subscribed.
    pub fn is_subscribed(&self, module: ModuleName) -> bool {
        self.subscriptions.lock().contains(&module)
    }

    /// Current subscriptions in catalog order.
    pub fn subscriptions(&self) -> Vec<ModuleName> {
        let mut subs: Vec<ModuleName> = self.subscriptions.lock().iter().copied().collect();
        subs.sort();
        subs
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Enqueue a serialized frame without waiting.
    ///
    /// A full queue closes the session with [`CloseReason::Overflow`];
    /// a slow reader never blocks the caller. Returns whether the frame
    /// was queued.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                warn!(session_id = %self.id, "outbound queue full, closing session");
                self.close(CloseReason::Overflow);
                false
            }
            Err(TrySendError::Closed(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Serialize and enqueue a response.
    pub fn send_response(&self, response: &Response) -> bool {
        let json = response.to_json();
        if json.is_empty() {
            return false;
        }
        self.send(Arc::new(json))
    }

    /// Frames that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    // ── Heartbeat ───────────────────────────────────────────────────

    /// Record client activity (pong, ping, or any frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last activity.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Read and reset the alive flag; `true` if activity since last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Close the session. The first reason recorded wins.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.closed.cancel();
    }

    /// Whether the session is closing or closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Why the session closed, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
