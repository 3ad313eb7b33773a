//! Subscription handling and change fan-out.
//!
//! Subscribe, unsubscribe, and get requests are answered from the shared
//! [`ModuleCache`]. A single task listens for change signals and pushes
//! the fresh entry to every session subscribed at that moment.

use std::sync::Arc;

use futures::future::join_all;
use hostbridge_core::module::parse_modules;
use hostbridge_core::protocol::MISSING_MODULES;
use hostbridge_core::{BridgeError, ModuleName, ModuleSnapshot, Response};
use hostbridge_modules::{ModuleCache, PollScheduler};
use metrics::counter;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{DISPATCH_LAGGED_TOTAL, PUSH_OVERFLOWS_TOTAL, PUSHES_TOTAL};
use crate::websocket::connection::ClientSession;
use crate::websocket::registry::SessionRegistry;

/// Answers data requests and pushes cache changes to subscribers.
pub struct DispatchEngine {
    cache: Arc<ModuleCache>,
    scheduler: Arc<PollScheduler>,
    sessions: Arc<SessionRegistry>,
}

impl DispatchEngine {
    /// Engine reading the scheduler's cache and pushing to `sessions`.
    pub fn new(scheduler: Arc<PollScheduler>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            cache: Arc::clone(scheduler.cache()),
            scheduler,
            sessions,
        }
    }

    /// The cache being served.
    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Add `names` to the session's set and reply with each current entry.
    ///
    /// All names are validated before anything changes.
    pub fn subscribe(
        &self,
        session: &ClientSession,
        id: Option<&str>,
        names: Option<Vec<String>>,
    ) -> Vec<Response> {
        let names = match names {
            Some(names) if !names.is_empty() => names,
            _ => {
                return vec![Response::error(
                    id.map(str::to_owned),
                    MISSING_MODULES,
                    "subscribe requires data.modules",
                )];
            }
        };
        let modules = match parse_modules(&names) {
            Ok(modules) => modules,
            Err(err) => return vec![BridgeError::from(err).to_response(id.map(str::to_owned))],
        };

        let added = session.subscribe(&modules);
        debug!(session_id = %session.id, ?modules, added = added.len(), "subscribed");
        modules
            .iter()
            .map(|m| Response::data_get(id.map(str::to_owned), &self.cache.get(*m)))
            .collect()
    }

    /// Remove `names` (everything when absent) from the session's set.
    pub fn unsubscribe(
        &self,
        session: &ClientSession,
        id: Option<&str>,
        names: Option<Vec<String>>,
    ) -> Response {
        let removed = match names {
            None => session.unsubscribe_all(),
            Some(names) => match parse_modules(&names) {
                Ok(modules) => session.unsubscribe(&modules),
                Err(err) => return BridgeError::from(err).to_response(id.map(str::to_owned)),
            },
        };
        debug!(session_id = %session.id, ?removed, "unsubscribed");
        Response::unsubscribed(id.map(str::to_owned), &removed)
    }

    /// Current entries for `names` (every module when absent).
    ///
    /// With `refresh`, each module is resampled first; the resample
    /// coalesces with one already in flight.
    pub async fn get(
        &self,
        id: Option<&str>,
        names: Option<Vec<String>>,
        refresh: bool,
    ) -> Vec<Response> {
        let modules = match names {
            None => ModuleName::ALL.to_vec(),
            Some(names) => match parse_modules(&names) {
                Ok(modules) => modules,
                Err(err) => {
                    return vec![BridgeError::from(err).to_response(id.map(str::to_owned))];
                }
            },
        };
        let snapshots = self.snapshots(&modules, refresh).await;
        snapshots
            .iter()
            .map(|snap| Response::data_get(id.map(str::to_owned), snap))
            .collect()
    }

    /// Single-module read for `event = <module name>`.
    pub async fn module_event(
        &self,
        id: Option<&str>,
        module: ModuleName,
        refresh: bool,
    ) -> Response {
        let snapshot = if refresh {
            self.scheduler.force(module).await
        } else {
            self.cache.get(module)
        };
        Response::data_get(id.map(str::to_owned), &snapshot)
    }

    async fn snapshots(&self, modules: &[ModuleName], refresh: bool) -> Vec<Arc<ModuleSnapshot>> {
        if refresh {
            join_all(modules.iter().map(|m| self.scheduler.force(*m))).await
        } else {
            modules.iter().map(|m| self.cache.get(*m)).collect()
        }
    }

    /// Push the current entry for `module` to its subscribers.
    ///
    /// Returns how many sessions the update was queued for.
    pub fn push(&self, module: ModuleName) -> usize {
        let recipients = self.sessions.subscribers_of(module);
        if recipients.is_empty() {
            return 0;
        }
        let json = Response::data_update(&self.cache.get(module)).to_json();
        if json.is_empty() {
            return 0;
        }
        let json = Arc::new(json);

        let mut delivered = 0;
        for session in &recipients {
            // Membership may have changed since the recipient list was taken.
            if !session.is_subscribed(module) {
                continue;
            }
            if session.send(Arc::clone(&json)) {
                delivered += 1;
            } else if session.close_reason().is_some() {
                counter!(PUSH_OVERFLOWS_TOTAL).increment(1);
            }
        }
        counter!(PUSHES_TOTAL, "module" => module.as_str()).increment(delivered as u64);
        debug!(%module, recipients = recipients.len(), delivered, "pushed update");
        delivered
    }

    /// Fan out change signals until `cancel` fires.
    #[instrument(skip_all)]
    pub async fn run(
        self: Arc<Self>,
        mut changes: broadcast::Receiver<ModuleName>,
        cancel: CancellationToken,
    ) {
        info!("dispatch loop started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                change = changes.recv() => match change {
                    Ok(module) => {
                        let _ = self.push(module);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        counter!(DISPATCH_LAGGED_TOTAL).increment(skipped);
                        warn!(skipped, "dispatch lagged, re-sending every module");
                        for module in ModuleName::ALL {
                            let _ = self.push(module);
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        info!("dispatch loop stopped");
    }
}
