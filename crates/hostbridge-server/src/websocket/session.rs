//! One connected client from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{AuthState, ClientSession, CloseReason};
use super::handler::handle_message;
use super::registry::SessionRegistry;
use crate::context::BridgeContext;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// How long the writer gets to flush after the reader stops.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-session transport settings.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Outbound queue bound; overflowing it closes the session.
    pub send_queue_capacity: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Silence after which the client is considered gone.
    pub heartbeat_timeout: Duration,
    /// Time a new connection has to authenticate.
    pub auth_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: 256,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            auth_timeout: Duration::from_secs(30),
        }
    }
}

fn close_frame(reason: Option<CloseReason>) -> CloseFrame {
    let (code, text) = match reason {
        Some(CloseReason::Rejected) => (close_code::POLICY, "auth failed"),
        Some(CloseReason::AuthTimeout) => (close_code::POLICY, "authentication timeout"),
        Some(CloseReason::Overflow) => (close_code::POLICY, "outbound queue full"),
        Some(CloseReason::HeartbeatTimeout) => (close_code::AWAY, "heartbeat timeout"),
        Some(CloseReason::Shutdown) => (close_code::AWAY, "server shutting down"),
        _ => (close_code::NORMAL, ""),
    };
    CloseFrame {
        code,
        reason: text.into(),
    }
}

/// Frame payload as text. Binary frames must hold UTF-8.
fn frame_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(t) => Some(t.as_str().to_owned()),
        Message::Binary(data) => match std::str::from_utf8(data) {
            Ok(s) => Some(s.to_owned()),
            Err(_) => {
                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                None
            }
        },
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// Run a session for an upgraded connection.
///
/// The writer task owns the socket sink: it forwards queued frames, sends
/// Pings, and writes the Close frame once the session closes. The reader
/// handles requests in arrival order until the client leaves, the session
/// is closed, or `shutdown` fires.
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: String,
    ctx: Arc<BridgeContext>,
    sessions: Arc<SessionRegistry>,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity);
    let session = Arc::new(ClientSession::new(client_id.clone(), send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    sessions.add(Arc::clone(&session));

    let writer_session = Arc::clone(&session);
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(config.heartbeat_interval);
        let _ = ping_interval.tick().await;
        let auth_deadline = tokio::time::sleep(config.auth_timeout);
        tokio::pin!(auth_deadline);
        let mut auth_pending = true;

        loop {
            tokio::select! {
                biased;
                () = writer_session.closed() => {
                    let reason = writer_session.close_reason();
                    if reason.is_some_and(CloseReason::flushes_queue) {
                        while let Ok(text) = send_rx.try_recv() {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    let _ = ws_tx.send(Message::Close(Some(close_frame(reason)))).await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        writer_session.close(CloseReason::SendFailed);
                        break;
                    }
                }
                () = &mut auth_deadline, if auth_pending => {
                    auth_pending = false;
                    if writer_session.state() == AuthState::Unauthenticated {
                        warn!("client did not authenticate within {:?}, disconnecting", config.auth_timeout);
                        writer_session.close(CloseReason::AuthTimeout);
                    }
                }
                _ = ping_interval.tick() => {
                    if !writer_session.check_alive()
                        && writer_session.last_pong_elapsed() > config.heartbeat_timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", config.heartbeat_timeout);
                        writer_session.close(CloseReason::HeartbeatTimeout);
                        continue;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        writer_session.close(CloseReason::SendFailed);
                        break;
                    }
                }
            }
        }
    });

    loop {
        let next = tokio::select! {
            biased;
            () = session.closed() => break,
            () = shutdown.cancelled() => {
                session.close(CloseReason::Shutdown);
                break;
            }
            next = ws_rx.next() => next,
        };
        let msg = match next {
            Some(Ok(Message::Close(_))) => {
                debug!("client sent close frame");
                session.close(CloseReason::ClientClosed);
                break;
            }
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                session.close(CloseReason::ClientClosed);
                break;
            }
            None => {
                session.close(CloseReason::ClientClosed);
                break;
            }
        };
        session.mark_alive();

        let Some(text) = frame_text(&msg) else { continue };
        let result = handle_message(&text, &session, &ctx).await;
        for response in &result.responses {
            if !session.send_response(response) {
                break;
            }
        }
        if result.reject {
            session.reject();
        }
    }

    // Pending frames are dropped with the queue unless the close reason
    // flushes them.
    let _ = sessions.remove(&client_id);
    let _ = session.unsubscribe_all();
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut outbound).await.is_err() {
        outbound.abort();
    }

    let reason = session.close_reason().unwrap_or(CloseReason::ClientClosed);
    info!(reason = reason.as_str(), dropped = session.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!("bridge_ws_connection_duration_seconds").record(session.age().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_utf8_is_text() {
        let msg = Message::Binary(b"{\"event\":\"cpu\"}".to_vec().into());
        assert_eq!(frame_text(&msg).as_deref(), Some("{\"event\":\"cpu\"}"));
    }

    #[test]
    fn binary_non_utf8_is_ignored() {
        let msg = Message::Binary(vec![0xff, 0xfe].into());
        assert!(frame_text(&msg).is_none());
    }

    #[test]
    fn control_frames_have_no_text() {
        assert!(frame_text(&Message::Ping(Vec::new().into())).is_none());
        assert!(frame_text(&Message::Pong(Vec::new().into())).is_none());
    }

    #[test]
    fn close_codes() {
        assert_eq!(close_frame(Some(CloseReason::Rejected)).code, close_code::POLICY);
        assert_eq!(close_frame(Some(CloseReason::Overflow)).code, close_code::POLICY);
        assert_eq!(close_frame(Some(CloseReason::AuthTimeout)).code, close_code::POLICY);
        assert_eq!(close_frame(Some(CloseReason::Shutdown)).code, close_code::AWAY);
        assert_eq!(close_frame(None).code, close_code::NORMAL);
    }
}
