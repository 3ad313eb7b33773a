//! Request handling: parse, authenticate, route.

use hostbridge_core::protocol::{
    BAD_JSON, EVENT_AUTHENTICATE, EVENT_GET, EVENT_SUBSCRIBE, EVENT_UNSUBSCRIBE, canonical_event,
};
use hostbridge_core::{BridgeError, ModuleName, Request, Response};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::connection::{AuthState, ClientSession};
use crate::context::BridgeContext;
use crate::metrics::{REQUEST_ERRORS_TOTAL, REQUESTS_TOTAL};

/// Outcome of one inbound frame.
#[derive(Debug, Default)]
pub struct HandleResult {
    /// Responses to enqueue, in order.
    pub responses: Vec<Response>,
    /// Canonical event name (empty if the frame did not parse).
    pub event: String,
    /// Close the session once the responses are flushed.
    pub reject: bool,
}

impl HandleResult {
    fn single(event: String, response: Response) -> Self {
        Self {
            responses: vec![response],
            event,
            reject: false,
        }
    }
}

/// Best-effort correlation id from a frame that failed to deserialize.
fn salvage_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse one frame into a [`Request`] or the error response for it.
fn parse_request(text: &str) -> Result<Request, Response> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        warn!("invalid JSON received");
        Response::error(None, BAD_JSON, format!("invalid JSON: {e}"))
    })?;
    let id = salvage_id(&value);
    let request: Request = serde_json::from_value(value)
        .map_err(|e| BridgeError::bad_request(format!("invalid request: {e}")).to_response(id.clone()))?;
    if request.event.is_empty() {
        return Err(BridgeError::bad_request("missing event").to_response(id));
    }
    Ok(request)
}

/// Apply the token rules. `Err` carries the result to return unprocessed.
fn authorize(
    request: &Request,
    session: &ClientSession,
    ctx: &BridgeContext,
) -> Result<(), HandleResult> {
    let id = request.id.clone();
    match (request.token(), session.state()) {
        (Some(token), _) if ctx.token_matches(token) => {
            session.authenticate();
            Ok(())
        }
        (Some(_), AuthState::Unauthenticated | AuthState::Rejected) => {
            warn!(session_id = %session.id, "bad token, rejecting session");
            Err(HandleResult {
                responses: vec![BridgeError::bad_token().to_response(id)],
                event: request.event.clone(),
                reject: true,
            })
        }
        (Some(_), AuthState::Authenticated) => {
            warn!(session_id = %session.id, "mismatched token on authenticated session");
            Err(HandleResult::single(
                request.event.clone(),
                BridgeError::bad_token().to_response(id),
            ))
        }
        (None, AuthState::Authenticated) => Ok(()),
        (None, _) => Err(HandleResult::single(
            request.event.clone(),
            BridgeError::missing_token().to_response(id),
        )),
    }
}

/// Handle one inbound text frame for `session`.
#[instrument(skip_all, fields(session_id = %session.id, event))]
pub async fn handle_message(text: &str, session: &ClientSession, ctx: &BridgeContext) -> HandleResult {
    let request = match parse_request(text) {
        Ok(r) => r,
        Err(resp) => {
            record_errors(std::slice::from_ref(&resp));
            return HandleResult::single(String::new(), resp);
        }
    };
    let _ = tracing::Span::current().record("event", request.event.as_str());

    if let Err(result) = authorize(&request, session, ctx) {
        record_errors(&result.responses);
        return result;
    }

    let event = canonical_event(&request.event).to_owned();
    counter!(REQUESTS_TOTAL, "event" => label_for(&event, ctx)).increment(1);
    debug!(event, id = ?request.id, "routing request");

    let responses = route(&event, request, session, ctx).await;
    record_errors(&responses);
    HandleResult {
        responses,
        event,
        reject: false,
    }
}

async fn route(
    event: &str,
    request: Request,
    session: &ClientSession,
    ctx: &BridgeContext,
) -> Vec<Response> {
    let id = request.id.as_deref();
    match event {
        EVENT_AUTHENTICATE => vec![Response::authenticated(request.id.clone())],
        EVENT_SUBSCRIBE => ctx.dispatch.subscribe(session, id, request.modules()),
        EVENT_UNSUBSCRIBE => vec![ctx.dispatch.unsubscribe(session, id, request.modules())],
        EVENT_GET => {
            ctx.dispatch
                .get(id, request.modules(), request.wants_refresh())
                .await
        }
        _ => {
            if let Ok(module) = event.parse::<ModuleName>() {
                vec![ctx.dispatch.module_event(id, module, request.wants_refresh()).await]
            } else if ctx.commands.has_command(event) {
                vec![ctx.commands.dispatch(request.id, event, request.data).await]
            } else {
                warn!(event, "unknown event");
                vec![BridgeError::UnknownEvent(event.to_owned()).to_response(request.id)]
            }
        }
    }
}

/// Bounded label set: unknown events collapse to one value.
fn label_for(event: &str, ctx: &BridgeContext) -> String {
    if hostbridge_core::protocol::is_reserved_event(event)
        || ModuleName::is_module(event)
        || ctx.commands.has_command(event)
    {
        event.to_owned()
    } else {
        "unknown".to_owned()
    }
}

fn record_errors(responses: &[Response]) {
    for resp in responses {
        if let Some(subtype) = &resp.subtype {
            counter!(REQUEST_ERRORS_TOTAL, "subtype" => subtype.clone()).increment(1);
        }
    }
}
