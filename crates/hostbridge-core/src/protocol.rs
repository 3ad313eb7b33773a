//! Wire types exchanged over the client connection.
//!
//! Inbound: `{id, token, event, data}`. Outbound:
//! `{id, type, module, subtype, message, data}` with every field present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::module::{ModuleName, ModuleSnapshot};

// ── Protocol events ─────────────────────────────────────────────────

/// Add modules to the session's subscription set.
pub const EVENT_SUBSCRIBE: &str = "subscribe";
/// Remove modules from the session's subscription set.
pub const EVENT_UNSUBSCRIBE: &str = "unsubscribe";
/// Read current cache entries without subscribing.
pub const EVENT_GET: &str = "get";
/// Authenticate without performing any other action.
pub const EVENT_AUTHENTICATE: &str = "authenticate";

/// Legacy spellings accepted for the protocol events above.
pub const EVENT_ALIASES: &[(&str, &str)] = &[
    ("register_data_listener", EVENT_SUBSCRIBE),
    ("unregister_data_listener", EVENT_UNSUBSCRIBE),
    ("get_data", EVENT_GET),
    ("auth", EVENT_AUTHENTICATE),
];

/// Resolve an event name through [`EVENT_ALIASES`].
pub fn canonical_event(event: &str) -> &str {
    EVENT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == event)
        .map_or(event, |(_, canonical)| canonical)
}

/// Whether `event` is reserved by the protocol (including aliases).
pub fn is_reserved_event(event: &str) -> bool {
    matches!(
        canonical_event(event),
        EVENT_SUBSCRIBE | EVENT_UNSUBSCRIBE | EVENT_GET | EVENT_AUTHENTICATE
    )
}

// ── Error subtypes ──────────────────────────────────────────────────

/// Token did not match.
pub const BAD_TOKEN: &str = "BAD_TOKEN";
/// No token on a request from an unauthenticated session.
pub const MISSING_TOKEN: &str = "MISSING_TOKEN";
/// Frame was not valid JSON.
pub const BAD_JSON: &str = "BAD_JSON";
/// Frame was JSON but not a valid request.
pub const BAD_REQUEST: &str = "BAD_REQUEST";
/// A named module is not in the catalog.
pub const UNKNOWN_MODULE: &str = "UNKNOWN_MODULE";
/// No module, protocol event, or command matches.
pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";
/// `subscribe` without a module list.
pub const MISSING_MODULES: &str = "MISSING_MODULES";
/// Command handler returned an error.
pub const COMMAND_FAILED: &str = "COMMAND_FAILED";
/// Command handler exceeded its deadline.
pub const COMMAND_TIMEOUT: &str = "COMMAND_TIMEOUT";
/// Forced resample failed.
pub const SAMPLE_FAILED: &str = "SAMPLE_FAILED";

/// A client request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id echoed in the response.
    #[serde(default)]
    pub id: Option<String>,
    /// Shared-secret token.
    #[serde(default)]
    pub token: Option<String>,
    /// Module name, protocol event, or command name.
    pub event: String,
    /// Event-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl Request {
    /// Token if present and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Module names listed under `data.modules`.
    ///
    /// `None` when the key is absent or null. Non-string entries are
    /// returned as their JSON text so they fail module validation.
    pub fn modules(&self) -> Option<Vec<String>> {
        let list = self.data.get("modules")?;
        match list {
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_owned))
                    .collect(),
            ),
            Value::String(single) => Some(vec![single.clone()]),
            _ => None,
        }
    }

    /// Whether `data.refresh` is `true`.
    pub fn wants_refresh(&self) -> bool {
        self.data
            .get("refresh")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Outbound message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseType {
    /// Current value, answering a request.
    DataGet,
    /// Unsolicited change notification.
    DataUpdate,
    /// Result of a command.
    CommandResult,
    /// Session authenticated.
    Authenticated,
    /// Subscriptions removed.
    Unsubscribed,
    /// Request failed.
    Error,
}

/// A server message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echoed request id; `None` for pushes.
    pub id: Option<String>,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: ResponseType,
    /// Module concerned, when any.
    pub module: Option<ModuleName>,
    /// Machine-readable error subtype.
    pub subtype: Option<String>,
    /// Human-readable message.
    pub message: Option<String>,
    /// Payload.
    pub data: Value,
}

impl Response {
    fn new(id: Option<String>, kind: ResponseType) -> Self {
        Self {
            id,
            kind,
            module: None,
            subtype: None,
            message: None,
            data: Value::Null,
        }
    }

    /// Answer to a `get` or `subscribe` for one module.
    pub fn data_get(id: Option<String>, snapshot: &ModuleSnapshot) -> Self {
        Self {
            module: Some(snapshot.module),
            data: snapshot.to_value(),
            ..Self::new(id, ResponseType::DataGet)
        }
    }

    /// Unsolicited push for a changed module.
    pub fn data_update(snapshot: &ModuleSnapshot) -> Self {
        Self {
            module: Some(snapshot.module),
            data: snapshot.to_value(),
            ..Self::new(None, ResponseType::DataUpdate)
        }
    }

    /// Successful command result.
    pub fn command_result(id: Option<String>, data: Value) -> Self {
        Self {
            data,
            ..Self::new(id, ResponseType::CommandResult)
        }
    }

    /// Session is now authenticated.
    pub fn authenticated(id: Option<String>) -> Self {
        Self {
            message: Some("authenticated".into()),
            ..Self::new(id, ResponseType::Authenticated)
        }
    }

    /// Modules removed from the subscription set.
    pub fn unsubscribed(id: Option<String>, modules: &[ModuleName]) -> Self {
        Self {
            data: serde_json::json!({ "modules": modules }),
            ..Self::new(id, ResponseType::Unsubscribed)
        }
    }

    /// Error response.
    pub fn error(id: Option<String>, subtype: &str, message: impl Into<String>) -> Self {
        Self {
            subtype: Some(subtype.to_owned()),
            message: Some(message.into()),
            ..Self::new(id, ResponseType::Error)
        }
    }

    /// Attach a module to the response.
    #[must_use]
    pub fn with_module(mut self, module: ModuleName) -> Self {
        self.module = Some(module);
        self
    }

    /// Serialize to the wire text.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize response");
            String::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults() {
        let req: Request = serde_json::from_str(r#"{"event":"cpu"}"#).unwrap();
        assert!(req.id.is_none());
        assert!(req.token.is_none());
        assert!(req.data.is_null());
    }

    #[test]
    fn request_requires_event() {
        assert!(serde_json::from_str::<Request>(r#"{"id":"1"}"#).is_err());
    }

    #[test]
    fn empty_token_is_treated_as_absent() {
        let req: Request = serde_json::from_value(json!({"event": "get", "token": ""})).unwrap();
        assert!(req.token().is_none());
    }

    #[test]
    fn modules_list_extraction() {
        let req: Request =
            serde_json::from_value(json!({"event": "subscribe", "data": {"modules": ["cpu", 3]}}))
                .unwrap();
        assert_eq!(req.modules().unwrap(), vec!["cpu".to_owned(), "3".to_owned()]);
    }

    #[test]
    fn modules_absent_is_none() {
        let req: Request =
            serde_json::from_value(json!({"event": "get", "data": {}})).unwrap();
        assert!(req.modules().is_none());
    }

    #[test]
    fn refresh_flag() {
        let req: Request =
            serde_json::from_value(json!({"event": "get", "data": {"refresh": true}})).unwrap();
        assert!(req.wants_refresh());
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(canonical_event("register_data_listener"), EVENT_SUBSCRIBE);
        assert_eq!(canonical_event("get_data"), EVENT_GET);
        assert_eq!(canonical_event("open"), "open");
        assert!(is_reserved_event("unregister_data_listener"));
        assert!(!is_reserved_event("open"));
    }

    #[test]
    fn response_serializes_every_field() {
        let resp = Response::command_result(Some("3".into()), json!({"path": "https://x"}));
        let v: Value = serde_json::from_str(&resp.to_json()).unwrap();
        let obj = v.as_object().unwrap();
        for key in ["id", "type", "module", "subtype", "message", "data"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(v["type"], "commandResult");
        assert_eq!(v["data"]["path"], "https://x");
    }

    #[test]
    fn data_update_has_null_id() {
        let snap = ModuleSnapshot::sampled(ModuleName::Cpu, json!({"usage": 12.5}));
        let v: Value = serde_json::from_str(&Response::data_update(&snap).to_json()).unwrap();
        assert!(v["id"].is_null());
        assert_eq!(v["type"], "dataUpdate");
        assert_eq!(v["module"], "cpu");
        assert_eq!(v["data"]["data"]["usage"], 12.5);
    }

    #[test]
    fn error_response_shape() {
        let v: Value =
            serde_json::from_str(&Response::error(Some("2".into()), BAD_TOKEN, "auth failed").to_json())
                .unwrap();
        assert_eq!(v["id"], "2");
        assert_eq!(v["type"], "error");
        assert_eq!(v["subtype"], "BAD_TOKEN");
        assert_eq!(v["message"], "auth failed");
    }
}
