//! Error taxonomy shared by the scheduler, sessions, and command router.

use std::time::Duration;

use crate::module::{ModuleName, UnknownModuleError};
use crate::protocol::{self, Response};

/// Failures surfaced to clients or logged by the daemon.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Token missing or mismatched.
    #[error("{message}")]
    Auth {
        /// `BAD_TOKEN` or `MISSING_TOKEN`.
        subtype: &'static str,
        /// Human-readable message.
        message: String,
    },

    /// A module name outside the catalog.
    #[error(transparent)]
    UnknownModule(#[from] UnknownModuleError),

    /// No module, protocol event, or command by that name.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Malformed frame or request payload.
    #[error("{message}")]
    InvalidRequest {
        /// `BAD_JSON`, `BAD_REQUEST`, or `MISSING_MODULES`.
        subtype: &'static str,
        /// Human-readable message.
        message: String,
    },

    /// A sampler exceeded its deadline.
    #[error("sampling {module} timed out after {timeout:?}")]
    SampleTimeout {
        /// Module being sampled.
        module: ModuleName,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// A sampler returned an error.
    #[error("sampling {module} failed: {message}")]
    SampleFailure {
        /// Module being sampled.
        module: ModuleName,
        /// Failure description.
        message: String,
    },

    /// A command handler returned an error.
    #[error("{message}")]
    CommandHandler {
        /// Command name.
        command: String,
        /// Failure description.
        message: String,
    },

    /// A command handler exceeded its deadline.
    #[error("command '{command}' timed out after {timeout:?}")]
    CommandTimeout {
        /// Command name.
        command: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// The session's outbound queue is full.
    #[error("outbound queue full")]
    BackpressureOverflow,
}

impl BridgeError {
    /// Invalid token.
    pub fn bad_token() -> Self {
        Self::Auth {
            subtype: protocol::BAD_TOKEN,
            message: "auth failed".into(),
        }
    }

    /// No token on an unauthenticated session.
    pub fn missing_token() -> Self {
        Self::Auth {
            subtype: protocol::MISSING_TOKEN,
            message: "authentication required".into(),
        }
    }

    /// Malformed request payload.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            subtype: protocol::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Wire subtype for this error.
    pub fn subtype(&self) -> &'static str {
        match self {
            Self::Auth { subtype, .. } | Self::InvalidRequest { subtype, .. } => subtype,
            Self::UnknownModule(_) => protocol::UNKNOWN_MODULE,
            Self::UnknownEvent(_) => protocol::UNKNOWN_EVENT,
            Self::SampleTimeout { .. } | Self::SampleFailure { .. } => protocol::SAMPLE_FAILED,
            Self::CommandHandler { .. } => protocol::COMMAND_FAILED,
            Self::CommandTimeout { .. } => protocol::COMMAND_TIMEOUT,
            Self::BackpressureOverflow => "BACKPRESSURE_OVERFLOW",
        }
    }

    /// Module concerned, if any.
    pub fn module(&self) -> Option<ModuleName> {
        match self {
            Self::SampleTimeout { module, .. } | Self::SampleFailure { module, .. } => {
                Some(*module)
            }
            _ => None,
        }
    }

    /// Build the error response echoing `id`.
    pub fn to_response(&self, id: Option<String>) -> Response {
        let resp = Response::error(id, self.subtype(), self.to_string());
        match self.module() {
            Some(module) => resp.with_module(module),
            None => resp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn bad_token_message() {
        let err = BridgeError::bad_token();
        assert_eq!(err.to_string(), "auth failed");
        assert_eq!(err.subtype(), "BAD_TOKEN");
    }

    #[test]
    fn missing_token_subtype() {
        assert_eq!(BridgeError::missing_token().subtype(), "MISSING_TOKEN");
    }

    #[test]
    fn unknown_module_from_parse() {
        let err: BridgeError = "nope".parse::<ModuleName>().unwrap_err().into();
        assert_matches!(err, BridgeError::UnknownModule(_));
        assert_eq!(err.subtype(), "UNKNOWN_MODULE");
        assert_eq!(err.to_string(), "unknown module: nope");
    }

    #[test]
    fn sample_errors_carry_module() {
        let err = BridgeError::SampleTimeout {
            module: ModuleName::Disks,
            timeout: Duration::from_secs(10),
        };
        let resp = err.to_response(Some("7".into()));
        assert_eq!(resp.module, Some(ModuleName::Disks));
        assert_eq!(resp.subtype.as_deref(), Some("SAMPLE_FAILED"));
        assert_eq!(resp.id.as_deref(), Some("7"));
    }

    #[test]
    fn command_errors_map_to_subtypes() {
        let failed = BridgeError::CommandHandler {
            command: "open".into(),
            message: "no such path".into(),
        };
        assert_eq!(failed.subtype(), "COMMAND_FAILED");
        assert_eq!(failed.to_string(), "no such path");

        let timeout = BridgeError::CommandTimeout {
            command: "power".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(timeout.subtype(), "COMMAND_TIMEOUT");
        assert!(timeout.to_string().contains("power"));
    }

    #[test]
    fn unknown_event_response() {
        let resp = BridgeError::UnknownEvent("frobnicate".into()).to_response(None);
        assert_eq!(resp.subtype.as_deref(), Some("UNKNOWN_EVENT"));
        assert!(resp.message.unwrap().contains("frobnicate"));
        assert!(resp.module.is_none());
    }
}
