// ── Core error types ──
//
// User-facing errors from zhaws-core. Consumers never see raw frames or
// correlation ids; the `From<zhaws_api::Error>` impl translates
// protocol-layer errors into domain-appropriate variants.

use std::time::Duration;

use thiserror::Error;
use zhaws_api::model::{Ieee, Platform};
use zhaws_api::{CommandError, TransportError};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to server at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Server disconnected: {reason}")]
    Disconnected { reason: String },

    #[error("No answer to {command} within {timeout:?}; the outcome is unknown")]
    Timeout { command: String, timeout: Duration },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {ieee}")]
    DeviceNotFound { ieee: Ieee },

    #[error("Group not found: {group_id}")]
    GroupNotFound { group_id: u16 },

    #[error("Entity not found: {entity}")]
    EntityNotFound { entity: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation not supported: {operation} on a {platform} entity")]
    Unsupported {
        operation: &'static str,
        platform: Platform,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    /// The server rejected the command.
    #[error("{command} failed ({code}): {message}")]
    CommandFailed {
        command: String,
        code: String,
        message: String,
        /// Radio-layer code and message, when the failure came from there.
        radio: Option<(String, Option<String>)>,
    },

    /// The result decoded, but not into the payload this command returns.
    #[error("Unexpected result payload for {command}")]
    UnexpectedPayload { command: String },

    // ── Protocol errors (wrapped, not exposed raw) ───────────────────
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the server (or the mirror) reported the target as absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::DeviceNotFound { .. } | Self::GroupNotFound { .. } | Self::EntityNotFound { .. } => {
                true
            }
            Self::CommandFailed { code, .. } => {
                code == zhaws_api::codes::ENTITY_NOT_FOUND
                    || code == zhaws_api::codes::DEVICE_NOT_FOUND
                    || code == zhaws_api::codes::GROUP_NOT_FOUND
            }
            _ => false,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Disconnected { .. }
        )
    }
}

// ── Conversion from protocol-layer errors ───────────────────────────

impl From<zhaws_api::Error> for CoreError {
    fn from(err: zhaws_api::Error) -> Self {
        match err {
            zhaws_api::Error::Transport(TransportError::Connect(reason)) => {
                CoreError::ConnectionFailed {
                    url: String::new(),
                    reason,
                }
            }
            zhaws_api::Error::Transport(e) => CoreError::Disconnected {
                reason: e.to_string(),
            },
            zhaws_api::Error::Cancelled { command, .. } => CoreError::Disconnected {
                reason: format!("connection closed while {command} was in flight"),
            },
            zhaws_api::Error::Timeout {
                command, timeout, ..
            } => CoreError::Timeout {
                command: command.to_string(),
                timeout,
            },
            zhaws_api::Error::InvalidCommand(message) => CoreError::ValidationFailed { message },
            zhaws_api::Error::Command(e) => e.into(),
            zhaws_api::Error::Decode(e) => CoreError::Protocol {
                message: e.to_string(),
            },
            zhaws_api::Error::Encode(e) => CoreError::Internal(format!("Encode error: {e}")),
            zhaws_api::Error::AlreadyListening => {
                CoreError::Internal("receive loop already running".into())
            }
            zhaws_api::Error::IdsExhausted { in_flight } => {
                CoreError::Internal(format!("no free message id ({in_flight} in flight)"))
            }
        }
    }
}

impl From<CommandError> for CoreError {
    fn from(e: CommandError) -> Self {
        CoreError::CommandFailed {
            command: e.command.to_string(),
            code: e.code,
            message: e.message,
            radio: e.radio.map(|r| (r.code, r.message)),
        }
    }
}
