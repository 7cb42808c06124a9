use std::time::Duration;

use thiserror::Error;

use crate::command::CommandKind;

/// Top-level error type for the `zhaws-api` crate.
///
/// Every failure a caller of [`Client`](crate::Client) can observe maps to
/// exactly one variant here, so callers can tell a dead connection from a
/// rejected command from a request that simply never got an answer.
/// `zhaws-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// The connection failed or was torn down.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `listen()` was called while a receive loop is already running.
    #[error("Receive loop is already running on this connection")]
    AlreadyListening,

    // ── Messages ────────────────────────────────────────────────────
    /// The command failed local parameter checks and was never sent.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The command could not be serialized.
    #[error("Cannot encode command: {0}")]
    Encode(#[from] serde_json::Error),

    /// A frame was valid JSON but did not match any known message shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The server answered the command with `success: false`.
    #[error(transparent)]
    Command(#[from] CommandError),

    // ── Correlation ─────────────────────────────────────────────────
    /// No result arrived within the request timeout. The outcome on the
    /// server is unknown.
    #[error("Command {command} (message {message_id}) timed out after {timeout:?}")]
    Timeout {
        message_id: u32,
        command: CommandKind,
        timeout: Duration,
    },

    /// The request was still pending when the connection was closed.
    #[error("Command {command} (message {message_id}) cancelled: connection closed")]
    Cancelled {
        message_id: u32,
        command: CommandKind,
    },

    /// Every correlation id in the wrap range is in flight.
    #[error("No free message id: {in_flight} requests in flight")]
    IdsExhausted { in_flight: usize },
}

impl Error {
    /// Returns `true` for timeouts, where the command may or may not have
    /// been applied by the server.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the error means the connection is gone and the
    /// caller should reconnect before retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Cancelled { .. } | Self::Timeout { .. }
        )
    }

    /// The server-side error code, if the server rejected the command.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Command(e) => Some(&e.code),
            _ => None,
        }
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// Failures of the underlying socket. Fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connecting failed (refused, DNS, handshake, timeout).
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    /// Not connected when an operation needed the socket.
    #[error("Not connected")]
    NotConnected,

    /// The peer sent a close frame or the stream ended.
    #[error("WebSocket closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// A non-text data frame arrived.
    #[error("Unexpected {0} frame")]
    UnexpectedFrame(String),

    /// A text frame was not a JSON object.
    #[error("Received invalid JSON: {0}")]
    InvalidJson(String),

    /// Reading from or writing to the socket failed.
    #[error("WebSocket I/O error: {0}")]
    Io(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed {
                code: 1006,
                reason: err.to_string(),
            },
            other => Self::Io(other.to_string()),
        }
    }
}

// ── Decode ──────────────────────────────────────────────────────────

/// A frame that parsed as JSON but not as any known message.
///
/// Carries whatever envelope fields could still be read so the receive loop
/// can route a broken result to its waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot decode {} message: {reason}", message_type.as_deref().unwrap_or("untyped"))]
pub struct DecodeError {
    pub message_type: Option<String>,
    pub message_id: Option<u32>,
    pub reason: String,
}

impl DecodeError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            message_type: None,
            message_id: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn in_message(mut self, message_type: &str, message_id: Option<u32>) -> Self {
        self.message_type = Some(message_type.to_owned());
        self.message_id = message_id;
        self
    }

    /// Whether this frame claimed to be a command result.
    pub fn is_result(&self) -> bool {
        self.message_type.as_deref() == Some("result")
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

// ── Command ─────────────────────────────────────────────────────────

/// A structured `success: false` result from the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Command {command} failed ({code}): {message}")]
pub struct CommandError {
    pub message_id: u32,
    pub command: CommandKind,
    pub code: String,
    pub message: String,
    /// Present when the failure came from the radio layer.
    pub radio: Option<RadioOperationError>,
}

impl CommandError {
    pub fn is_not_found(&self) -> bool {
        self.code == crate::codes::ENTITY_NOT_FOUND
            || self.code == crate::codes::DEVICE_NOT_FOUND
            || self.code == crate::codes::GROUP_NOT_FOUND
    }
}

/// Secondary code/message pair reported by the radio stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("radio error {code}: {}", message.as_deref().unwrap_or("no detail"))]
pub struct RadioOperationError {
    pub code: String,
    pub message: Option<String>,
}
