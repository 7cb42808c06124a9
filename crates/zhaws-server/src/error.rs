// ── Server error types ──
//
// `ServerError` covers startup and the accept loop. Failures of a single
// command never become a `ServerError`; they are answered as failed results.

use thiserror::Error;
use zhaws_api::CommandKind;
use zhaws_api::model::Ieee;

/// Errors that stop the server or prevent it from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("A handler for {0} is already registered")]
    DuplicateHandler(CommandKind),

    #[error("Network auto-start failed: {0}")]
    Startup(#[source] OperationError),
}

/// Outcome of a failed gateway or entity operation.
///
/// The dispatcher turns each variant into the matching `error_code` of a
/// failed result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The radio stack rejected the operation.
    #[error("radio error {code}: {}", message.as_deref().unwrap_or("no detail"))]
    Radio {
        code: String,
        message: Option<String>,
    },

    #[error("Device not found: {0}")]
    DeviceNotFound(Ieee),

    #[error("Group not found: {0}")]
    GroupNotFound(u16),

    #[error("{0}")]
    Invalid(String),

    #[error("{0} is not supported by this gateway")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

impl OperationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn radio(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Radio {
            code: code.into(),
            message: Some(message.into()),
        }
    }
}
