//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a distinct process exit code per category.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use zhaws_config::ConfigError;
use zhaws_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const COMMAND_FAILED: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to server at {url}")]
    #[diagnostic(
        code(zhaws::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             Point at another one with --url ws://HOST:PORT or --profile NAME."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection lost: {reason}")]
    #[diagnostic(code(zhaws::disconnected))]
    Disconnected { reason: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(zhaws::not_found),
        help("Run: zhaws {list_command} to see what the server knows")
    )]
    NotFound {
        resource_type: &'static str,
        identifier: String,
        list_command: &'static str,
    },

    // ── Server-side failures ─────────────────────────────────────────
    #[error("{command} failed ({code}): {message}")]
    #[diagnostic(code(zhaws::command_failed))]
    CommandFailed {
        command: String,
        code: String,
        message: String,
        #[help]
        radio: Option<String>,
    },

    #[error("{0}")]
    #[diagnostic(code(zhaws::protocol))]
    Protocol(String),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("No answer to {command} within {timeout:?}")]
    #[diagnostic(
        code(zhaws::timeout),
        help("The command may still take effect. Increase the wait with --timeout.")
    )]
    Timeout { command: String, timeout: Duration },

    // ── Usage ────────────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(zhaws::validation))]
    Validation { field: String, reason: String },

    #[error("{operation} does not apply to a {platform} entity")]
    #[diagnostic(code(zhaws::unsupported))]
    Unsupported { operation: String, platform: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(zhaws::profile_not_found),
        help("Available profiles: {available}\nCreate one with: zhaws config init")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Config file already exists at {path}")]
    #[diagnostic(code(zhaws::config_exists), help("Pass --force to overwrite it."))]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(zhaws::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot render output: {0}")]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::CommandFailed { .. } => exit_code::COMMAND_FAILED,
            Self::Validation { .. }
            | Self::Unsupported { .. }
            | Self::ProfileNotFound { .. }
            | Self::ConfigExists { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name } => {
                let cfg = zhaws_config::load_config_or_default();
                let available = cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ");
                CliError::ProfileNotFound {
                    name,
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available
                    },
                }
            }
            ConfigError::InvalidUrl { url, reason } => CliError::Validation {
                field: format!("url '{url}'"),
                reason,
            },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::Disconnected { reason } => CliError::Disconnected { reason },

            CoreError::Timeout {
                command,
                timeout,
            } => CliError::Timeout { command, timeout },

            CoreError::DeviceNotFound { ieee } => CliError::NotFound {
                resource_type: "device",
                identifier: ieee.to_string(),
                list_command: "devices list",
            },

            CoreError::GroupNotFound { group_id } => CliError::NotFound {
                resource_type: "group",
                identifier: group_id.to_string(),
                list_command: "groups list",
            },

            CoreError::EntityNotFound { entity } => CliError::NotFound {
                resource_type: "entity",
                identifier: entity,
                list_command: "devices get <IEEE>",
            },

            CoreError::Unsupported {
                operation,
                platform,
            } => CliError::Unsupported {
                operation: operation.into(),
                platform: platform.to_string(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::CommandFailed {
                command,
                code,
                message,
                radio,
            } => {
                if code == zhaws_api::codes::ENTITY_NOT_FOUND {
                    return CliError::NotFound {
                        resource_type: "entity",
                        identifier: message,
                        list_command: "devices get <IEEE>",
                    };
                }
                CliError::CommandFailed {
                    command,
                    code,
                    message,
                    radio: radio.map(|(code, message)| match message {
                        Some(message) => format!("Radio reported {code}: {message}"),
                        None => format!("Radio reported {code}"),
                    }),
                }
            }

            CoreError::UnexpectedPayload { command } => {
                CliError::Protocol(format!("unexpected reply to {command}"))
            }

            CoreError::Protocol { message } | CoreError::Internal(message) => {
                CliError::Protocol(message)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn categories_get_distinct_exit_codes() {
        let connection = CliError::from(CoreError::ConnectionFailed {
            url: "ws://127.0.0.1:1".into(),
            reason: "refused".into(),
        });
        let missing = CliError::from(CoreError::GroupNotFound { group_id: 4 });
        let timeout = CliError::from(CoreError::Timeout {
            command: "get_devices".into(),
            timeout: std::time::Duration::from_secs(3),
        });
        let failed = CliError::from(CoreError::CommandFailed {
            command: "remove_groups".into(),
            code: zhaws_api::codes::RADIO.into(),
            message: "radio said no".into(),
            radio: Some(("DELIVERY_FAILED".into(), None)),
        });
        let usage = CliError::from(ConfigError::InvalidUrl {
            url: "http://x".into(),
            reason: "wrong scheme".into(),
        });

        let codes = [
            connection.exit_code(),
            missing.exit_code(),
            timeout.exit_code(),
            failed.exit_code(),
            usage.exit_code(),
        ];
        assert_eq!(
            codes,
            [
                exit_code::CONNECTION,
                exit_code::NOT_FOUND,
                exit_code::TIMEOUT,
                exit_code::COMMAND_FAILED,
                exit_code::USAGE,
            ]
        );
    }

    #[test]
    fn missing_entity_reply_is_not_found() {
        let err = CliError::from(CoreError::CommandFailed {
            command: "switch_turn_on".into(),
            code: zhaws_api::codes::ENTITY_NOT_FOUND.into(),
            message: "no entity switch_9".into(),
            radio: None,
        });
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }
}
