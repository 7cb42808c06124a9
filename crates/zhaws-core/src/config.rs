// ── Runtime connection configuration ──
//
// Describes how to reach one server. Never touches disk: the CLI builds a
// `ControllerConfig` and hands it in.

use std::time::Duration;

use url::Url;
use zhaws_api::{ClientOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// Configuration for connecting to a single server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// WebSocket endpoint (e.g., `ws://192.168.1.10:8001`).
    pub url: Url,
    /// Bound on each awaited command.
    pub request_timeout: Duration,
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl ControllerConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
        }
    }
}
