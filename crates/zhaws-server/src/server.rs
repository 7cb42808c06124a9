// ── WebSocket server ──

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::CommandDispatcher;
use crate::error::ServerError;
use crate::gateway::Gateway;
use crate::session::Session;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8001;

/// Where to listen and what to do at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Start the radio network before accepting the first client.
    pub network_auto_start: bool,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            network_auto_start: false,
        }
    }

    #[must_use]
    pub fn with_network_auto_start(mut self, enabled: bool) -> Self {
        self.network_auto_start = enabled;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

/// A bound server, ready to [`run`](Server::run).
///
/// ```no_run
/// # use std::sync::Arc;
/// # use zhaws_server::{Gateway, Server, ServerConfig};
/// # async fn serve(gateway: Arc<dyn Gateway>) -> Result<(), zhaws_server::ServerError> {
/// let server = Server::bind(ServerConfig::default(), gateway).await?;
/// println!("listening on {}", server.local_addr());
/// server.run().await
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    gateway: Arc<dyn Gateway>,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind the listening socket. Uses the default handlers until
    /// [`with_dispatcher`](Self::with_dispatcher) says otherwise.
    pub async fn bind(config: ServerConfig, gateway: Arc<dyn Gateway>) -> Result<Self, ServerError> {
        let addr = config.address();
        let bind_error = |source| ServerError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        Ok(Self {
            config,
            listener,
            local_addr,
            gateway,
            dispatcher: Arc::new(CommandDispatcher::with_default_handlers()),
            shutdown: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: CommandDispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Cancelling this token stops the server and closes every session.
    /// A client's `stop_server` command cancels it too.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept clients until shut down, then wait for their sessions to end.
    pub async fn run(self) -> Result<(), ServerError> {
        if self.config.network_auto_start {
            info!("starting network");
            self.gateway.start_network().await.map_err(ServerError::Startup)?;
        }
        info!(addr = %self.local_addr, "server listening");

        let mut sessions = JoinSet::new();
        let mut next_id: u64 = 0;
        loop {
            let (tcp, peer) = tokio::select! {
                () = self.shutdown.cancelled() => break,
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "session task panicked");
                    }
                    continue;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            next_id += 1;
            let session = Session {
                id: next_id,
                peer,
                gateway: Arc::clone(&self.gateway),
                dispatcher: Arc::clone(&self.dispatcher),
                server_shutdown: self.shutdown.clone(),
            };
            sessions.spawn(async move {
                match accept_async(tcp).await {
                    Ok(ws) => session.run(ws).await,
                    Err(e) => debug!(%peer, error = %e, "WebSocket handshake failed"),
                }
            });
        }

        info!(sessions = sessions.len(), "server stopping");
        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "session task panicked");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
