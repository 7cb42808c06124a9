// ── WebSocket client session ──
//
// One `Client` owns at most one live connection. The socket is split: the
// write half sits behind an async mutex shared by all senders, the read half
// is moved into the receive task spawned by `listen()`. Connection state is
// published on a `watch` channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::{CommandMessage, Message, parse_frame};
use crate::command::Command;
use crate::correlation::{DEFAULT_REQUEST_TIMEOUT, PendingGuard, PendingRequests};
use crate::error::{Error, TransportError};
use crate::event::{Event, EventKind, EventPayload};
use crate::listeners::{EventDispatcher, ListenerId, ListenerResult};
use crate::response::ResponsePayload;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bound on each awaited command.
    pub request_timeout: Duration,
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Lifecycle of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Listening,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Listening)
    }
}

/// Per-connection resources. Installed when `connect()` claims the client
/// and removed by whoever tears the connection down.
struct Session {
    id: u64,
    cancel: CancellationToken,
    reader: Option<WsSource>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    url: Url,
    options: ClientOptions,
    shutdown: CancellationToken,
    state: watch::Sender<ConnectionState>,
    /// Terminal result of the most recent receive loop; `None` while running.
    outcome: watch::Sender<Option<Result<(), TransportError>>>,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    /// State and outcome transitions happen under this lock.
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
    pending: PendingRequests,
    /// `None` keys catch-all listeners, which run before typed ones.
    events: EventDispatcher<Option<EventKind>, Event>,
}

/// Async client for one ZHA WebSocket server.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.url.as_str())
            .field("state", &*self.inner.state.borrow())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(url: Url, options: ClientOptions) -> Self {
        Self::with_shutdown(url, options, CancellationToken::new())
    }

    /// Bind the client's lifetime to `shutdown`. The client only ever
    /// cancels child tokens of it, never `shutdown` itself.
    pub fn with_shutdown(url: Url, options: ClientOptions, shutdown: CancellationToken) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (outcome, _) = watch::channel(Some(Ok(())));
        Self {
            inner: Arc::new(Inner {
                url,
                options,
                shutdown,
                state,
                outcome,
                writer: tokio::sync::Mutex::new(None),
                session: Mutex::new(None),
                next_session: AtomicU64::new(0),
                pending: PendingRequests::new(),
                events: EventDispatcher::new(),
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn options(&self) -> ClientOptions {
        self.inner.options
    }

    // ── State ───────────────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Number of requests awaiting a result.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open the WebSocket. A no-op when already connected.
    ///
    /// A `disconnect()` issued while the handshake is in flight abandons
    /// the attempt; the socket never becomes visible.
    pub async fn connect(&self) -> Result<(), Error> {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let cancel = self.inner.shutdown.child_token();
        {
            let mut slot = self.inner.lock_session();
            let mut previous = ConnectionState::Disconnected;
            let claimed = self.inner.state.send_if_modified(|state| {
                previous = *state;
                if *state == ConnectionState::Disconnected {
                    *state = ConnectionState::Connecting;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                return match previous {
                    ConnectionState::Connecting => Err(TransportError::Connect(
                        "another connection attempt is in progress".into(),
                    )
                    .into()),
                    _ => Ok(()),
                };
            }
            *slot = Some(Session {
                id,
                cancel: cancel.clone(),
                reader: None,
                task: None,
            });
        }

        let stream = match self.open_socket(&cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.abandon(id);
                return Err(e.into());
            }
        };
        let (mut sink, source) = stream.split();

        let mut writer = self.inner.writer.lock().await;
        let live = {
            let mut slot = self.inner.lock_session();
            match slot.as_mut().filter(|session| session.id == id) {
                Some(session) => {
                    session.reader = Some(source);
                    self.inner.outcome.send_replace(None);
                    self.inner.state.send_replace(ConnectionState::Connected);
                    true
                }
                None => false,
            }
        };
        if !live {
            drop(writer);
            if let Err(e) = sink.close().await {
                debug!(error = %e, "closing abandoned socket");
            }
            return Err(TransportError::Connect("disconnected during handshake".into()).into());
        }
        *writer = Some(sink);
        drop(writer);
        info!(url = %self.inner.url, "connected");
        Ok(())
    }

    async fn open_socket(&self, cancel: &CancellationToken) -> Result<WsStream, TransportError> {
        let timeout = self.inner.options.connect_timeout;
        let attempt = tokio::time::timeout(timeout, connect_async(self.inner.url.as_str()));
        tokio::select! {
            () = cancel.cancelled() => Err(TransportError::Connect("connection attempt cancelled".into())),
            result = attempt => match result {
                Err(_) => Err(TransportError::Connect(format!(
                    "no handshake within {timeout:?}"
                ))),
                Ok(Err(e)) => Err(TransportError::Connect(e.to_string())),
                Ok(Ok((stream, _response))) => Ok(stream),
            },
        }
    }

    /// Start the background receive loop.
    ///
    /// Only valid in `Connected`; calling it twice is an error.
    pub fn listen(&self) -> Result<(), Error> {
        let mut slot = self.inner.lock_session();
        match self.connection_state() {
            ConnectionState::Connected => {}
            ConnectionState::Listening => return Err(Error::AlreadyListening),
            _ => return Err(TransportError::NotConnected.into()),
        }
        let session = slot.as_mut().ok_or(TransportError::NotConnected)?;
        let reader = session.reader.take().ok_or(Error::AlreadyListening)?;
        let (id, cancel) = (session.id, session.cancel.clone());
        let inner = Arc::clone(&self.inner);

        self.inner.state.send_replace(ConnectionState::Listening);
        session.task = Some(tokio::spawn(async move {
            let result = inner.receive_loop(reader, &cancel).await;
            inner.finish(id, result).await;
        }));
        Ok(())
    }

    /// Close the connection, or abandon a connection attempt in flight.
    /// Safe to call in any state and more than once.
    pub async fn disconnect(&self) {
        let Some(mut session) = self.inner.lock_session().take() else {
            return;
        };
        session.cancel.cancel();
        if let Some(task) = session.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "receive task ended abnormally");
            }
        }
        self.inner.teardown(Ok(())).await;
    }

    /// Wait for the current receive loop to end and return why it ended.
    ///
    /// The state is already `Disconnected` when this returns.
    pub async fn closed(&self) -> Result<(), TransportError> {
        let mut rx = self.inner.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone())
            .map_err(|_| TransportError::NotConnected)?;
        outcome.unwrap_or(Ok(()))
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Send `command` and await its result.
    pub async fn send_command(&self, command: Command) -> Result<ResponsePayload, Error> {
        command.validate().map_err(Error::InvalidCommand)?;
        if !self.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        let kind = command.kind();
        let pending = &self.inner.pending;
        // Registered before sending so an early result finds its waiter.
        let (message_id, rx) = pending.register(kind)?;
        let guard = PendingGuard::new(pending, message_id);
        let text = Message::Command(CommandMessage {
            message_id,
            command,
        })
        .to_text()?;
        debug!(message_id, command = %kind, "sending command");
        self.inner.send_text(text).await?;
        pending
            .wait(guard, rx, kind, self.inner.options.request_timeout)
            .await
    }

    /// Send `command` without waiting for a result.
    ///
    /// The id is still allocated so it cannot collide with a tracked request.
    /// Send failures are logged, not returned.
    pub fn send_command_no_wait(&self, command: Command) -> Result<u32, Error> {
        command.validate().map_err(Error::InvalidCommand)?;
        let kind = command.kind();
        let message_id = self.inner.pending.allocate_untracked()?;
        let text = Message::Command(CommandMessage {
            message_id,
            command,
        })
        .to_text()?;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(error) = inner.send_text(text).await {
                warn!(message_id, command = %kind, %error, "fire-and-forget send failed");
            }
        });
        Ok(message_id)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Subscribe to one event kind, selected by its payload type.
    pub fn on<E, F>(&self, listener: F) -> ListenerId
    where
        E: EventPayload,
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner
            .events
            .on(Some(E::KIND), move |event: &Event| match E::from_event(event) {
                Some(payload) => listener(payload),
                None => Ok(()),
            })
    }

    /// Subscribe to every event. Catch-all listeners run before typed ones.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.events.on(None, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.off(id)
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop a failed connection attempt, unless `disconnect()` already did.
    fn abandon(&self, id: u64) {
        let mut slot = self.lock_session();
        if slot.take_if(|session| session.id == id).is_some() {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    /// End of a receive loop. Tears down only if the session is still
    /// installed; otherwise `disconnect()` owns the teardown.
    async fn finish(&self, id: u64, result: Result<(), TransportError>) {
        let owned = self
            .lock_session()
            .take_if(|session| session.id == id)
            .is_some();
        if owned {
            self.teardown(result).await;
        }
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(WsMessage::Text(text.into()))
            .await
            .map_err(TransportError::from)
    }

    async fn receive_loop(
        &self,
        mut reader: WsSource,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                frame = reader.next() => frame,
            };
            match frame {
                Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str())?,
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame.map_or((1005, String::new()), |f| {
                        (u16::from(f.code), f.reason.to_string())
                    });
                    return Err(TransportError::Closed { code, reason });
                }
                Some(Ok(WsMessage::Binary(_))) => {
                    return Err(TransportError::UnexpectedFrame("binary".into()));
                }
                Some(Ok(WsMessage::Frame(_))) => {
                    return Err(TransportError::UnexpectedFrame("raw".into()));
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(TransportError::Closed {
                        code: 1006,
                        reason: "stream ended".into(),
                    });
                }
            }
        }
    }

    /// Route one text frame. Only transport-level faults are returned.
    fn handle_text(&self, text: &str) -> Result<(), TransportError> {
        let fields = parse_frame(text)?;
        match Message::decode(fields) {
            Ok(Message::Result(response)) => {
                let message_id = response.message_id;
                if !self.pending.resolve(response) {
                    debug!(message_id, "result for a request nobody is waiting on");
                }
            }
            Ok(Message::Event(event)) => {
                let kind = event.kind();
                debug!(event_type = kind.event_type(), event = kind.event_name(), "event");
                self.events.emit(&None, &event);
                self.events.emit(&Some(kind), &event);
            }
            Ok(Message::Command(cmd)) => {
                warn!(message_id = cmd.message_id, "server sent a command frame; ignoring");
            }
            Err(e) => match e.message_id {
                Some(message_id) if e.is_result() => {
                    warn!(message_id, error = %e, "undecodable result");
                    self.pending.fail(message_id, Error::Decode(e));
                }
                _ => warn!(error = %e, "dropping undecodable frame"),
            },
        }
        Ok(())
    }

    /// Release the socket and fail all waiters. The caller has already
    /// removed the session, so no new connection can start until the
    /// state below reads `Disconnected`.
    async fn teardown(&self, result: Result<(), TransportError>) {
        if let Err(e) = &result {
            warn!(error = %e, "connection lost");
        }
        if let Some(mut sink) = self.writer.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "closing socket");
            }
        }
        let failed = self.pending.fail_all();
        if failed > 0 {
            debug!(failed, "cancelled pending requests");
        }
        let _slot = self.lock_session();
        let was = self.state.send_replace(ConnectionState::Disconnected);
        if was != ConnectionState::Disconnected {
            info!(url = %self.url, "disconnected");
        }
        self.outcome.send_if_modified(|outcome| {
            if outcome.is_none() {
                *outcome = Some(result);
                true
            } else {
                false
            }
        });
    }
}
