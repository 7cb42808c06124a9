// ── Client session ──
//
// One task per accepted WebSocket. The reader decodes frames and spawns a
// dispatch per command; results and forwarded events all leave through one
// unbounded queue drained by a single writer, so frames go out in the order
// they were queued.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use zhaws_api::codec::parse_frame;
use zhaws_api::codes;
use zhaws_api::response::{CommandResponse, ErrorDetail, ResponsePayload};
use zhaws_api::{Command, CommandKind, CommandMessage, DecodeError, Event, Message};

use crate::dispatch::CommandDispatcher;
use crate::gateway::Gateway;

enum Outbound {
    Frame(String),
    /// Close the socket once everything queued before it is written.
    Close { stop_server: bool },
}

/// What the client asked to receive.
#[derive(Default)]
struct Subscription {
    listening: AtomicBool,
    raw_zcl: AtomicBool,
}

impl Subscription {
    fn wants(&self, event: &Event) -> bool {
        if event.is_raw_zcl() {
            self.raw_zcl.load(Ordering::Acquire)
        } else {
            self.listening.load(Ordering::Acquire)
        }
    }
}

pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) peer: SocketAddr,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) dispatcher: Arc<CommandDispatcher>,
    pub(crate) server_shutdown: CancellationToken,
}

impl Session {
    pub(crate) async fn run(self, ws: WebSocketStream<TcpStream>) {
        let session = self.id;
        info!(session, peer = %self.peer, "client connected");

        let (sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.server_shutdown.child_token();
        let subscription = Arc::new(Subscription::default());

        let writer = tokio::spawn(write_loop(
            session,
            sink,
            rx,
            cancel.clone(),
            self.server_shutdown.clone(),
        ));
        let forwarder = tokio::spawn(forward_events(
            session,
            self.gateway.events(),
            Arc::clone(&subscription),
            tx.clone(),
            cancel.clone(),
        ));

        loop {
            let frame = tokio::select! {
                () = cancel.cancelled() => break,
                frame = stream.next() => frame,
            };
            match frame {
                Some(Ok(WsMessage::Text(text))) => self.handle_text(text.as_str(), &tx, &subscription),
                Some(Ok(WsMessage::Binary(_))) => {
                    warn!(session, "ignoring binary frame");
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session, error = %e, "read failed");
                    break;
                }
            }
        }

        cancel.cancel();
        drop(tx);
        for task in [writer, forwarder] {
            if let Err(e) = task.await {
                warn!(session, error = %e, "session task failed");
            }
        }
        info!(session, "client disconnected");
    }

    fn handle_text(&self, text: &str, tx: &mpsc::UnboundedSender<Outbound>, subscription: &Subscription) {
        let session = self.id;
        let fields = match parse_frame(text) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(session, error = %e, "dropping malformed frame");
                return;
            }
        };
        let tag = fields
            .get("command")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match Message::decode(fields) {
            Ok(Message::Command(message)) => self.handle_command(message, tx, subscription),
            Ok(other) => {
                warn!(session, message_type = %other.message_type(), "ignoring frame a client should not send");
            }
            Err(err) => {
                warn!(session, error = %err, "undecodable command");
                if let Some(reply) = rejection(&err, tag) {
                    queue(tx, Outbound::Frame(reply));
                }
            }
        }
    }

    fn handle_command(
        &self,
        message: CommandMessage,
        tx: &mpsc::UnboundedSender<Outbound>,
        subscription: &Subscription,
    ) {
        let session = self.id;
        let message_id = message.message_id;
        let kind = message.command.kind();
        debug!(session, message_id, command = %kind, "received command");

        match message.command {
            Command::ClientListen => {
                subscription.listening.store(true, Ordering::Release);
                reply_empty(tx, message_id, kind);
            }
            Command::ClientListenRawZcl => {
                subscription.listening.store(true, Ordering::Release);
                subscription.raw_zcl.store(true, Ordering::Release);
                reply_empty(tx, message_id, kind);
            }
            Command::ClientDisconnect => {
                reply_empty(tx, message_id, kind);
                queue(tx, Outbound::Close { stop_server: false });
            }
            Command::StopServer => {
                info!(session, "stop requested by client");
                reply_empty(tx, message_id, kind);
                queue(tx, Outbound::Close { stop_server: true });
            }
            _ => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let gateway = Arc::clone(&self.gateway);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = dispatcher.dispatch(&gateway, message).await;
                    queue_response(&tx, response);
                });
            }
        }
    }
}

// ── Outbound plumbing ───────────────────────────────────────────────

fn queue(tx: &mpsc::UnboundedSender<Outbound>, outbound: Outbound) {
    if tx.send(outbound).is_err() {
        debug!("session closed before a frame could be queued");
    }
}

fn queue_response(tx: &mpsc::UnboundedSender<Outbound>, response: CommandResponse) {
    match Message::Result(response).to_text() {
        Ok(text) => queue(tx, Outbound::Frame(text)),
        Err(e) => warn!(error = %e, "cannot encode result"),
    }
}

fn reply_empty(tx: &mpsc::UnboundedSender<Outbound>, message_id: u32, kind: CommandKind) {
    queue_response(
        tx,
        CommandResponse::success(message_id, kind, ResponsePayload::Empty),
    );
}

/// Failed result for a command frame that could not be decoded, when its
/// `message_id` is known. The `command` tag is echoed as sent.
fn rejection(err: &DecodeError, tag: Option<String>) -> Option<String> {
    if err.message_type.as_deref() != Some("command") {
        return None;
    }
    let message_id = err.message_id?;
    let known = tag
        .as_deref()
        .is_some_and(|tag| tag.parse::<CommandKind>().is_ok());
    let code = if known {
        codes::INVALID_COMMAND
    } else {
        codes::UNKNOWN_COMMAND
    };

    let mut fields = ErrorDetail::new(code, err.reason.clone()).to_fields().ok()?;
    fields.insert("message_type".to_owned(), Value::from("result"));
    fields.insert("message_id".to_owned(), Value::from(message_id));
    fields.insert("command".to_owned(), tag.map_or(Value::Null, Value::from));
    fields.insert("success".to_owned(), Value::from(false));
    serde_json::to_string(&Value::Object(fields)).ok()
}

async fn write_loop<S>(
    session: u64,
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
    server_shutdown: CancellationToken,
) where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    loop {
        let outbound = tokio::select! {
            biased;
            outbound = rx.recv() => outbound,
            () = cancel.cancelled() => None,
        };
        match outbound {
            Some(Outbound::Frame(text)) => {
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    debug!(session, error = %e, "write failed");
                    break;
                }
            }
            Some(Outbound::Close { stop_server }) => {
                if let Err(e) = sink.close().await {
                    debug!(session, error = %e, "close failed");
                }
                if stop_server {
                    server_shutdown.cancel();
                }
                break;
            }
            None => break,
        }
    }
    cancel.cancel();
}

async fn forward_events(
    session: u64,
    mut events: tokio::sync::broadcast::Receiver<Event>,
    subscription: Arc<Subscription>,
    tx: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = events.recv() => received,
        };
        match received {
            Ok(event) => {
                if !subscription.wants(&event) {
                    continue;
                }
                match Message::Event(event).to_text() {
                    Ok(text) => {
                        if tx.send(Outbound::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(session, error = %e, "cannot encode event"),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(session, skipped, "client fell behind the event feed");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};

    use super::*;

    fn decode_err(value: Value) -> (DecodeError, Option<String>) {
        let Value::Object(fields) = value else {
            unreachable!()
        };
        let tag = fields.get("command").and_then(Value::as_str).map(str::to_owned);
        (Message::decode(fields).unwrap_err(), tag)
    }

    fn reply(text: &str) -> Map<String, Value> {
        parse_frame(text).unwrap()
    }

    #[test]
    fn bad_parameters_are_invalid_command() {
        let (err, tag) = decode_err(json!({
            "message_type": "command",
            "message_id": 12,
            "command": "cover_set_position",
            "unique_id": "cover_1",
            "platform": "cover",
        }));
        let fields = reply(&rejection(&err, tag).unwrap());
        assert_eq!(fields["message_id"], json!(12));
        assert_eq!(fields["command"], json!("cover_set_position"));
        assert_eq!(fields["success"], json!(false));
        assert_eq!(fields["error_code"], json!(codes::INVALID_COMMAND));
    }

    #[test]
    fn unknown_tag_is_unknown_command() {
        let (err, tag) = decode_err(json!({
            "message_type": "command",
            "message_id": 13,
            "command": "make_coffee",
        }));
        let fields = reply(&rejection(&err, tag).unwrap());
        assert_eq!(fields["command"], json!("make_coffee"));
        assert_eq!(fields["error_code"], json!(codes::UNKNOWN_COMMAND));
    }

    #[test]
    fn frames_without_an_id_are_dropped() {
        let (err, tag) = decode_err(json!({
            "message_type": "command",
            "command": "get_devices",
        }));
        assert!(rejection(&err, tag).is_none());

        let (err, tag) = decode_err(json!({
            "message_type": "event",
            "event_type": "entity",
            "event": "nothing",
        }));
        assert!(rejection(&err, tag).is_none());
    }

    #[test]
    fn raw_zcl_needs_its_own_subscription() {
        let subscription = Subscription::default();
        let raw = Event::decode(
            serde_json::from_value(json!({
                "event_type": "raw_zcl_event",
                "event": "attribute_updated",
                "device_ieee": "aa:bb:cc:dd:ee:ff:00:01",
                "endpoint_id": 1,
                "cluster_id": 6,
                "attribute_id": 0,
                "value": true,
            }))
            .unwrap(),
        )
        .unwrap();

        assert!(!subscription.wants(&raw));
        subscription.listening.store(true, Ordering::Release);
        assert!(!subscription.wants(&raw));
        subscription.raw_zcl.store(true, Ordering::Release);
        assert!(subscription.wants(&raw));
    }
}
