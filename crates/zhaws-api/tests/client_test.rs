#![allow(clippy::unwrap_used)]

// Integration tests for `Client` against a scripted in-process server.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{WebSocketStream, accept_async};

use zhaws_api::command::PermitJoiningParams;
use zhaws_api::event::DeviceLeftEvent;
use zhaws_api::model::Platform;
use zhaws_api::{
    Client, ClientOptions, Command, ConnectionState, EntityCommand, EntityTarget, Error,
    ResponsePayload, TransportError, Url,
};

type Ws = WebSocketStream<TcpStream>;

const IEEE: &str = "aa:bb:cc:dd:ee:ff:00:01";

/// Serve every accepted connection with `script`, passing the 0-based
/// connection number.
async fn serve<F, Fut>(script: F) -> Url
where
    F: Fn(Ws, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let script = Arc::new(script);
    let accepted = Arc::new(AtomicUsize::new(0));
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let n = accepted.fetch_add(1, Ordering::SeqCst);
            let script = Arc::clone(&script);
            tokio::spawn(async move {
                let ws = accept_async(tcp).await.unwrap();
                script(ws, n).await;
            });
        }
    });
    Url::parse(&format!("ws://{addr}")).unwrap()
}

async fn next_frame(ws: &mut Ws) -> Option<Map<String, Value>> {
    while let Some(Ok(msg)) = ws.next().await {
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).ok();
        }
    }
    None
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(WsMessage::Text(value.to_string().into()))
        .await
        .unwrap();
}

fn ok_result(frame: &Map<String, Value>) -> Value {
    json!({
        "message_type": "result",
        "message_id": frame["message_id"],
        "command": frame["command"],
        "success": true,
    })
}

fn options(timeout_ms: u64) -> ClientOptions {
    ClientOptions {
        request_timeout: Duration::from_millis(timeout_ms),
        ..ClientOptions::default()
    }
}

async fn connected(url: Url, opts: ClientOptions) -> Client {
    let client = Client::new(url, opts);
    client.connect().await.unwrap();
    client.listen().unwrap();
    client
}

fn switch_on() -> Command {
    Command::SwitchTurnOn(EntityCommand::bare(EntityTarget::device(
        IEEE.parse().unwrap(),
        Platform::Switch,
        "switch_1",
    )))
}

/// Reply to every command with an empty success.
async fn echo_server(mut ws: Ws, _n: usize) {
    while let Some(frame) = next_frame(&mut ws).await {
        send_json(&mut ws, ok_result(&frame)).await;
    }
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn command_gets_its_result() {
    let url = serve(echo_server).await;
    let client = connected(url, options(2_000)).await;

    let payload = client.send_command(switch_on()).await.unwrap();
    assert_eq!(payload, ResponsePayload::Empty);
    assert_eq!(client.pending_requests(), 0);
    client.disconnect().await;
}

#[tokio::test]
async fn typed_payload_is_decoded_per_command() {
    let url = serve(|mut ws: Ws, _| async move {
        let frame = next_frame(&mut ws).await.unwrap();
        assert_eq!(frame["command"], "permit_joining");
        assert_eq!(frame["duration"], 60);
        send_json(
            &mut ws,
            json!({
                "message_type": "result",
                "message_id": frame["message_id"],
                "command": "permit_joining",
                "success": true,
                "duration": 60,
            }),
        )
        .await;
        let _ = next_frame(&mut ws).await;
    })
    .await;
    let client = connected(url, options(2_000)).await;

    let payload = client
        .send_command(Command::PermitJoining(PermitJoiningParams::default()))
        .await
        .unwrap();
    assert_eq!(
        payload,
        ResponsePayload::PermitJoining {
            duration: Some(60),
            ieee: None,
        }
    );
    client.disconnect().await;
}

#[tokio::test]
async fn concurrent_results_can_arrive_out_of_order() {
    fn permit_result(frame: &Map<String, Value>) -> Value {
        json!({
            "message_type": "result",
            "message_id": frame["message_id"],
            "command": "permit_joining",
            "success": true,
            "duration": frame["duration"],
        })
    }

    let url = serve(|mut ws: Ws, _| async move {
        let first = next_frame(&mut ws).await.unwrap();
        let second = next_frame(&mut ws).await.unwrap();
        assert_ne!(first["message_id"], second["message_id"]);
        send_json(&mut ws, permit_result(&second)).await;
        send_json(&mut ws, permit_result(&first)).await;
        let _ = next_frame(&mut ws).await;
    })
    .await;
    let client = connected(url, options(2_000)).await;

    let permit = |duration| {
        Command::PermitJoining(PermitJoiningParams {
            duration,
            ieee: None,
        })
    };
    let (a, b) = tokio::join!(
        client.send_command(permit(10)),
        client.send_command(permit(20)),
    );
    let duration = |payload: ResponsePayload| match payload {
        ResponsePayload::PermitJoining { duration, .. } => duration,
        other => panic!("unexpected payload {other:?}"),
    };
    assert_eq!(duration(a.unwrap()), Some(10));
    assert_eq!(duration(b.unwrap()), Some(20));
    client.disconnect().await;
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn failure_result_carries_radio_error() {
    let url = serve(|mut ws: Ws, _| async move {
        let frame = next_frame(&mut ws).await.unwrap();
        send_json(
            &mut ws,
            json!({
                "message_type": "result",
                "message_id": frame["message_id"],
                "command": frame["command"],
                "success": false,
                "error_code": "zigbee_error",
                "error_message": "send failed",
                "zigbee_error_code": "DELIVERY_FAILED",
                "zigbee_error_message": "no route",
            }),
        )
        .await;
        let _ = next_frame(&mut ws).await;
    })
    .await;
    let client = connected(url, options(2_000)).await;

    let err = client.send_command(switch_on()).await.unwrap_err();
    let cmd = match err {
        Error::Command(cmd) => cmd,
        other => panic!("expected a command error, got {other:?}"),
    };
    assert_eq!(cmd.code, "zigbee_error");
    assert_eq!(cmd.radio.unwrap().code, "DELIVERY_FAILED");
    client.disconnect().await;
}

#[tokio::test]
async fn unanswered_command_times_out_and_is_forgotten() {
    let url = serve(|mut ws: Ws, _| async move {
        while next_frame(&mut ws).await.is_some() {}
    })
    .await;
    let client = connected(url, options(100)).await;

    let err = client.send_command(switch_on()).await.unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.connection_state(), ConnectionState::Listening);
    client.disconnect().await;
}

#[tokio::test]
async fn undecodable_result_fails_only_its_waiter() {
    let url = serve(|mut ws: Ws, _| async move {
        let frame = next_frame(&mut ws).await.unwrap();
        send_json(
            &mut ws,
            json!({
                "message_type": "result",
                "message_id": frame["message_id"],
                "command": "get_devices",
                "success": true,
                "devices": 17,
            }),
        )
        .await;
        echo_server(ws, 0).await;
    })
    .await;
    let client = connected(url, options(2_000)).await;

    let err = client.send_command(Command::GetDevices).await.unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err:?}");
    // The loop survived.
    client.send_command(switch_on()).await.unwrap();
    client.disconnect().await;
}

#[tokio::test]
async fn invalid_json_is_fatal_to_the_connection() {
    let url = serve(|mut ws: Ws, _| async move {
        let _ = next_frame(&mut ws).await;
        ws.send(WsMessage::Text("{not json".into())).await.unwrap();
        let _ = next_frame(&mut ws).await;
    })
    .await;
    let client = connected(url, options(2_000)).await;

    let err = client.send_command(switch_on()).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }), "{err:?}");
    assert!(matches!(
        client.closed().await,
        Err(TransportError::InvalidJson(_))
    ));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn binary_frame_ends_the_receive_loop() {
    let url = serve(|mut ws: Ws, _| async move {
        ws.send(WsMessage::Binary(vec![1, 2, 3].into())).await.unwrap();
        let _ = next_frame(&mut ws).await;
    })
    .await;
    let client = connected(url, options(2_000)).await;

    assert!(matches!(
        client.closed().await,
        Err(TransportError::UnexpectedFrame(_))
    ));
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::new(
        Url::parse(&format!("ws://{addr}")).unwrap(),
        ClientOptions::default(),
    );
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Connect(_))));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn listen_requires_connected_and_runs_once() {
    let url = serve(echo_server).await;
    let client = Client::new(url, ClientOptions::default());

    assert!(matches!(
        client.listen(),
        Err(Error::Transport(TransportError::NotConnected))
    ));
    client.connect().await.unwrap();
    client.listen().unwrap();
    assert!(matches!(client.listen(), Err(Error::AlreadyListening)));
    client.disconnect().await;
}

#[tokio::test]
async fn disconnect_fails_in_flight_requests_and_allows_reconnect() {
    let url = serve(|mut ws: Ws, n| async move {
        if n == 0 {
            // Swallow both commands, then hang until the client leaves.
            while next_frame(&mut ws).await.is_some() {}
        } else {
            echo_server(ws, n).await;
        }
    })
    .await;
    let client = connected(url, options(5_000)).await;

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.send_command(switch_on()).await }
    });
    let second = tokio::spawn({
        let client = client.clone();
        async move { client.send_command(Command::GetGroups).await }
    });
    while client.pending_requests() < 2 {
        tokio::task::yield_now().await;
    }

    client.disconnect().await;
    assert!(matches!(first.await.unwrap(), Err(Error::Cancelled { .. })));
    assert!(matches!(second.await.unwrap(), Err(Error::Cancelled { .. })));
    client.disconnect().await;

    client.connect().await.unwrap();
    client.listen().unwrap();
    client.send_command(switch_on()).await.unwrap();
    client.disconnect().await;
}

#[tokio::test]
async fn disconnect_abandons_a_pending_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                if let Ok(ws) = accept_async(tcp).await {
                    echo_server(ws, 0).await;
                }
            });
        }
    });
    let client = Client::new(
        Url::parse(&format!("ws://{addr}")).unwrap(),
        options(2_000),
    );

    let attempt = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.connection_state(), ConnectionState::Connecting);

    client.disconnect().await;
    let outcome = attempt.await.unwrap();
    assert!(
        matches!(outcome, Err(Error::Transport(TransportError::Connect(_)))),
        "{outcome:?}"
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // The client is reusable afterwards.
    client.connect().await.unwrap();
    client.listen().unwrap();
    client.send_command(switch_on()).await.unwrap();
    client.disconnect().await;
}

#[tokio::test]
async fn closed_tracks_the_current_connection_only() {
    let url = serve(|mut ws: Ws, n| async move {
        if n == 0 {
            ws.close(None).await.unwrap();
        } else {
            echo_server(ws, n).await;
        }
    })
    .await;
    let client = connected(url, options(2_000)).await;
    assert!(matches!(
        client.closed().await,
        Err(TransportError::Closed { .. })
    ));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    client.connect().await.unwrap();
    client.listen().unwrap();
    let still_open = tokio::time::timeout(Duration::from_millis(100), client.closed()).await;
    assert!(still_open.is_err(), "closed() reported the previous connection");

    client.disconnect().await;
    assert!(client.closed().await.is_ok());
}

#[tokio::test]
async fn fire_and_forget_does_not_confuse_later_requests() {
    let url = serve(echo_server).await;
    let client = connected(url, options(2_000)).await;

    let id = client.send_command_no_wait(Command::StopNetwork).unwrap();
    client.send_command(switch_on()).await.unwrap();
    assert_eq!(client.pending_requests(), 0);
    assert!(id < zhaws_api::MESSAGE_ID_MODULUS);
    client.disconnect().await;
}

#[tokio::test]
async fn invalid_command_is_rejected_before_sending() {
    let url = serve(echo_server).await;
    let client = connected(url, options(2_000)).await;

    let target = EntityTarget {
        unique_id: "switch_1".into(),
        platform: Platform::Switch,
        ieee: None,
        group_id: None,
    };
    let err = client
        .send_command(Command::SwitchTurnOn(EntityCommand::bare(target)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidCommand(_)));
    client.disconnect().await;
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn events_reach_typed_listeners_in_order_despite_failing_listener() {
    let url = serve(|mut ws: Ws, _| async move {
        for nwk in ["0x0001", "0x0002", "0x0003"] {
            send_json(
                &mut ws,
                json!({
                    "message_type": "event",
                    "event_type": "zha_gateway_message",
                    "event": "device_left",
                    "ieee": IEEE,
                    "nwk": nwk,
                }),
            )
            .await;
        }
        // Unknown events are dropped without ending the loop.
        send_json(
            &mut ws,
            json!({"message_type": "event", "event_type": "x", "event": "y"}),
        )
        .await;
        echo_server(ws, 0).await;
    })
    .await;

    let client = Client::new(url, options(2_000));
    client.connect().await.unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    client.on(|_: &DeviceLeftEvent| Err("listener failure".into()));
    let sink = Arc::clone(&seen);
    client.on(move |left: &DeviceLeftEvent| {
        sink.lock().unwrap().push(left.nwk.0);
        Ok(())
    });
    client.listen().unwrap();

    // A round trip after the events guarantees they were processed.
    client.send_command(switch_on()).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    client.disconnect().await;
}
