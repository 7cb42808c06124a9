#![allow(clippy::unwrap_used)]

// End-to-end tests: a real `Server` on 127.0.0.1 backed by a fake gateway
// with one plug, driven by the `zhaws-core` controller or a raw socket.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use zhaws_api::command::CreateGroupParams;
use zhaws_api::model::{EntityInfo, ExtendedDeviceInfo, GroupInfo, Ieee};
use zhaws_api::{Command, EntityTarget, Event, Url, codes};
use zhaws_core::{Controller, ControllerConfig, CoreError, EntityRef};
use zhaws_server::{Gateway, OperationError, PlatformEntity, Server, ServerConfig, ServerError};

const IEEE: &str = "aa:bb:cc:dd:ee:ff:00:01";
const WAIT: Duration = Duration::from_secs(2);

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn switch_json(on: bool) -> Value {
    json!({
        "platform": "switch",
        "unique_id": "switch_1",
        "class_name": "Switch",
        "device_ieee": IEEE,
        "endpoint_id": 1,
        "state": {"class_name": "Switch", "state": on, "available": true},
    })
}

fn state_changed(on: bool) -> Event {
    let mut fields = object(switch_json(on));
    fields.insert("event_type".into(), json!("entity"));
    fields.insert("event".into(), json!("state_changed"));
    Event::decode(fields).unwrap()
}

fn raw_zcl_report() -> Event {
    Event::decode(object(json!({
        "event_type": "raw_zcl_event",
        "event": "attribute_updated",
        "device_ieee": IEEE,
        "endpoint_id": 1,
        "cluster_id": 6,
        "attribute_id": 0,
        "value": true,
    })))
    .unwrap()
}

// ── Fake gateway ────────────────────────────────────────────────────

struct Plug {
    on: Arc<AtomicBool>,
    events: broadcast::Sender<Event>,
}

#[async_trait]
impl PlatformEntity for Plug {
    fn info(&self) -> EntityInfo {
        serde_json::from_value(switch_json(self.on.load(Ordering::SeqCst))).unwrap()
    }

    async fn execute(&self, command: &Command) -> Result<(), OperationError> {
        let on = match command {
            Command::SwitchTurnOn(_) => true,
            Command::SwitchTurnOff(_) => false,
            other => return Err(OperationError::failed(format!("plug cannot {}", other.kind()))),
        };
        self.on.store(on, Ordering::SeqCst);
        self.events.send(state_changed(on)).ok();
        Ok(())
    }
}

struct FakeGateway {
    on: Arc<AtomicBool>,
    groups: Mutex<BTreeMap<u16, GroupInfo>>,
    events: broadcast::Sender<Event>,
    network_started: AtomicBool,
}

impl FakeGateway {
    fn new() -> Self {
        Self {
            on: Arc::new(AtomicBool::new(false)),
            groups: Mutex::new(BTreeMap::new()),
            events: broadcast::channel(64).0,
            network_started: AtomicBool::new(false),
        }
    }

    fn ieee() -> Ieee {
        IEEE.parse().unwrap()
    }

    /// Wait until every session has taken the events sent so far.
    async fn drained(&self) {
        tokio::time::timeout(WAIT, async {
            while !self.events.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    fn devices(&self) -> BTreeMap<Ieee, ExtendedDeviceInfo> {
        let device: ExtendedDeviceInfo = serde_json::from_value(json!({
            "ieee": IEEE,
            "nwk": "0x1234",
            "manufacturer": "Acme",
            "model": "Plug",
            "name": "Acme Plug",
            "available": true,
            "on_network": true,
            "entities": {"switch,switch_1": switch_json(self.on.load(Ordering::SeqCst))},
        }))
        .unwrap();
        BTreeMap::from([(Self::ieee(), device)])
    }

    fn groups(&self) -> BTreeMap<u16, GroupInfo> {
        self.groups.lock().unwrap().clone()
    }

    fn entity(&self, target: &EntityTarget) -> Option<Arc<dyn PlatformEntity>> {
        if target.ieee != Some(Self::ieee()) || target.unique_id != "switch_1" {
            return None;
        }
        Some(Arc::new(Plug {
            on: Arc::clone(&self.on),
            events: self.events.clone(),
        }))
    }

    fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn start_network(&self) -> Result<(), OperationError> {
        self.network_started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_group(&self, params: CreateGroupParams) -> Result<GroupInfo, OperationError> {
        let group_id = params.group_id.unwrap_or(0x0002);
        let group: GroupInfo = serde_json::from_value(json!({
            "group_id": group_id,
            "name": params.group_name,
            "members": params.members,
        }))
        .map_err(|e| OperationError::failed(e.to_string()))?;
        self.groups.lock().unwrap().insert(group_id, group.clone());

        let added = Event::decode(object(json!({
            "event_type": "zha_gateway_message",
            "event": "group_added",
            "group_info": group,
        })))
        .unwrap();
        self.events.send(added).ok();
        Ok(group)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Running {
    url: Url,
    gateway: Arc<FakeGateway>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

async fn start(config: ServerConfig) -> Running {
    let gateway = Arc::new(FakeGateway::new());
    let server = Server::bind(config, gateway.clone()).await.unwrap();
    let url = Url::parse(&format!("ws://{}", server.local_addr())).unwrap();
    let shutdown = server.shutdown_token();
    let task = tokio::spawn(server.run());
    Running {
        url,
        gateway,
        shutdown,
        task,
    }
}

async fn start_local() -> Running {
    start(ServerConfig::new("127.0.0.1", 0)).await
}

async fn controller(running: &Running) -> Controller {
    let controller = Controller::new(ControllerConfig::new(running.url.clone()));
    controller.connect().await.unwrap();
    controller
}

type Raw = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn raw(running: &Running) -> Raw {
    connect_async(running.url.as_str()).await.unwrap().0
}

async fn send(ws: &mut Raw, text: String) {
    ws.send(WsMessage::Text(text.into())).await.unwrap();
}

/// Next text frame as an object, or `None` once the server closes.
async fn recv(ws: &mut Raw) -> Option<Map<String, Value>> {
    tokio::time::timeout(WAIT, async {
        while let Some(Ok(frame)) = ws.next().await {
            match frame {
                WsMessage::Text(text) => return Some(object(serde_json::from_str(text.as_str()).unwrap())),
                WsMessage::Close(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await
    .unwrap()
}

fn switch_ref() -> EntityRef {
    EntityRef::Device {
        ieee: FakeGateway::ieee(),
        unique_id: "switch_1".into(),
    }
}

// ── Through the controller ──────────────────────────────────────────

#[tokio::test]
async fn controller_mirrors_state_after_a_command() {
    let running = start_local().await;
    let controller = controller(&running).await;
    assert_eq!(controller.devices_snapshot().len(), 1);

    let mut devices = controller.device_stream();
    controller.entity(&switch_ref()).unwrap().turn_on().await.unwrap();

    tokio::time::timeout(WAIT, async {
        loop {
            let snapshot = devices.changed().await.unwrap();
            let state = &snapshot[0].entity_by_unique_id("switch_1").unwrap().state;
            if state.is_on() == Some(true) {
                break;
            }
        }
    })
    .await
    .unwrap();

    controller.disconnect().await;
    running.shutdown.cancel();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn entity_failures_reach_the_caller() {
    let running = start_local().await;
    let controller = controller(&running).await;

    let plug = controller.entity(&switch_ref()).unwrap();
    let err = plug.press().await.unwrap_err();
    assert!(matches!(err, CoreError::Unsupported { .. }), "{err:?}");

    let err = plug.refresh_state().await.unwrap_err();
    assert!(
        matches!(&err, CoreError::CommandFailed { code, .. } if code == codes::ENTITY_ACTION_FAILED),
        "{err:?}"
    );

    let stranger: Ieee = "aa:bb:cc:dd:ee:ff:00:09".parse().unwrap();
    let err = controller.remove_device(stranger).await.unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { ieee } if ieee == stranger), "{err:?}");

    controller.start_network().await.unwrap();
    assert!(running.gateway.network_started.load(Ordering::SeqCst));

    controller.disconnect().await;
    running.shutdown.cancel();
}

#[tokio::test]
async fn created_group_reaches_the_mirror() {
    let running = start_local().await;
    let controller = controller(&running).await;
    let mut groups = controller.group_stream();

    let group = controller.create_group("Kitchen", Vec::new(), Some(7)).await.unwrap();
    assert_eq!(group.group_id, 7);
    assert_eq!(group.name, "Kitchen");

    let snapshot = tokio::time::timeout(WAIT, groups.changed()).await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "Kitchen");

    controller.disconnect().await;
    running.shutdown.cancel();
}

// ── Raw socket ──────────────────────────────────────────────────────

#[tokio::test]
async fn events_flow_only_after_client_listen() {
    let running = start_local().await;
    let mut ws = raw(&running).await;

    running.gateway.events.send(state_changed(true)).ok();
    running.gateway.drained().await;

    send(&mut ws, json!({"message_type": "command", "message_id": 1, "command": "client_listen"}).to_string()).await;
    let reply = recv(&mut ws).await.unwrap();
    assert_eq!(reply["message_type"], json!("result"));
    assert_eq!(reply["message_id"], json!(1));
    assert_eq!(reply["success"], json!(true));

    // Raw ZCL reports need their own subscription.
    running.gateway.events.send(raw_zcl_report()).ok();
    running.gateway.events.send(state_changed(false)).ok();
    let event = recv(&mut ws).await.unwrap();
    assert_eq!(event["message_type"], json!("event"));
    assert_eq!(event["event"], json!("state_changed"));
    assert_eq!(event["state"]["state"], json!(false));

    send(&mut ws, json!({"message_type": "command", "message_id": 2, "command": "client_listen_raw_zcl"}).to_string()).await;
    assert_eq!(recv(&mut ws).await.unwrap()["message_id"], json!(2));
    running.gateway.events.send(raw_zcl_report()).ok();
    let event = recv(&mut ws).await.unwrap();
    assert_eq!(event["event_type"], json!("raw_zcl_event"));

    running.shutdown.cancel();
}

#[tokio::test]
async fn malformed_frames_do_not_end_the_session() {
    let running = start_local().await;
    let mut ws = raw(&running).await;

    send(&mut ws, "this is not json".to_owned()).await;
    send(&mut ws, json!({"message_type": "command", "message_id": 5, "command": "make_coffee"}).to_string()).await;
    let reply = recv(&mut ws).await.unwrap();
    assert_eq!(reply["message_id"], json!(5));
    assert_eq!(reply["success"], json!(false));
    assert_eq!(reply["error_code"], json!("unknown_command"));

    send(&mut ws, json!({"message_type": "command", "message_id": 6, "command": "remove_device"}).to_string()).await;
    let reply = recv(&mut ws).await.unwrap();
    assert_eq!(reply["message_id"], json!(6));
    assert_eq!(reply["error_code"], json!("invalid_command"));

    send(&mut ws, json!({"message_type": "command", "message_id": 7, "command": "get_devices"}).to_string()).await;
    let reply = recv(&mut ws).await.unwrap();
    assert_eq!(reply["message_id"], json!(7));
    assert_eq!(reply["success"], json!(true));
    assert!(reply["devices"].get(IEEE).is_some());

    running.shutdown.cancel();
}

#[tokio::test]
async fn client_disconnect_closes_after_replying() {
    let running = start_local().await;
    let mut ws = raw(&running).await;

    send(&mut ws, json!({"message_type": "command", "message_id": 1, "command": "client_disconnect"}).to_string()).await;
    let reply = recv(&mut ws).await.unwrap();
    assert_eq!(reply["command"], json!("client_disconnect"));
    assert_eq!(reply["success"], json!(true));
    assert!(recv(&mut ws).await.is_none());

    // The server itself keeps running.
    let mut other = raw(&running).await;
    send(&mut other, json!({"message_type": "command", "message_id": 1, "command": "get_groups"}).to_string()).await;
    assert_eq!(recv(&mut other).await.unwrap()["success"], json!(true));
    running.shutdown.cancel();
}

#[tokio::test]
async fn stop_server_replies_then_stops() {
    let running = start_local().await;
    let mut ws = raw(&running).await;

    send(&mut ws, json!({"message_type": "command", "message_id": 9, "command": "stop_server"}).to_string()).await;
    let reply = recv(&mut ws).await.unwrap();
    assert_eq!(reply["message_id"], json!(9));
    assert_eq!(reply["success"], json!(true));

    tokio::time::timeout(WAIT, running.task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn network_auto_start_runs_before_serving() {
    let config = ServerConfig::new("127.0.0.1", 0).with_network_auto_start(true);
    let running = start(config).await;
    let mut ws = raw(&running).await;

    send(&mut ws, json!({"message_type": "command", "message_id": 1, "command": "get_devices"}).to_string()).await;
    recv(&mut ws).await.unwrap();
    assert!(running.gateway.network_started.load(Ordering::SeqCst));
    running.shutdown.cancel();
}
