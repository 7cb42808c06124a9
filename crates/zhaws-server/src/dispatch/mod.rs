// ── Command dispatcher ──
//
// One handler per command kind. `dispatch` validates the command, resolves
// an entity command's target before any handler runs, and turns every
// failure (including a panicking handler) into a failed result.

mod handlers;

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use zhaws_api::codes;
use zhaws_api::response::{CommandResponse, ErrorDetail, ResponsePayload};
use zhaws_api::{Command, CommandKind, CommandMessage};

use crate::error::{OperationError, ServerError};
use crate::gateway::{Gateway, PlatformEntity};

/// What a handler produces: a success payload or the operation's failure.
pub type HandlerResult = Result<ResponsePayload, OperationError>;

type BoxedHandler =
    Arc<dyn Fn(HandlerContext, Command) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Everything a handler may touch while running one command.
#[derive(Clone)]
pub struct HandlerContext {
    pub gateway: Arc<dyn Gateway>,
    entity: Option<Arc<dyn PlatformEntity>>,
}

impl HandlerContext {
    /// The resolved target of an entity command.
    pub fn entity(&self) -> Result<&Arc<dyn PlatformEntity>, OperationError> {
        self.entity
            .as_ref()
            .ok_or_else(|| OperationError::Invalid("command does not address an entity".into()))
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("has_entity", &self.entity.is_some())
            .finish_non_exhaustive()
    }
}

/// Registry mapping each command kind to its handler.
///
/// Session commands (`client_listen`, `client_listen_raw_zcl`,
/// `client_disconnect`, `stop_server`) act on the connection itself and are
/// handled by the session, never routed here.
pub struct CommandDispatcher {
    handlers: HashMap<CommandKind, BoxedHandler>,
}

impl CommandDispatcher {
    /// An empty dispatcher. Every command is `unknown_command` until
    /// registered.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A dispatcher with a handler for every network, device, group and
    /// entity command, each forwarding to the [`Gateway`] or the resolved
    /// [`PlatformEntity`].
    pub fn with_default_handlers() -> Self {
        let mut dispatcher = Self::new();
        handlers::install(&mut dispatcher);
        dispatcher
    }

    /// Register the handler for `kind`. A kind takes exactly one handler.
    pub fn register<F, Fut>(&mut self, kind: CommandKind, handler: F) -> Result<(), ServerError>
    where
        F: Fn(HandlerContext, Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.handlers.contains_key(&kind) {
            return Err(ServerError::DuplicateHandler(kind));
        }
        self.insert(kind, handler);
        Ok(())
    }

    /// Replace whatever handler `kind` has. Returns whether one existed.
    pub fn replace<F, Fut>(&mut self, kind: CommandKind, handler: F) -> bool
    where
        F: Fn(HandlerContext, Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert(kind, handler).is_some()
    }

    pub fn handles(&self, kind: CommandKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    fn insert<F, Fut>(&mut self, kind: CommandKind, handler: F) -> Option<BoxedHandler>
    where
        F: Fn(HandlerContext, Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let boxed: BoxedHandler = Arc::new(move |ctx, command| handler(ctx, command).boxed());
        self.handlers.insert(kind, boxed)
    }

    /// Run one command and build its result. Never fails: every error
    /// becomes a `success: false` result echoing the command's id.
    pub async fn dispatch(&self, gateway: &Arc<dyn Gateway>, message: CommandMessage) -> CommandResponse {
        let CommandMessage {
            message_id,
            command,
        } = message;
        let kind = command.kind();
        match self.run(gateway, command).await {
            Ok(payload) => {
                debug!(message_id, command = %kind, "command succeeded");
                CommandResponse::success(message_id, kind, payload)
            }
            Err(detail) => {
                debug!(
                    message_id,
                    command = %kind,
                    code = %detail.code,
                    error = %detail.message,
                    "command failed"
                );
                CommandResponse::failure(message_id, kind, detail)
            }
        }
    }

    async fn run(&self, gateway: &Arc<dyn Gateway>, command: Command) -> Result<ResponsePayload, ErrorDetail> {
        let kind = command.kind();
        command
            .validate()
            .map_err(|message| ErrorDetail::new(codes::INVALID_COMMAND, message))?;

        let handler = self.handlers.get(&kind).ok_or_else(|| {
            ErrorDetail::new(codes::UNKNOWN_COMMAND, format!("No handler for {kind}"))
        })?;

        let entity = match command.target() {
            Some(target) => Some(gateway.entity(target).ok_or_else(|| {
                ErrorDetail::new(
                    codes::ENTITY_NOT_FOUND,
                    format!("platform entity {} not found", target.unique_id),
                )
            })?),
            None => None,
        };

        let ctx = HandlerContext {
            gateway: Arc::clone(gateway),
            entity,
        };
        let invocation = async move { handler(ctx, command).await };
        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(err)) => Err(error_detail(kind, err)),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(command = %kind, reason = %reason, "command handler panicked");
                Err(ErrorDetail::new(codes::INTERNAL_ERROR, reason))
            }
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        f.debug_struct("CommandDispatcher")
            .field("handlers", &kinds)
            .finish()
    }
}

fn error_detail(kind: CommandKind, err: OperationError) -> ErrorDetail {
    let message = err.to_string();
    match err {
        OperationError::Radio {
            code,
            message: radio_message,
        } => {
            warn!(command = %kind, code = %code, "radio operation failed");
            ErrorDetail::radio(code, radio_message)
        }
        OperationError::DeviceNotFound(_) => ErrorDetail::new(codes::DEVICE_NOT_FOUND, message),
        OperationError::GroupNotFound(_) => ErrorDetail::new(codes::GROUP_NOT_FOUND, message),
        OperationError::Invalid(_) => ErrorDetail::new(codes::INVALID_COMMAND, message),
        OperationError::Unsupported(_) => ErrorDetail::new(codes::UNKNOWN_COMMAND, message),
        OperationError::Failed(_) if kind.is_entity_command() => {
            ErrorDetail::new(codes::ENTITY_ACTION_FAILED, message)
        }
        OperationError::Failed(_) => ErrorDetail::new(codes::INTERNAL_ERROR, message),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::broadcast;
    use zhaws_api::command::{DeviceTarget, EntityCommand};
    use zhaws_api::model::{EntityInfo, ExtendedDeviceInfo, GroupInfo, Ieee, Platform};
    use zhaws_api::{EntityTarget, Event};

    use super::*;

    const IEEE: &str = "aa:bb:cc:dd:ee:ff:00:01";

    struct Plug {
        calls: AtomicUsize,
        fail_with: Option<OperationError>,
    }

    #[async_trait]
    impl PlatformEntity for Plug {
        fn info(&self) -> EntityInfo {
            serde_json::from_value(json!({
                "platform": "switch",
                "unique_id": "switch_1",
                "class_name": "Switch",
                "device_ieee": IEEE,
                "endpoint_id": 1,
                "state": {"class_name": "Switch", "state": false},
            }))
            .unwrap()
        }

        async fn execute(&self, _command: &Command) -> Result<(), OperationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    struct OnePlug {
        plug: Arc<Plug>,
        events: broadcast::Sender<Event>,
    }

    #[async_trait]
    impl Gateway for OnePlug {
        fn devices(&self) -> BTreeMap<Ieee, ExtendedDeviceInfo> {
            BTreeMap::new()
        }

        fn groups(&self) -> BTreeMap<u16, GroupInfo> {
            BTreeMap::new()
        }

        fn entity(&self, target: &EntityTarget) -> Option<Arc<dyn PlatformEntity>> {
            (target.unique_id == "switch_1").then(|| Arc::clone(&self.plug) as Arc<dyn PlatformEntity>)
        }

        fn events(&self) -> broadcast::Receiver<Event> {
            self.events.subscribe()
        }
    }

    fn gateway(fail_with: Option<OperationError>) -> (Arc<dyn Gateway>, Arc<Plug>) {
        let plug = Arc::new(Plug {
            calls: AtomicUsize::new(0),
            fail_with,
        });
        let gateway = OnePlug {
            plug: Arc::clone(&plug),
            events: broadcast::channel(4).0,
        };
        (Arc::new(gateway), plug)
    }

    fn switch_on(unique_id: &str) -> CommandMessage {
        let target = EntityTarget::device(IEEE.parse().unwrap(), Platform::Switch, unique_id);
        CommandMessage {
            message_id: 7,
            command: Command::SwitchTurnOn(EntityCommand::bare(target)),
        }
    }

    fn explode() -> HandlerResult {
        panic!("boom")
    }

    fn error_code(response: &CommandResponse) -> &str {
        &response.outcome.as_ref().unwrap_err().code
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut dispatcher = CommandDispatcher::with_default_handlers();
        let err = dispatcher
            .register(CommandKind::GetDevices, |_, _| async { Ok(ResponsePayload::Empty) })
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateHandler(CommandKind::GetDevices)));
        assert!(dispatcher.replace(CommandKind::GetDevices, |_, _| async {
            Ok(ResponsePayload::Empty)
        }));
    }

    #[test]
    fn session_commands_are_not_dispatched() {
        let dispatcher = CommandDispatcher::with_default_handlers();
        assert!(dispatcher.handles(CommandKind::SwitchTurnOn));
        assert!(dispatcher.handles(CommandKind::GetGroups));
        assert!(!dispatcher.handles(CommandKind::ClientListen));
        assert!(!dispatcher.handles(CommandKind::StopServer));
    }

    #[tokio::test]
    async fn entity_command_runs_against_the_resolved_entity() {
        let (gateway, plug) = gateway(None);
        let dispatcher = CommandDispatcher::with_default_handlers();
        let response = dispatcher.dispatch(&gateway, switch_on("switch_1")).await;
        assert_eq!(response, CommandResponse::success(7, CommandKind::SwitchTurnOn, ResponsePayload::Empty));
        assert_eq!(plug.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_target_skips_the_handler() {
        let (gateway, plug) = gateway(None);
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        let mut dispatcher = CommandDispatcher::new();
        dispatcher
            .register(CommandKind::SwitchTurnOn, move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(ResponsePayload::Empty) }
            })
            .unwrap();

        let response = dispatcher.dispatch(&gateway, switch_on("switch_9")).await;
        assert_eq!(response.message_id, 7);
        assert_eq!(error_code(&response), codes::ENTITY_NOT_FOUND);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(plug.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn entity_failure_becomes_action_error() {
        let (gateway, _) = gateway(Some(OperationError::failed("relay stuck")));
        let response = CommandDispatcher::with_default_handlers()
            .dispatch(&gateway, switch_on("switch_1"))
            .await;
        let detail = response.outcome.unwrap_err();
        assert_eq!(detail.code, codes::ENTITY_ACTION_FAILED);
        assert_eq!(detail.message, "relay stuck");
    }

    #[tokio::test]
    async fn radio_failure_keeps_its_own_code() {
        let (gateway, _) = gateway(Some(OperationError::radio("DELIVERY_FAILED", "no route")));
        let response = CommandDispatcher::with_default_handlers()
            .dispatch(&gateway, switch_on("switch_1"))
            .await;
        let detail = response.outcome.unwrap_err();
        assert_eq!(detail.code, codes::RADIO);
        let radio = detail.radio.unwrap();
        assert_eq!(radio.code, "DELIVERY_FAILED");
        assert_eq!(radio.message.as_deref(), Some("no route"));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_internal_error() {
        let (gateway, _) = gateway(None);
        let mut dispatcher = CommandDispatcher::new();
        dispatcher
            .register(CommandKind::GetDevices, |_, _| async { explode() })
            .unwrap();
        let message = CommandMessage {
            message_id: 3,
            command: Command::GetDevices,
        };
        let response = dispatcher.dispatch(&gateway, message).await;
        let detail = response.outcome.unwrap_err();
        assert_eq!(detail.code, codes::INTERNAL_ERROR);
        assert_eq!(detail.message, "boom");

        // The dispatcher is still usable afterwards.
        let response = dispatcher.dispatch(&gateway, switch_on("switch_1")).await;
        assert_eq!(error_code(&response), codes::UNKNOWN_COMMAND);
    }

    #[tokio::test]
    async fn invalid_parameters_are_rejected_before_lookup() {
        let (gateway, _) = gateway(None);
        let target = EntityTarget::device(IEEE.parse().unwrap(), Platform::Cover, "cover_1");
        let message = CommandMessage {
            message_id: 4,
            command: Command::CoverSetPosition(EntityCommand::new(
                target,
                zhaws_api::command::CoverPositionParams { position: 140 },
            )),
        };
        let response = CommandDispatcher::with_default_handlers()
            .dispatch(&gateway, message)
            .await;
        assert_eq!(error_code(&response), codes::INVALID_COMMAND);
    }

    #[tokio::test]
    async fn unsupported_gateway_operation_is_unknown_command() {
        let (gateway, _) = gateway(None);
        let message = CommandMessage {
            message_id: 5,
            command: Command::StartNetwork,
        };
        let response = CommandDispatcher::with_default_handlers()
            .dispatch(&gateway, message)
            .await;
        assert_eq!(error_code(&response), codes::UNKNOWN_COMMAND);
    }

    #[tokio::test]
    async fn unknown_device_is_device_not_found() {
        let (gateway, _) = gateway(None);
        let message = CommandMessage {
            message_id: 6,
            command: Command::RemoveDevice(DeviceTarget {
                ieee: IEEE.parse().unwrap(),
            }),
        };
        let response = CommandDispatcher::with_default_handlers()
            .dispatch(&gateway, message)
            .await;
        assert_eq!(error_code(&response), codes::DEVICE_NOT_FOUND);
    }
}
