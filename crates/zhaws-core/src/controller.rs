// ── Controller ──
//
// Central facade for one server: owns the protocol client and the mirror
// store, wires gateway events into the mirror, and exposes every device,
// group and network operation as a typed async method.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zhaws_api::command::{
    CreateGroupParams, DeviceTarget, GroupMembersParams, PermitJoiningParams,
    ReadClusterAttributesParams, RemoveGroupsParams, WriteClusterAttributeParams,
};
use zhaws_api::event::EntityStateChangedEvent;
use zhaws_api::model::{EntityInfo, EntityRef, GroupInfo, GroupMemberReference, Ieee};
use zhaws_api::response::{ReadClusterAttributesResult, WriteClusterAttributeResult};
use zhaws_api::{
    Client, Command, CommandKind, Event, EventPayload, ListenerId, ListenerResult,
    ResponsePayload,
};

use crate::config::ControllerConfig;
use crate::entity::EntityHandle;
use crate::error::CoreError;
use crate::model::{DeviceMirror, GroupMirror};
use crate::store::MirrorStore;
use crate::stream::{EntityStateStream, MirrorStream};

pub use zhaws_api::ConnectionState;

// ── Controller ───────────────────────────────────────────────────────

/// Client gateway to one ZHA WebSocket server.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. All command methods go
/// to the server; the mirror only ever changes in response to events and
/// bulk loads.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    client: Client,
    store: Arc<MirrorStore>,
    /// Catch-all listener feeding the mirror; registered once.
    mirror_listener: Mutex<Option<ListenerId>>,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let client = Client::new(config.url.clone(), config.client_options());
        Self {
            inner: Arc::new(ControllerInner {
                config,
                client,
                store: Arc::new(MirrorStore::new()),
                mirror_listener: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// The underlying protocol client, for raw commands and listeners.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect, start listening, and load the mirror from scratch.
    ///
    /// A no-op on a live connection. On any failure after the socket
    /// opened, the connection is torn down again before the error is
    /// returned.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.connection_state().is_connected() {
            debug!("already connected");
            return Ok(());
        }
        let url = self.inner.config.url.to_string();
        self.inner.client.connect().await.map_err(|e| match CoreError::from(e) {
            CoreError::ConnectionFailed { reason, .. } => CoreError::ConnectionFailed {
                url: url.clone(),
                reason,
            },
            other => other,
        })?;

        // Whatever survived the previous connection is stale.
        self.inner.store.clear();
        self.attach_mirror();
        match self.inner.client.listen() {
            Ok(()) => {}
            // A concurrent connect() owns session setup.
            Err(zhaws_api::Error::AlreadyListening) => return Ok(()),
            Err(e) => {
                self.disconnect().await;
                return Err(e.into());
            }
        }
        if let Err(e) = self.start_session().await {
            warn!(error = %e, "session setup failed; disconnecting");
            self.disconnect().await;
            return Err(e);
        }
        self.discard_mirror_on_close();

        info!(
            %url,
            devices = self.inner.store.device_count(),
            groups = self.inner.store.group_count(),
            "connected"
        );
        Ok(())
    }

    async fn start_session(&self) -> Result<(), CoreError> {
        self.execute(Command::ClientListen).await?;
        self.load_devices().await?;
        self.load_groups().await?;
        Ok(())
    }

    fn attach_mirror(&self) {
        let mut slot = self
            .inner
            .mirror_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            let store = Arc::clone(&self.inner.store);
            *slot = Some(self.inner.client.on_any(move |event: &Event| {
                store.apply_event(event);
                Ok(())
            }));
        }
    }

    /// Clear the mirror once the connection ends, however it ends.
    fn discard_mirror_on_close(&self) {
        let client = self.inner.client.clone();
        let store = Arc::clone(&self.inner.store);
        tokio::spawn(async move {
            if let Err(error) = client.closed().await {
                debug!(%error, "connection ended");
            }
            if client.connection_state() == ConnectionState::Disconnected {
                store.clear();
                debug!("mirror discarded");
            }
        });
    }

    /// Close the connection and clear the mirror.
    pub async fn disconnect(&self) {
        self.inner.client.disconnect().await;
        self.inner.store.clear();
        debug!("disconnected; mirror cleared");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.client.connection_state()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.client.subscribe_state()
    }

    /// Wait until the connection ends on its own.
    pub async fn closed(&self) -> Result<(), CoreError> {
        self.inner.client.closed().await.map_err(|e| CoreError::Disconnected {
            reason: e.to_string(),
        })
    }

    // ── Command execution ────────────────────────────────────────────

    /// Send any command and await its typed result.
    pub async fn execute(&self, command: Command) -> Result<ResponsePayload, CoreError> {
        debug!(command = %command.kind(), "executing command");
        Ok(self.inner.client.send_command(command).await?)
    }

    async fn execute_unit(&self, command: Command) -> Result<(), CoreError> {
        self.execute(command).await.map(|_| ())
    }

    // ── Mirror loads ─────────────────────────────────────────────────

    /// Fetch every device and merge it into the mirror. Returns how many
    /// devices were new.
    pub async fn load_devices(&self) -> Result<usize, CoreError> {
        match self.execute(Command::GetDevices).await? {
            ResponsePayload::Devices(devices) => Ok(self.inner.store.merge_devices(devices)),
            _ => Err(unexpected(CommandKind::GetDevices)),
        }
    }

    /// Fetch every group and merge it into the mirror.
    pub async fn load_groups(&self) -> Result<usize, CoreError> {
        match self.execute(Command::GetGroups).await? {
            ResponsePayload::Groups(groups) => Ok(self.inner.store.merge_groups(groups)),
            _ => Err(unexpected(CommandKind::GetGroups)),
        }
    }

    // ── Network operations ───────────────────────────────────────────

    /// Open the network for joining. Returns the duration the server
    /// applied.
    pub async fn permit_joining(&self, duration: u8, ieee: Option<Ieee>) -> Result<u8, CoreError> {
        let params = PermitJoiningParams { duration, ieee };
        match self.execute(Command::PermitJoining(params)).await? {
            ResponsePayload::PermitJoining { duration: applied, .. } => {
                Ok(applied.unwrap_or(duration))
            }
            ResponsePayload::Empty => Ok(duration),
            _ => Err(unexpected(CommandKind::PermitJoining)),
        }
    }

    pub async fn start_network(&self) -> Result<(), CoreError> {
        self.execute_unit(Command::StartNetwork).await
    }

    pub async fn stop_network(&self) -> Result<(), CoreError> {
        self.execute_unit(Command::StopNetwork).await
    }

    pub async fn update_topology(&self) -> Result<(), CoreError> {
        self.execute_unit(Command::UpdateNetworkTopology).await
    }

    pub async fn application_state(&self) -> Result<Map<String, Value>, CoreError> {
        match self.execute(Command::GetApplicationState).await? {
            ResponsePayload::ApplicationState(state) => Ok(state),
            _ => Err(unexpected(CommandKind::GetApplicationState)),
        }
    }

    /// Ask the server to shut down.
    pub async fn stop_server(&self) -> Result<(), CoreError> {
        self.execute_unit(Command::StopServer).await
    }

    /// Additionally receive raw ZCL attribute reports.
    pub async fn listen_raw_zcl(&self) -> Result<(), CoreError> {
        self.execute_unit(Command::ClientListenRawZcl).await
    }

    // ── Device operations ────────────────────────────────────────────

    pub async fn remove_device(&self, ieee: Ieee) -> Result<(), CoreError> {
        self.execute_unit(Command::RemoveDevice(DeviceTarget { ieee }))
            .await
            .map_err(|e| device_not_found(e, ieee))
    }

    pub async fn reconfigure_device(&self, ieee: Ieee) -> Result<(), CoreError> {
        self.execute_unit(Command::ReconfigureDevice(DeviceTarget { ieee }))
            .await
            .map_err(|e| device_not_found(e, ieee))
    }

    pub async fn read_cluster_attributes(
        &self,
        params: ReadClusterAttributesParams,
    ) -> Result<ReadClusterAttributesResult, CoreError> {
        let ieee = params.ieee;
        match self
            .execute(Command::ReadClusterAttributes(params))
            .await
            .map_err(|e| device_not_found(e, ieee))?
        {
            ResponsePayload::ClusterAttributes(result) => Ok(*result),
            _ => Err(unexpected(CommandKind::ReadClusterAttributes)),
        }
    }

    pub async fn write_cluster_attribute(
        &self,
        params: WriteClusterAttributeParams,
    ) -> Result<WriteClusterAttributeResult, CoreError> {
        let ieee = params.ieee;
        match self
            .execute(Command::WriteClusterAttribute(params))
            .await
            .map_err(|e| device_not_found(e, ieee))?
        {
            ResponsePayload::AttributeWrite(result) => Ok(*result),
            _ => Err(unexpected(CommandKind::WriteClusterAttribute)),
        }
    }

    // ── Group operations ─────────────────────────────────────────────

    pub async fn create_group(
        &self,
        name: impl Into<String>,
        members: Vec<GroupMemberReference>,
        group_id: Option<u16>,
    ) -> Result<GroupInfo, CoreError> {
        let params = CreateGroupParams {
            group_name: name.into(),
            members,
            group_id,
        };
        match self.execute(Command::CreateGroup(params)).await? {
            ResponsePayload::Group(group) => Ok(*group),
            _ => Err(unexpected(CommandKind::CreateGroup)),
        }
    }

    /// Remove groups. Returns the groups that remain.
    pub async fn remove_groups(&self, group_ids: Vec<u16>) -> Result<BTreeMap<u16, GroupInfo>, CoreError> {
        match self
            .execute(Command::RemoveGroups(RemoveGroupsParams { group_ids }))
            .await?
        {
            ResponsePayload::Groups(groups) => Ok(groups),
            _ => Err(unexpected(CommandKind::RemoveGroups)),
        }
    }

    pub async fn add_group_members(
        &self,
        group_id: u16,
        members: Vec<GroupMemberReference>,
    ) -> Result<GroupInfo, CoreError> {
        let params = GroupMembersParams { group_id, members };
        match self
            .execute(Command::AddGroupMembers(params))
            .await
            .map_err(|e| group_not_found(e, group_id))?
        {
            ResponsePayload::Group(group) => Ok(*group),
            _ => Err(unexpected(CommandKind::AddGroupMembers)),
        }
    }

    pub async fn remove_group_members(
        &self,
        group_id: u16,
        members: Vec<GroupMemberReference>,
    ) -> Result<GroupInfo, CoreError> {
        let params = GroupMembersParams { group_id, members };
        match self
            .execute(Command::RemoveGroupMembers(params))
            .await
            .map_err(|e| group_not_found(e, group_id))?
        {
            ResponsePayload::Group(group) => Ok(*group),
            _ => Err(unexpected(CommandKind::RemoveGroupMembers)),
        }
    }

    // ── Entities ─────────────────────────────────────────────────────

    /// A command handle for one mirrored entity.
    pub fn entity(&self, target: &EntityRef) -> Result<EntityHandle, CoreError> {
        let info = self
            .inner
            .store
            .entity(target)
            .ok_or_else(|| CoreError::EntityNotFound {
                entity: target.to_string(),
            })?;
        Ok(EntityHandle::new(self.clone(), info))
    }

    /// Entities hosted on the member endpoints of a group.
    pub fn group_member_entities(&self, group_id: u16) -> Result<Vec<EntityInfo>, CoreError> {
        self.inner
            .store
            .group_member_entities(group_id)
            .ok_or(CoreError::GroupNotFound { group_id })
    }

    /// Subscribe to state changes of one entity, as applied to the mirror.
    pub fn on_entity_state<F>(&self, entity: EntityRef, listener: F) -> ListenerId
    where
        F: Fn(&EntityStateChangedEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.store.on_entity_state(entity, listener)
    }

    pub fn off_entity_state(&self, id: ListenerId) -> bool {
        self.inner.store.off_entity_state(id)
    }

    // ── Raw events ───────────────────────────────────────────────────

    /// Subscribe to one gateway event kind.
    pub fn on<E, F>(&self, listener: F) -> ListenerId
    where
        E: EventPayload,
        F: Fn(&E) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.client.on::<E, F>(listener)
    }

    /// Subscribe to every gateway event.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.client.on_any(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.client.off(id)
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceMirror>>> {
        self.inner.store.devices_snapshot()
    }

    pub fn groups_snapshot(&self) -> Arc<Vec<Arc<GroupMirror>>> {
        self.inner.store.groups_snapshot()
    }

    pub fn device(&self, ieee: &Ieee) -> Option<Arc<DeviceMirror>> {
        self.inner.store.device(ieee)
    }

    pub fn group(&self, group_id: u16) -> Option<Arc<GroupMirror>> {
        self.inner.store.group(group_id)
    }

    // ── Streams ──────────────────────────────────────────────────────

    pub fn device_stream(&self) -> MirrorStream<DeviceMirror> {
        self.inner.store.subscribe_devices()
    }

    pub fn group_stream(&self) -> MirrorStream<GroupMirror> {
        self.inner.store.subscribe_groups()
    }

    /// Stream of states the mirror applies to `entity`.
    pub fn entity_state_stream(&self, entity: EntityRef) -> EntityStateStream {
        self.inner.store.watch_entity(entity)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn unexpected(kind: CommandKind) -> CoreError {
    CoreError::UnexpectedPayload {
        command: kind.to_string(),
    }
}

fn device_not_found(err: CoreError, ieee: Ieee) -> CoreError {
    match err {
        CoreError::CommandFailed { ref code, .. } if code == zhaws_api::codes::DEVICE_NOT_FOUND => {
            CoreError::DeviceNotFound { ieee }
        }
        other => other,
    }
}

fn group_not_found(err: CoreError, group_id: u16) -> CoreError {
    match err {
        CoreError::CommandFailed { ref code, .. } if code == zhaws_api::codes::GROUP_NOT_FOUND => {
            CoreError::GroupNotFound { group_id }
        }
        other => other,
    }
}
