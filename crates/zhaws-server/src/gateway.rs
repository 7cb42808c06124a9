// ── Gateway collaborators ──
//
// The radio network and the per-device entity layer live outside this
// crate. The server only needs their shapes: snapshots of devices and
// groups, entity lookup, network operations, and a feed of events.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use zhaws_api::command::{
    CreateGroupParams, ReadClusterAttributesParams, WriteClusterAttributeParams,
};
use zhaws_api::model::{EntityInfo, ExtendedDeviceInfo, GroupInfo, GroupMemberReference, Ieee};
use zhaws_api::response::{ReadClusterAttributesResult, WriteClusterAttributeResult};
use zhaws_api::{Command, EntityTarget, Event};

use crate::error::OperationError;

/// One live entity: a state snapshot plus the actions it can run.
#[async_trait]
pub trait PlatformEntity: Send + Sync {
    fn info(&self) -> EntityInfo;

    /// Run an entity command addressed to this entity. Any state change
    /// it causes is reported through the gateway's event feed, not here.
    async fn execute(&self, command: &Command) -> Result<(), OperationError>;
}

/// The live radio network the server exposes.
///
/// Network and group operations default to `Unsupported` so a gateway
/// only implements what its hardware can do.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    fn devices(&self) -> BTreeMap<Ieee, ExtendedDeviceInfo>;

    fn groups(&self) -> BTreeMap<u16, GroupInfo>;

    /// Resolve the addressing block of an entity command.
    fn entity(&self, target: &EntityTarget) -> Option<Arc<dyn PlatformEntity>>;

    /// Subscribe to gateway events. Every session holds its own receiver.
    fn events(&self) -> broadcast::Receiver<Event>;

    // ── Network ──────────────────────────────────────────────────────

    async fn permit_joining(&self, _duration: u8, _ieee: Option<Ieee>) -> Result<(), OperationError> {
        Err(OperationError::Unsupported("permit_joining"))
    }

    async fn start_network(&self) -> Result<(), OperationError> {
        Err(OperationError::Unsupported("start_network"))
    }

    async fn stop_network(&self) -> Result<(), OperationError> {
        Err(OperationError::Unsupported("stop_network"))
    }

    async fn update_topology(&self) -> Result<(), OperationError> {
        Err(OperationError::Unsupported("update_network_topology"))
    }

    async fn application_state(&self) -> Result<Map<String, Value>, OperationError> {
        Ok(Map::new())
    }

    // ── Devices ──────────────────────────────────────────────────────

    async fn remove_device(&self, _ieee: Ieee) -> Result<(), OperationError> {
        Err(OperationError::Unsupported("remove_device"))
    }

    async fn reconfigure_device(&self, _ieee: Ieee) -> Result<(), OperationError> {
        Err(OperationError::Unsupported("reconfigure_device"))
    }

    async fn read_cluster_attributes(
        &self,
        _params: ReadClusterAttributesParams,
    ) -> Result<ReadClusterAttributesResult, OperationError> {
        Err(OperationError::Unsupported("read_cluster_attributes"))
    }

    async fn write_cluster_attribute(
        &self,
        _params: WriteClusterAttributeParams,
    ) -> Result<WriteClusterAttributeResult, OperationError> {
        Err(OperationError::Unsupported("write_cluster_attribute"))
    }

    // ── Groups ───────────────────────────────────────────────────────

    async fn create_group(&self, _params: CreateGroupParams) -> Result<GroupInfo, OperationError> {
        Err(OperationError::Unsupported("create_group"))
    }

    async fn remove_groups(&self, _group_ids: &[u16]) -> Result<(), OperationError> {
        Err(OperationError::Unsupported("remove_groups"))
    }

    async fn add_group_members(
        &self,
        _group_id: u16,
        _members: &[GroupMemberReference],
    ) -> Result<GroupInfo, OperationError> {
        Err(OperationError::Unsupported("add_group_members"))
    }

    async fn remove_group_members(
        &self,
        _group_id: u16,
        _members: &[GroupMemberReference],
    ) -> Result<GroupInfo, OperationError> {
        Err(OperationError::Unsupported("remove_group_members"))
    }
}
