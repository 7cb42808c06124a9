// ── Client-side state mirror ──
//
// Devices and groups known to the server, kept current by bulk loads and
// by gateway events. Reads are wait-free snapshots; mutations are
// broadcast to subscribers via `watch` channels.

use std::collections::BTreeMap;
use std::sync::Arc;

use zhaws_api::event::EntityStateChangedEvent;
use zhaws_api::model::{EntityInfo, EntityOwner, EntityRef, ExtendedDeviceInfo, GroupInfo, Ieee};
use zhaws_api::{EventDispatcher, ListenerId, ListenerResult};

use super::collection::EntityCollection;
use crate::model::{DeviceMirror, GroupMirror};
use crate::stream::{EntityStateStream, MirrorStream};

/// Reactive store for mirrored devices and groups.
pub struct MirrorStore {
    pub(crate) devices: EntityCollection<Ieee, DeviceMirror>,
    pub(crate) groups: EntityCollection<u16, GroupMirror>,
    pub(crate) entity_listeners: EventDispatcher<EntityRef, EntityStateChangedEvent>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self {
            devices: EntityCollection::new(),
            groups: EntityCollection::new(),
            entity_listeners: EventDispatcher::new(),
        }
    }

    // ── Bulk loads ───────────────────────────────────────────────────

    /// Upsert every device from a `get_devices` snapshot. Devices missing
    /// from the snapshot are kept; removal is event-driven only.
    ///
    /// Returns how many devices were new.
    pub fn merge_devices(&self, devices: BTreeMap<Ieee, ExtendedDeviceInfo>) -> usize {
        devices
            .into_values()
            .map(|info| {
                let device = DeviceMirror::from(info);
                self.devices.upsert(device.ieee, device)
            })
            .filter(|is_new| *is_new)
            .count()
    }

    /// Upsert every group from a `get_groups` snapshot. Never removes.
    pub fn merge_groups(&self, groups: BTreeMap<u16, GroupInfo>) -> usize {
        groups
            .into_values()
            .map(|info| {
                let group = GroupMirror::from(info);
                self.groups.upsert(group.group_id, group)
            })
            .filter(|is_new| *is_new)
            .count()
    }

    /// Drop everything mirrored. Entity listeners stay registered.
    pub fn clear(&self) {
        self.devices.clear();
        self.groups.clear();
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DeviceMirror>>> {
        self.devices.snapshot()
    }

    pub fn groups_snapshot(&self) -> Arc<Vec<Arc<GroupMirror>>> {
        self.groups.snapshot()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total mutations applied to devices and groups since creation.
    pub fn version(&self) -> u64 {
        self.devices.version() + self.groups.version()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn device(&self, ieee: &Ieee) -> Option<Arc<DeviceMirror>> {
        self.devices.get(ieee)
    }

    pub fn group(&self, group_id: u16) -> Option<Arc<GroupMirror>> {
        self.groups.get(&group_id)
    }

    pub fn device_ieees(&self) -> Vec<Ieee> {
        self.devices.keys()
    }

    /// Look up one entity by owner and unique id.
    pub fn entity(&self, entity: &EntityRef) -> Option<EntityInfo> {
        match entity {
            EntityRef::Device { ieee, unique_id } => self
                .devices
                .get(ieee)
                .and_then(|d| d.entity_by_unique_id(unique_id).cloned()),
            EntityRef::Group {
                group_id,
                unique_id,
            } => self
                .groups
                .get(group_id)
                .and_then(|g| g.entities.get(unique_id).cloned()),
        }
    }

    /// Entities hosted on the member endpoints of a group, resolved
    /// against the device mirror. Members not mirrored are skipped.
    pub fn group_member_entities(&self, group_id: u16) -> Option<Vec<EntityInfo>> {
        let group = self.groups.get(&group_id)?;
        let mut entities = Vec::new();
        for member in &group.members {
            let Some(device) = self.devices.get(&member.ieee) else {
                continue;
            };
            entities.extend(
                device
                    .entities
                    .values()
                    .filter(|e| {
                        matches!(e.owner, EntityOwner::Device { endpoint_id, .. }
                            if endpoint_id == member.endpoint_id)
                    })
                    .cloned(),
            );
        }
        Some(entities)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_devices(&self) -> MirrorStream<DeviceMirror> {
        MirrorStream::new(self.devices.subscribe())
    }

    pub fn subscribe_groups(&self) -> MirrorStream<GroupMirror> {
        MirrorStream::new(self.groups.subscribe())
    }

    /// Follow the state of one entity as events are applied.
    pub fn watch_entity(self: &Arc<Self>, entity: EntityRef) -> EntityStateStream {
        EntityStateStream::new(Arc::clone(self), entity)
    }

    /// Call `listener` whenever the mirror applies a state change for
    /// `entity`.
    pub fn on_entity_state<F>(&self, entity: EntityRef, listener: F) -> ListenerId
    where
        F: Fn(&EntityStateChangedEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.entity_listeners.on(entity, listener)
    }

    pub fn off_entity_state(&self, id: ListenerId) -> bool {
        self.entity_listeners.off(id)
    }
}

impl Default for MirrorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MirrorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorStore")
            .field("devices", &self.devices.len())
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}
