// ── Event application ──
//
// Folds gateway events into the mirror. Each event is applied on its own,
// in arrival order: the last event about a device decides whether it is
// present.

use tracing::{debug, trace};
use zhaws_api::Event;
use zhaws_api::event::EntityStateChangedEvent;
use zhaws_api::model::{EntityInfo, EntityRef, EntityState, GroupInfo, Ieee};

use super::MirrorStore;
use crate::model::{DeviceMirror, GroupMirror};

impl MirrorStore {
    /// Apply one event. Returns `true` if the mirror changed.
    pub fn apply_event(&self, event: &Event) -> bool {
        match event {
            Event::DeviceJoined(e) => {
                let info = &e.device_info;
                let patched = self.devices.update(&info.ieee, |d| {
                    let changed = d.patch_joined(info);
                    (changed, changed)
                });
                match patched {
                    Some(changed) => changed,
                    None => {
                        debug!(ieee = %info.ieee, "device joined");
                        self.devices.upsert(info.ieee, DeviceMirror::joined(info))
                    }
                }
            }
            Event::RawDeviceInitialized(e) => {
                let info = &e.device_info;
                match self.devices.update(&info.ieee, |d| {
                    let changed = d.patch_raw(info);
                    (changed, changed)
                }) {
                    Some(changed) => changed,
                    None => self
                        .devices
                        .upsert(info.ieee, DeviceMirror::raw_initialized(info)),
                }
            }
            Event::DeviceFullyInitialized(e) => {
                let mut device = DeviceMirror::from(e.device_info.info.clone());
                device.pairing_status = Some(e.device_info.pairing_status);
                self.replace_device(device)
            }
            Event::DeviceLeft(e) => self.remove_device(e.ieee),
            Event::DeviceRemoved(e) => self.remove_device(e.device_info.ieee()),
            Event::DeviceOffline(e) => self.set_available(e.device_info.ieee(), false, || {
                DeviceMirror::from(e.device_info.clone())
            }),
            Event::DeviceOnline(e) => self.set_available(e.device_info.ieee(), true, || {
                DeviceMirror::from(e.device_info.clone())
            }),
            Event::GroupAdded(e) => self.replace_group(&e.group_info),
            Event::GroupMemberAdded(e) => self.replace_group(&e.group_info),
            Event::GroupMemberRemoved(e) => self.replace_group(&e.group_info),
            Event::GroupRemoved(e) => {
                debug!(group_id = e.group_info.group_id, "group removed");
                self.groups.remove(&e.group_info.group_id).is_some()
            }
            Event::StateChanged(e) => self.apply_state(e),
            Event::ConnectionLost(_)
            | Event::Zha(_)
            | Event::ClusterAttributeUpdated(_)
            | Event::ClusterConfigDone(_)
            | Event::RawZclAttributeUpdated(_) => false,
        }
    }

    // ── Devices ──────────────────────────────────────────────────────

    fn replace_device(&self, device: DeviceMirror) -> bool {
        if self.devices.get(&device.ieee).is_some_and(|d| *d == device) {
            return false;
        }
        self.devices.upsert(device.ieee, device);
        true
    }

    /// Remove a device and prune it from every group's member list.
    fn remove_device(&self, ieee: Ieee) -> bool {
        let removed = self.devices.remove(&ieee).is_some();
        if removed {
            debug!(%ieee, "device removed from mirror");
        }
        let mut pruned = false;
        for group_id in self.groups.keys() {
            let changed = self.groups.update(&group_id, |g| {
                let before = g.members.len();
                g.members.retain(|m| m.ieee != ieee);
                let changed = g.members.len() != before;
                (changed, changed)
            });
            pruned |= changed.unwrap_or(false);
        }
        removed || pruned
    }

    fn set_available(
        &self,
        ieee: Ieee,
        available: bool,
        fallback: impl FnOnce() -> DeviceMirror,
    ) -> bool {
        let updated = self.devices.update(&ieee, |d| {
            let changed = d.available != available;
            d.available = available;
            (changed, changed)
        });
        match updated {
            Some(changed) => changed,
            None => {
                let mut device = fallback();
                device.available = available;
                self.devices.upsert(ieee, device)
            }
        }
    }

    // ── Groups ───────────────────────────────────────────────────────

    fn replace_group(&self, info: &GroupInfo) -> bool {
        let group = GroupMirror::from(info.clone());
        if self.groups.get(&group.group_id).is_some_and(|g| *g == group) {
            return false;
        }
        self.groups.upsert(group.group_id, group);
        true
    }

    // ── Entity state ─────────────────────────────────────────────────

    /// Replace one entity's `state` in place and notify its listeners.
    /// Identity fields of the entity are never touched.
    fn apply_state(&self, event: &EntityStateChangedEvent) -> bool {
        let state = &event.state;
        // Outer `None`: owner not mirrored. Inner `None`: entity not found.
        let outcome = match &event.entity {
            EntityRef::Device { ieee, unique_id } => self.devices.update(ieee, |d| {
                replace_state(d.entity_by_unique_id_mut(unique_id), state)
            }),
            EntityRef::Group {
                group_id,
                unique_id,
            } => self.groups.update(group_id, |g| {
                replace_state(g.entities.get_mut(unique_id), state)
            }),
        };
        match outcome.flatten() {
            Some(changed) => {
                trace!(entity = %event.entity, changed, "state applied");
                self.entity_listeners.emit(&event.entity, event);
                changed
            }
            None => {
                debug!(entity = %event.entity, "state change for unknown entity");
                false
            }
        }
    }
}

fn replace_state(entity: Option<&mut EntityInfo>, state: &EntityState) -> (bool, Option<bool>) {
    match entity {
        Some(entity) if entity.state == *state => (false, Some(false)),
        Some(entity) => {
            entity.state = state.clone();
            (true, Some(true))
        }
        None => (false, None),
    }
}
