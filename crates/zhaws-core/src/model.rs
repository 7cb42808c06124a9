// ── Mirrored domain types ──
//
// Local copies of server-side devices and groups. Built from the wire
// descriptors in `zhaws_api::model` and patched in place by events.

use std::collections::BTreeMap;

use serde::Serialize;
use zhaws_api::model::{
    DeviceInfo, DeviceJoinedInfo, DevicePairingStatus, EntityInfo, EntityKey, ExtendedDeviceInfo,
    GroupInfo, GroupMemberReference, Ieee, Nwk, RawDeviceInitializedInfo,
};

/// One device as last reported by the server.
///
/// A device first seen through `device_joined` or `raw_device_initialized`
/// has no full descriptor yet: `info` is `None` and `entities` is empty
/// until `device_fully_initialized` or the next bulk load fills them in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceMirror {
    pub ieee: Ieee,
    pub nwk: Nwk,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub available: bool,
    pub on_network: bool,
    pub pairing_status: Option<DevicePairingStatus>,
    pub entities: BTreeMap<EntityKey, EntityInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<DeviceInfo>,
}

impl DeviceMirror {
    /// A device that has announced itself but not been interviewed.
    pub fn joined(info: &DeviceJoinedInfo) -> Self {
        Self {
            ieee: info.ieee,
            nwk: info.nwk,
            manufacturer: None,
            model: None,
            name: None,
            available: true,
            on_network: true,
            pairing_status: Some(info.pairing_status),
            entities: BTreeMap::new(),
            info: None,
        }
    }

    pub fn raw_initialized(info: &RawDeviceInitializedInfo) -> Self {
        let mut device = Self::joined(&DeviceJoinedInfo {
            ieee: info.ieee,
            nwk: info.nwk,
            pairing_status: info.pairing_status,
        });
        device.manufacturer = Some(info.manufacturer.clone());
        device.model = Some(info.model.clone());
        device
    }

    /// Apply the raw interview fields. Returns `true` if anything changed.
    pub(crate) fn patch_raw(&mut self, info: &RawDeviceInitializedInfo) -> bool {
        let before = (
            self.nwk,
            self.pairing_status,
            self.manufacturer.clone(),
            self.model.clone(),
        );
        self.nwk = info.nwk;
        self.pairing_status = Some(info.pairing_status);
        self.manufacturer = Some(info.manufacturer.clone());
        self.model = Some(info.model.clone());
        before != (
            self.nwk,
            self.pairing_status,
            self.manufacturer.clone(),
            self.model.clone(),
        )
    }

    pub(crate) fn patch_joined(&mut self, info: &DeviceJoinedInfo) -> bool {
        let before = (self.nwk, self.pairing_status, self.on_network);
        self.nwk = info.nwk;
        self.pairing_status = Some(info.pairing_status);
        self.on_network = true;
        before != (self.nwk, self.pairing_status, self.on_network)
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&EntityInfo> {
        self.entities.get(key)
    }

    pub fn entity_by_unique_id(&self, unique_id: &str) -> Option<&EntityInfo> {
        self.entities.values().find(|e| e.unique_id == unique_id)
    }

    pub(crate) fn entity_by_unique_id_mut(&mut self, unique_id: &str) -> Option<&mut EntityInfo> {
        self.entities.values_mut().find(|e| e.unique_id == unique_id)
    }

    /// Best human-readable label: name, then model, then the address.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| self.ieee.to_string())
    }

    /// Whether the device has completed its interview.
    pub fn is_initialized(&self) -> bool {
        self.info.is_some()
    }
}

impl From<ExtendedDeviceInfo> for DeviceMirror {
    fn from(ext: ExtendedDeviceInfo) -> Self {
        let info = ext.device;
        Self {
            ieee: info.ieee,
            nwk: info.nwk,
            manufacturer: Some(info.manufacturer.clone()),
            model: Some(info.model.clone()),
            name: Some(info.name.clone()),
            available: info.available,
            on_network: info.on_network,
            pairing_status: None,
            entities: ext.entities,
            info: Some(info),
        }
    }
}

/// One multicast group as last reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMirror {
    pub group_id: u16,
    pub name: String,
    pub members: Vec<GroupMemberReference>,
    /// Group-level entities, keyed by unique id.
    pub entities: BTreeMap<String, EntityInfo>,
}

impl GroupMirror {
    pub fn has_member(&self, ieee: Ieee) -> bool {
        self.members.iter().any(|m| m.ieee == ieee)
    }
}

impl From<GroupInfo> for GroupMirror {
    fn from(info: GroupInfo) -> Self {
        let members = info.member_references().collect();
        Self {
            group_id: info.group_id,
            name: info.name,
            members,
            entities: info.entities,
        }
    }
}
