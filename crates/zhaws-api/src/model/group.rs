// ── Group descriptors ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::address::Ieee;
use super::device::ExtendedDeviceInfo;
use super::entity::EntityInfo;

/// A device endpoint named in a group command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupMemberReference {
    pub ieee: Ieee,
    pub endpoint_id: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberInfo {
    pub ieee: Ieee,
    pub endpoint_id: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<Box<ExtendedDeviceInfo>>,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityInfo>,
}

impl GroupMemberInfo {
    pub fn reference(&self) -> GroupMemberReference {
        GroupMemberReference {
            ieee: self.ieee,
            endpoint_id: self.endpoint_id,
        }
    }
}

/// One multicast group with its members and group-level entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: u16,
    pub name: String,
    #[serde(default)]
    pub members: Vec<GroupMemberInfo>,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityInfo>,
}

impl GroupInfo {
    pub fn member_references(&self) -> impl Iterator<Item = GroupMemberReference> + '_ {
        self.members.iter().map(GroupMemberInfo::reference)
    }
}
