// ── Entity descriptors ──

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use super::address::Ieee;
use super::state::EntityState;

// ── Platform ────────────────────────────────────────────────────────

/// Kind of entity. Selects the state shape and the command family.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    AlarmControlPanel,
    BinarySensor,
    Button,
    Climate,
    Cover,
    DeviceTracker,
    Fan,
    Light,
    Lock,
    Number,
    Select,
    Sensor,
    Siren,
    Switch,
    Update,
}

// ── Keys and references ─────────────────────────────────────────────

/// Key of a device's entity map, `"<platform>,<unique_id>"` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub platform: Platform,
    pub unique_id: String,
}

impl EntityKey {
    pub fn new(platform: Platform, unique_id: impl Into<String>) -> Self {
        Self {
            platform,
            unique_id: unique_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.platform, self.unique_id)
    }
}

impl FromStr for EntityKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidEntityKey(s.to_owned());
        let (platform, unique_id) = s.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            platform: platform.parse().map_err(|_| invalid())?,
            unique_id: unique_id.to_owned(),
        })
    }
}

impl Serialize for EntityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = EntityKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a \"platform,unique_id\" string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<EntityKey, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

/// Who an entity belongs to. Exactly one of a device endpoint or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityOwner {
    Device { ieee: Ieee, endpoint_id: u8 },
    Group { group_id: u16 },
}

/// Globally unique handle for one entity: owner plus unique id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityRef {
    Device { ieee: Ieee, unique_id: String },
    Group { group_id: u16, unique_id: String },
}

impl EntityRef {
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Device { unique_id, .. } | Self::Group { unique_id, .. } => unique_id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { ieee, unique_id } => write!(f, "{ieee}/{unique_id}"),
            Self::Group { group_id, unique_id } => write!(f, "group {group_id}/{unique_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid entity key '{0}'")]
    InvalidEntityKey(String),

    #[error("Entity '{0}' names both a device and a group as owner")]
    AmbiguousOwner(String),

    #[error("Entity '{0}' has no device endpoint or group owner")]
    MissingOwner(String),

    #[error("Invalid {platform} state for entity '{unique_id}': {reason}")]
    InvalidState {
        platform: Platform,
        unique_id: String,
        reason: String,
    },
}

fn owner_from_fields(
    unique_id: &str,
    device_ieee: Option<Ieee>,
    endpoint_id: Option<u8>,
    group_id: Option<u16>,
) -> Result<EntityOwner, ModelError> {
    match (device_ieee, endpoint_id, group_id) {
        (Some(_), _, Some(_)) => Err(ModelError::AmbiguousOwner(unique_id.to_owned())),
        (Some(ieee), Some(endpoint_id), None) => Ok(EntityOwner::Device { ieee, endpoint_id }),
        (None, _, Some(group_id)) => Ok(EntityOwner::Group { group_id }),
        _ => Err(ModelError::MissingOwner(unique_id.to_owned())),
    }
}

fn owner_fields(owner: EntityOwner) -> (Option<Ieee>, Option<u8>, Option<u16>) {
    match owner {
        EntityOwner::Device { ieee, endpoint_id } => (Some(ieee), Some(endpoint_id), None),
        EntityOwner::Group { group_id } => (None, None, Some(group_id)),
    }
}

// ── Cluster handlers ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_attribute: Option<String>,
}

/// Diagnostic description of a cluster handler backing an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHandlerInfo {
    pub class_name: String,
    pub generic_id: String,
    pub endpoint_id: u8,
    pub cluster: ClusterInfo,
    pub id: String,
    pub unique_id: String,
}

// ── EntityInfo ──────────────────────────────────────────────────────

/// Snapshot describing one entity.
///
/// Identity fields never change for the life of the entity; the mirror only
/// ever replaces `state`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEntityInfo")]
pub struct EntityInfo {
    pub platform: Platform,
    pub unique_id: String,
    pub class_name: String,
    pub translation_key: Option<String>,
    pub device_class: Option<String>,
    pub state_class: Option<String>,
    pub entity_category: Option<String>,
    pub entity_registry_enabled_default: bool,
    pub enabled: bool,
    pub fallback_name: Option<String>,
    pub owner: EntityOwner,
    pub available: Option<bool>,
    pub supported_features: Option<u32>,
    pub state: EntityState,
    pub cluster_handlers: Vec<ClusterHandlerInfo>,
    /// Platform-specific capabilities (`min_mireds`, `hvac_modes`, ...).
    pub attributes: Map<String, Value>,
}

impl EntityInfo {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.platform, self.unique_id.clone())
    }

    pub fn entity_ref(&self) -> EntityRef {
        match self.owner {
            EntityOwner::Device { ieee, .. } => EntityRef::Device {
                ieee,
                unique_id: self.unique_id.clone(),
            },
            EntityOwner::Group { group_id } => EntityRef::Group {
                group_id,
                unique_id: self.unique_id.clone(),
            },
        }
    }

    /// Display name: the fallback name if the server sent one, else the
    /// class name.
    pub fn display_name(&self) -> &str {
        self.fallback_name.as_deref().unwrap_or(&self.class_name)
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize)]
struct RawEntityInfo {
    platform: Platform,
    unique_id: String,
    class_name: String,
    #[serde(default)]
    translation_key: Option<String>,
    #[serde(default)]
    device_class: Option<String>,
    #[serde(default)]
    state_class: Option<String>,
    #[serde(default)]
    entity_category: Option<String>,
    #[serde(default)]
    entity_registry_enabled_default: bool,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    fallback_name: Option<String>,
    #[serde(default)]
    device_ieee: Option<Ieee>,
    #[serde(default)]
    endpoint_id: Option<u8>,
    #[serde(default)]
    group_id: Option<u16>,
    #[serde(default)]
    available: Option<bool>,
    #[serde(default)]
    supported_features: Option<u32>,
    state: Value,
    #[serde(default)]
    cluster_handlers: Vec<ClusterHandlerInfo>,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

impl TryFrom<RawEntityInfo> for EntityInfo {
    type Error = ModelError;

    fn try_from(raw: RawEntityInfo) -> Result<Self, Self::Error> {
        let owner = owner_from_fields(&raw.unique_id, raw.device_ieee, raw.endpoint_id, raw.group_id)?;
        let state =
            EntityState::decode(raw.platform, raw.state).map_err(|e| ModelError::InvalidState {
                platform: raw.platform,
                unique_id: raw.unique_id.clone(),
                reason: e.to_string(),
            })?;
        let mut attributes = raw.attributes;
        // Serializer-added discriminator, not a capability.
        attributes.remove("model_class_name");
        Ok(Self {
            platform: raw.platform,
            unique_id: raw.unique_id,
            class_name: raw.class_name,
            translation_key: raw.translation_key,
            device_class: raw.device_class,
            state_class: raw.state_class,
            entity_category: raw.entity_category,
            entity_registry_enabled_default: raw.entity_registry_enabled_default,
            enabled: raw.enabled,
            fallback_name: raw.fallback_name,
            owner,
            available: raw.available,
            supported_features: raw.supported_features,
            state,
            cluster_handlers: raw.cluster_handlers,
            attributes,
        })
    }
}

#[derive(Serialize)]
struct EntityInfoWire<'a> {
    platform: Platform,
    unique_id: &'a str,
    class_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    translation_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_category: Option<&'a str>,
    entity_registry_enabled_default: bool,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_ieee: Option<Ieee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    supported_features: Option<u32>,
    state: &'a EntityState,
    cluster_handlers: &'a [ClusterHandlerInfo],
    #[serde(flatten)]
    attributes: &'a Map<String, Value>,
}

impl Serialize for EntityInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (device_ieee, endpoint_id, group_id) = owner_fields(self.owner);
        EntityInfoWire {
            platform: self.platform,
            unique_id: &self.unique_id,
            class_name: &self.class_name,
            translation_key: self.translation_key.as_deref(),
            device_class: self.device_class.as_deref(),
            state_class: self.state_class.as_deref(),
            entity_category: self.entity_category.as_deref(),
            entity_registry_enabled_default: self.entity_registry_enabled_default,
            enabled: self.enabled,
            fallback_name: self.fallback_name.as_deref(),
            device_ieee,
            endpoint_id,
            group_id,
            available: self.available,
            supported_features: self.supported_features,
            state: &self.state,
            cluster_handlers: &self.cluster_handlers,
            attributes: &self.attributes,
        }
        .serialize(serializer)
    }
}
