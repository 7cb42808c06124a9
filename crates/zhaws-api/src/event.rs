// ── Events ──
//
// Server-pushed notifications. Each event is identified by the compound
// `(event_type, event)` key: `event_type` names the category, `event` the
// kind within it. Every kind has exactly one payload type, and the payload
// type alone is enough to subscribe to it (see `EventPayload`).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::model::{
    DeviceJoinedInfo, EntityOwner, EntityRef, EntityState, ExtendedDeviceInfo,
    ExtendedDeviceInfoWithPairingStatus, GroupInfo, Ieee, ModelError, Nwk, Platform,
    RawDeviceInitializedInfo,
};

// ── Payloads: gateway ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceJoinedEvent {
    pub device_info: DeviceJoinedInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDeviceInitializedEvent {
    pub device_info: RawDeviceInitializedInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFullyInitializedEvent {
    pub device_info: ExtendedDeviceInfoWithPairingStatus,
    #[serde(default)]
    pub new_join: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLeftEvent {
    pub ieee: Ieee,
    pub nwk: Nwk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRemovedEvent {
    pub device_info: ExtendedDeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAddedEvent {
    pub group_info: GroupInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRemovedEvent {
    pub group_info: GroupInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberAddedEvent {
    pub group_info: GroupInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMemberRemovedEvent {
    pub group_info: GroupInfo,
}

/// The server lost its link to the radio.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionLostEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

// ── Payloads: device ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOfflineEvent {
    pub device_info: ExtendedDeviceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOnlineEvent {
    pub device_info: ExtendedDeviceInfo,
}

/// A device-originated occurrence (button press, remote scene recall, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZhaEvent {
    pub device_ieee: Ieee,
    pub unique_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

// ── Payloads: entity ────────────────────────────────────────────────

/// New state for one entity.
///
/// The state shape is chosen by `platform`, exactly as in `EntityInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStateChangedEvent {
    pub platform: Platform,
    pub entity: EntityRef,
    pub endpoint_id: Option<u8>,
    pub state: EntityState,
}

#[derive(Deserialize)]
struct RawStateChanged {
    platform: Platform,
    unique_id: String,
    #[serde(default)]
    device_ieee: Option<Ieee>,
    #[serde(default)]
    endpoint_id: Option<u8>,
    #[serde(default)]
    group_id: Option<u16>,
    state: Value,
}

#[derive(Serialize)]
struct StateChangedWire<'a> {
    platform: Platform,
    unique_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_ieee: Option<Ieee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<u16>,
    state: &'a EntityState,
}

impl TryFrom<RawStateChanged> for EntityStateChangedEvent {
    type Error = ModelError;

    fn try_from(raw: RawStateChanged) -> Result<Self, ModelError> {
        let entity = match (raw.device_ieee, raw.group_id) {
            (Some(_), Some(_)) => return Err(ModelError::AmbiguousOwner(raw.unique_id)),
            (None, None) => return Err(ModelError::MissingOwner(raw.unique_id)),
            (Some(ieee), None) => EntityRef::Device {
                ieee,
                unique_id: raw.unique_id.clone(),
            },
            (None, Some(group_id)) => EntityRef::Group {
                group_id,
                unique_id: raw.unique_id.clone(),
            },
        };
        let state = EntityState::decode(raw.platform, raw.state).map_err(|e| {
            ModelError::InvalidState {
                platform: raw.platform,
                unique_id: raw.unique_id,
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            platform: raw.platform,
            entity,
            endpoint_id: raw.endpoint_id,
            state,
        })
    }
}

impl<'de> Deserialize<'de> for EntityStateChangedEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawStateChanged::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for EntityStateChangedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (device_ieee, group_id) = match &self.entity {
            EntityRef::Device { ieee, .. } => (Some(*ieee), None),
            EntityRef::Group { group_id, .. } => (None, Some(*group_id)),
        };
        StateChangedWire {
            platform: self.platform,
            unique_id: self.entity.unique_id(),
            device_ieee,
            endpoint_id: self.endpoint_id,
            group_id,
            state: &self.state,
        }
        .serialize(serializer)
    }
}

impl EntityStateChangedEvent {
    /// Build the event for an entity with a known owner.
    pub fn for_owner(
        platform: Platform,
        unique_id: impl Into<String>,
        owner: EntityOwner,
        state: EntityState,
    ) -> Self {
        let unique_id = unique_id.into();
        let (entity, endpoint_id) = match owner {
            EntityOwner::Device { ieee, endpoint_id } => {
                (EntityRef::Device { ieee, unique_id }, Some(endpoint_id))
            }
            EntityOwner::Group { group_id } => (EntityRef::Group { group_id, unique_id }, None),
        };
        Self {
            platform,
            entity,
            endpoint_id,
            state,
        }
    }
}

// ── Payloads: cluster handlers and raw ZCL ──────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAttributeUpdatedEvent {
    pub device_ieee: Ieee,
    pub unique_id: String,
    pub cluster_id: u16,
    pub attribute_id: u16,
    pub attribute_name: String,
    #[serde(default)]
    pub attribute_value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfigDoneEvent {
    pub device_ieee: Ieee,
    pub unique_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawZclAttributeUpdatedEvent {
    pub device_ieee: Ieee,
    pub endpoint_id: u8,
    pub cluster_id: u16,
    pub attribute_id: u16,
    #[serde(default)]
    pub value: Value,
}

// ── Event table ─────────────────────────────────────────────────────

/// Implemented by every event payload type.
pub trait EventPayload: Sized + Send + Sync + 'static {
    const KIND: EventKind;

    fn from_event(event: &Event) -> Option<&Self>;

    fn into_event(self) -> Event;
}

pub const GATEWAY: &str = "zha_gateway_message";
pub const DEVICE: &str = "device_event";
pub const ENTITY: &str = "entity";
pub const CLUSTER_HANDLER: &str = "cluster_handler_event";
pub const CHANNEL: &str = "zha_channel_message";
pub const RAW_ZCL: &str = "raw_zcl_event";

macro_rules! events {
    ($( $variant:ident($payload:ty) => ($event_type:expr, $event:literal), )*) => {
        /// The `(event_type, event)` key of one event kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter)]
        pub enum EventKind {
            $( $variant, )*
        }

        impl EventKind {
            pub fn event_type(self) -> &'static str {
                match self {
                    $( Self::$variant => $event_type, )*
                }
            }

            pub fn event_name(self) -> &'static str {
                match self {
                    $( Self::$variant => $event, )*
                }
            }

            /// Resolve a wire key. Unknown pairs yield `None`.
            pub fn from_wire(event_type: &str, event: &str) -> Option<Self> {
                $(
                    if event_type == $event_type && event == $event {
                        return Some(Self::$variant);
                    }
                )*
                None
            }
        }

        /// A decoded event with its typed payload.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $( $variant($payload), )*
        }

        impl Event {
            pub fn kind(&self) -> EventKind {
                match self {
                    $( Self::$variant(_) => EventKind::$variant, )*
                }
            }

            fn decode_payload(kind: EventKind, body: Value) -> Result<Self, serde_json::Error> {
                Ok(match kind {
                    $( EventKind::$variant => Self::$variant(serde_json::from_value(body)?), )*
                })
            }

            fn payload_value(&self) -> Result<Value, serde_json::Error> {
                match self {
                    $( Self::$variant(payload) => serde_json::to_value(payload), )*
                }
            }
        }

        $(
            impl EventPayload for $payload {
                const KIND: EventKind = EventKind::$variant;

                fn from_event(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$variant(payload) => Some(payload),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn into_event(self) -> Event {
                    Event::$variant(self)
                }
            }

            impl From<$payload> for Event {
                fn from(payload: $payload) -> Self {
                    Event::$variant(payload)
                }
            }
        )*
    };
}

events! {
    DeviceJoined(DeviceJoinedEvent) => (GATEWAY, "device_joined"),
    RawDeviceInitialized(RawDeviceInitializedEvent) => (GATEWAY, "raw_device_initialized"),
    DeviceFullyInitialized(DeviceFullyInitializedEvent) => (GATEWAY, "device_fully_initialized"),
    DeviceLeft(DeviceLeftEvent) => (GATEWAY, "device_left"),
    DeviceRemoved(DeviceRemovedEvent) => (GATEWAY, "device_removed"),
    GroupAdded(GroupAddedEvent) => (GATEWAY, "group_added"),
    GroupRemoved(GroupRemovedEvent) => (GATEWAY, "group_removed"),
    GroupMemberAdded(GroupMemberAddedEvent) => (GATEWAY, "group_member_added"),
    GroupMemberRemoved(GroupMemberRemovedEvent) => (GATEWAY, "group_member_removed"),
    ConnectionLost(ConnectionLostEvent) => (GATEWAY, "connection_lost"),
    DeviceOffline(DeviceOfflineEvent) => (DEVICE, "device_offline"),
    DeviceOnline(DeviceOnlineEvent) => (DEVICE, "device_online"),
    Zha(ZhaEvent) => (DEVICE, "zha_event"),
    StateChanged(EntityStateChangedEvent) => (ENTITY, "state_changed"),
    ClusterAttributeUpdated(ClusterAttributeUpdatedEvent) => (CLUSTER_HANDLER, "cluster_handler_attribute_updated"),
    ClusterConfigDone(ClusterConfigDoneEvent) => (CHANNEL, "zha_channel_cfg_done"),
    RawZclAttributeUpdated(RawZclAttributeUpdatedEvent) => (RAW_ZCL, "attribute_updated"),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_type(), self.event_name())
    }
}

impl Event {
    /// Decode an event body whose `message_type` was already removed.
    pub fn decode(mut fields: Map<String, Value>) -> Result<Self, DecodeError> {
        let event_type = take_string(&mut fields, "event_type")?;
        let event = take_string(&mut fields, "event")?;
        let kind = EventKind::from_wire(&event_type, &event)
            .ok_or_else(|| DecodeError::new(format!("unknown event {event_type}/{event}")))?;
        Self::decode_payload(kind, Value::Object(fields))
            .map_err(|e| DecodeError::new(format!("{kind}: {e}")))
    }

    /// Wire fields including `event_type` and `event`, without `message_type`.
    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let kind = self.kind();
        let mut fields = match self.payload_value()? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.insert("event_type".to_owned(), Value::from(kind.event_type()));
        fields.insert("event".to_owned(), Value::from(kind.event_name()));
        Ok(fields)
    }

    /// Whether this event is only forwarded to raw-ZCL subscribers.
    pub fn is_raw_zcl(&self) -> bool {
        self.kind().event_type() == RAW_ZCL
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<String, DecodeError> {
    match fields.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(DecodeError::new(format!("`{key}` must be a string, got {other}"))),
        None => Err(DecodeError::new(format!("missing `{key}`"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strum::IntoEnumIterator;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn wire_keys_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in EventKind::iter() {
            assert!(seen.insert((kind.event_type(), kind.event_name())), "{kind}");
            assert_eq!(EventKind::from_wire(kind.event_type(), kind.event_name()), Some(kind));
        }
    }

    #[test]
    fn same_event_name_in_other_namespace_is_unknown() {
        let err = Event::decode(fields(json!({
            "event_type": "entity",
            "event": "device_joined",
        })))
        .unwrap_err();
        assert!(err.reason.contains("unknown event"), "{err}");
    }

    #[test]
    fn state_changed_decodes_by_platform() {
        let raw = json!({
            "event_type": "entity",
            "event": "state_changed",
            "platform": "switch",
            "unique_id": "switch_1",
            "device_ieee": "aa:bb:cc:dd:ee:ff:00:01",
            "endpoint_id": 1,
            "state": {"class_name": "Switch", "state": true},
        });
        let event = Event::decode(fields(raw.clone())).unwrap();
        let changed = EntityStateChangedEvent::from_event(&event).unwrap();
        assert_eq!(changed.state.is_on(), Some(true));
        assert_eq!(changed.entity.unique_id(), "switch_1");
        assert_eq!(Value::Object(event.to_fields().unwrap()), raw);
    }

    #[test]
    fn state_changed_rejects_two_owners() {
        let err = Event::decode(fields(json!({
            "event_type": "entity",
            "event": "state_changed",
            "platform": "switch",
            "unique_id": "switch_1",
            "device_ieee": "aa:bb:cc:dd:ee:ff:00:01",
            "group_id": 2,
            "state": {"class_name": "Switch", "state": true},
        })));
        assert!(err.is_err());
    }

    #[test]
    fn device_left_round_trips() {
        let raw = json!({
            "event_type": "zha_gateway_message",
            "event": "device_left",
            "ieee": "aa:bb:cc:dd:ee:ff:00:01",
            "nwk": "0x1234",
        });
        let event = Event::decode(fields(raw.clone())).unwrap();
        assert_eq!(event.kind(), EventKind::DeviceLeft);
        assert_eq!(Value::Object(event.to_fields().unwrap()), raw);
    }

    #[test]
    fn payload_type_identifies_kind() {
        assert_eq!(DeviceLeftEvent::KIND, EventKind::DeviceLeft);
        let event = ConnectionLostEvent::default().into_event();
        assert!(DeviceLeftEvent::from_event(&event).is_none());
        assert!(ConnectionLostEvent::from_event(&event).is_some());
    }
}
