// ── Device descriptors ──

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::address::{Ieee, Nwk};
use super::entity::{EntityInfo, EntityKey};

/// Basic description of one physical node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub ieee: Ieee,
    pub nwk: Nwk,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    #[serde(default)]
    pub quirk_applied: bool,
    #[serde(default)]
    pub quirk_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quirk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_code: Option<u16>,
    #[serde(default)]
    pub power_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lqi: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_time: Option<String>,
    pub available: bool,
    #[serde(default)]
    pub on_network: bool,
    #[serde(default)]
    pub is_groupable: bool,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub signature: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointNameInfo {
    pub name: String,
}

/// Full device description including every hosted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedDeviceInfo {
    #[serde(flatten)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub active_coordinator: bool,
    #[serde(default)]
    pub entities: BTreeMap<EntityKey, EntityInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint_names: Vec<EndpointNameInfo>,
}

impl ExtendedDeviceInfo {
    pub fn ieee(&self) -> Ieee {
        self.device.ieee
    }
}

// ── Pairing ─────────────────────────────────────────────────────────

/// Progress of a joining device. Written by name, read by name or ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DevicePairingStatus {
    Paired,
    InterviewComplete,
    Configured,
    Initialized,
}

impl DevicePairingStatus {
    fn from_ordinal(n: u64) -> Option<Self> {
        match n {
            1 => Some(Self::Paired),
            2 => Some(Self::InterviewComplete),
            3 => Some(Self::Configured),
            4 => Some(Self::Initialized),
            _ => None,
        }
    }
}

impl Serialize for DevicePairingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DevicePairingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatusVisitor;

        impl Visitor<'_> for StatusVisitor {
            type Value = DevicePairingStatus;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a pairing status name or ordinal 1-4")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(|_| {
                    E::unknown_variant(
                        v,
                        &["PAIRED", "INTERVIEW_COMPLETE", "CONFIGURED", "INITIALIZED"],
                    )
                })
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                DevicePairingStatus::from_ordinal(v)
                    .ok_or_else(|| E::custom(format!("unknown pairing status {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .ok()
                    .and_then(DevicePairingStatus::from_ordinal)
                    .ok_or_else(|| E::custom(format!("unknown pairing status {v}")))
            }
        }

        deserializer.deserialize_any(StatusVisitor)
    }
}

/// Minimal record sent when a node first announces itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceJoinedInfo {
    pub ieee: Ieee,
    pub nwk: Nwk,
    pub pairing_status: DevicePairingStatus,
}

/// Node interviewed but not yet matched against quirks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDeviceInitializedInfo {
    pub ieee: Ieee,
    pub nwk: Nwk,
    pub pairing_status: DevicePairingStatus,
    pub model: String,
    pub manufacturer: String,
    #[serde(default)]
    pub signature: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedDeviceInfoWithPairingStatus {
    #[serde(flatten)]
    pub info: ExtendedDeviceInfo,
    pub pairing_status: DevicePairingStatus,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pairing_status_reads_names_and_ordinals() {
        let by_name: DevicePairingStatus = serde_json::from_value(json!("INTERVIEW_COMPLETE")).unwrap();
        let by_ordinal: DevicePairingStatus = serde_json::from_value(json!(2)).unwrap();
        assert_eq!(by_name, by_ordinal);
        assert_eq!(serde_json::to_value(by_name).unwrap(), json!("INTERVIEW_COMPLETE"));
        assert!(serde_json::from_value::<DevicePairingStatus>(json!(9)).is_err());
    }

    #[test]
    fn extended_info_flattens_base_fields() {
        let raw = json!({
            "ieee": "aa:bb:cc:dd:ee:ff:00:01",
            "nwk": "0x1234",
            "manufacturer": "IKEA",
            "model": "TRADFRI",
            "name": "IKEA TRADFRI",
            "available": true,
            "active_coordinator": false,
            "entities": {},
        });
        let info: ExtendedDeviceInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(info.device.nwk, Nwk(0x1234));
        assert_eq!(info.device.manufacturer, "IKEA");
        assert!(info.entities.is_empty());
    }
}
