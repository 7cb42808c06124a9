// ── Entity state payloads ──
//
// The wire carries a `state` object whose shape depends on what kind of
// entity produced it. The owning entity's platform is a closed set, so it
// picks the shape; `class_name` rides along inside the payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::Platform;

/// On/off state shared by switches, binary sensors and sirens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnOffState {
    pub class_name: String,
    pub state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub class_name: String,
    pub on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xy_color: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_brightness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_mode: Option<String>,
    #[serde(default)]
    pub off_with_transition: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub class_name: String,
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

/// HVAC operating mode, shared by thermostat state and climate commands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermostatState {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temperature_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temperature_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_mode: Option<HvacMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverState {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_position: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_tilt_position: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lift_position: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_tilt_position: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub is_opening: bool,
    pub is_closing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

/// Position-only covers (shades and vents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeState {
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_position: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_closed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanState {
    pub class_name: String,
    pub is_on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

/// Catch-all for sensors, numbers, selects and anything else whose value is
/// a single scalar plus vendor-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericState {
    pub class_name: String,
    #[serde(default)]
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const SHADE_CLASSES: &[&str] = &["Shade", "KeenVent"];

/// State payload of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    Light(LightState),
    Switch(OnOffState),
    Boolean(OnOffState),
    Lock(LockState),
    Thermostat(ThermostatState),
    Cover(CoverState),
    Shade(ShadeState),
    Fan(FanState),
    Generic(GenericState),
}

impl EntityState {
    /// Decode a wire `state` object for an entity on `platform`.
    pub fn decode(platform: Platform, value: Value) -> Result<Self, serde_json::Error> {
        let state = match platform {
            Platform::Light => Self::Light(serde_json::from_value(value)?),
            Platform::Switch => Self::Switch(serde_json::from_value(value)?),
            Platform::BinarySensor | Platform::Siren => {
                Self::Boolean(serde_json::from_value(value)?)
            }
            Platform::Lock => Self::Lock(serde_json::from_value(value)?),
            Platform::Climate => Self::Thermostat(serde_json::from_value(value)?),
            Platform::Cover => {
                let is_shade = value
                    .get("class_name")
                    .and_then(Value::as_str)
                    .is_some_and(|name| SHADE_CLASSES.contains(&name));
                if is_shade {
                    Self::Shade(serde_json::from_value(value)?)
                } else {
                    Self::Cover(serde_json::from_value(value)?)
                }
            }
            Platform::Fan => Self::Fan(serde_json::from_value(value)?),
            _ => Self::Generic(serde_json::from_value(value)?),
        };
        Ok(state)
    }

    pub fn class_name(&self) -> &str {
        match self {
            Self::Light(s) => &s.class_name,
            Self::Switch(s) | Self::Boolean(s) => &s.class_name,
            Self::Lock(s) => &s.class_name,
            Self::Thermostat(s) => &s.class_name,
            Self::Cover(s) => &s.class_name,
            Self::Shade(s) => &s.class_name,
            Self::Fan(s) => &s.class_name,
            Self::Generic(s) => &s.class_name,
        }
    }

    pub fn available(&self) -> Option<bool> {
        match self {
            Self::Light(s) => s.available,
            Self::Switch(s) | Self::Boolean(s) => s.available,
            Self::Lock(s) => s.available,
            Self::Thermostat(s) => s.available,
            Self::Cover(s) => s.available,
            Self::Shade(s) => s.available,
            Self::Fan(s) => s.available,
            Self::Generic(s) => s.available,
        }
    }

    /// The on/off reading for entities that have one.
    pub fn is_on(&self) -> Option<bool> {
        match self {
            Self::Light(s) => Some(s.on),
            Self::Switch(s) | Self::Boolean(s) => Some(s.state),
            Self::Fan(s) => Some(s.is_on),
            Self::Lock(s) => Some(s.is_locked),
            Self::Generic(s) => s.state.as_bool(),
            Self::Thermostat(_) | Self::Cover(_) | Self::Shade(_) => None,
        }
    }
}
