// ── Command results ──
//
// A result frame echoes the command kind, and the kind alone decides which
// payload shape a successful result carries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codes;
use crate::command::CommandKind;
use crate::error::{CommandError, RadioOperationError};
use crate::model::{ExtendedDeviceInfo, GroupInfo, Ieee};

/// Cluster addressed by a cluster attribute read or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRef {
    pub id: u16,
    pub endpoint_id: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_attribute: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadClusterAttributesResult {
    pub device: ExtendedDeviceInfo,
    pub cluster: ClusterRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_code: Option<u16>,
    /// Attribute name to value for every attribute read back.
    #[serde(default)]
    pub succeeded: BTreeMap<String, Value>,
    /// Attribute name to status for every attribute that could not be read.
    #[serde(default)]
    pub failed: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatus {
    pub attribute: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteClusterAttributeResult {
    pub device: ExtendedDeviceInfo,
    pub cluster: ClusterRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_code: Option<u16>,
    pub response: AttributeStatus,
}

/// Typed body of a successful result.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Empty,
    Devices(BTreeMap<Ieee, ExtendedDeviceInfo>),
    Groups(BTreeMap<u16, GroupInfo>),
    Group(Box<GroupInfo>),
    PermitJoining {
        duration: Option<u8>,
        ieee: Option<Ieee>,
    },
    ClusterAttributes(Box<ReadClusterAttributesResult>),
    AttributeWrite(Box<WriteClusterAttributeResult>),
    ApplicationState(Map<String, Value>),
}

#[derive(Serialize, Deserialize)]
struct DevicesBody<T> {
    devices: T,
}

#[derive(Serialize, Deserialize)]
struct GroupsBody<T> {
    groups: T,
}

#[derive(Serialize, Deserialize)]
struct GroupBody<T> {
    group: T,
}

#[derive(Serialize, Deserialize)]
struct PermitJoiningBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ieee: Option<Ieee>,
}

#[derive(Serialize, Deserialize)]
struct ApplicationStateBody {
    #[serde(default)]
    state: Map<String, Value>,
}

impl ResponsePayload {
    /// Decode the payload fields of a successful `kind` result. Envelope
    /// fields must already be removed.
    pub fn decode(kind: CommandKind, fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let body = Value::Object(fields);
        let payload = match kind {
            CommandKind::GetDevices => {
                Self::Devices(serde_json::from_value::<DevicesBody<_>>(body)?.devices)
            }
            CommandKind::GetGroups | CommandKind::RemoveGroups => {
                Self::Groups(serde_json::from_value::<GroupsBody<_>>(body)?.groups)
            }
            CommandKind::CreateGroup
            | CommandKind::AddGroupMembers
            | CommandKind::RemoveGroupMembers => {
                Self::Group(Box::new(serde_json::from_value::<GroupBody<_>>(body)?.group))
            }
            CommandKind::PermitJoining => {
                let body: PermitJoiningBody = serde_json::from_value(body)?;
                Self::PermitJoining {
                    duration: body.duration,
                    ieee: body.ieee,
                }
            }
            CommandKind::ReadClusterAttributes => {
                Self::ClusterAttributes(Box::new(serde_json::from_value(body)?))
            }
            CommandKind::WriteClusterAttribute => {
                Self::AttributeWrite(Box::new(serde_json::from_value(body)?))
            }
            CommandKind::GetApplicationState => Self::ApplicationState(
                serde_json::from_value::<ApplicationStateBody>(body)?.state,
            ),
            _ => Self::Empty,
        };
        Ok(payload)
    }

    /// Wire fields for this payload, without the envelope.
    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            Self::Empty => return Ok(Map::new()),
            Self::Devices(devices) => serde_json::to_value(DevicesBody { devices })?,
            Self::Groups(groups) => serde_json::to_value(GroupsBody { groups })?,
            Self::Group(group) => serde_json::to_value(GroupBody {
                group: group.as_ref(),
            })?,
            Self::PermitJoining { duration, ieee } => serde_json::to_value(PermitJoiningBody {
                duration: *duration,
                ieee: *ieee,
            })?,
            Self::ClusterAttributes(result) => serde_json::to_value(result)?,
            Self::AttributeWrite(result) => serde_json::to_value(result)?,
            Self::ApplicationState(state) => {
                let mut fields = Map::new();
                fields.insert("state".to_owned(), Value::Object(state.clone()));
                return Ok(fields);
            }
        };
        Ok(into_map(value))
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ── Failures ────────────────────────────────────────────────────────

/// Error body of a `success: false` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub radio: Option<RadioOperationError>,
}

#[derive(Serialize, Deserialize)]
struct ErrorBody {
    error_code: String,
    #[serde(default)]
    error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zigbee_error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zigbee_error_message: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            radio: None,
        }
    }

    /// A failure raised by the radio stack.
    pub fn radio(code: impl Into<String>, message: Option<String>) -> Self {
        let radio = RadioOperationError {
            code: code.into(),
            message,
        };
        Self {
            code: codes::RADIO.to_owned(),
            message: radio.to_string(),
            radio: Some(radio),
        }
    }

    pub fn decode(fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let body: ErrorBody = serde_json::from_value(Value::Object(fields))?;
        let radio = match (body.error_code.as_str(), body.zigbee_error_code) {
            (codes::RADIO, Some(code)) => Some(RadioOperationError {
                code,
                message: body.zigbee_error_message,
            }),
            _ => None,
        };
        Ok(Self {
            code: body.error_code,
            message: body.error_message,
            radio,
        })
    }

    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let body = ErrorBody {
            error_code: self.code.clone(),
            error_message: self.message.clone(),
            zigbee_error_code: self.radio.as_ref().map(|r| r.code.clone()),
            zigbee_error_message: self.radio.as_ref().and_then(|r| r.message.clone()),
        };
        Ok(into_map(serde_json::to_value(body)?))
    }
}

// ── Envelope-level result ───────────────────────────────────────────

/// One `message_type: "result"` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub message_id: u32,
    pub command: CommandKind,
    pub outcome: Result<ResponsePayload, ErrorDetail>,
}

impl CommandResponse {
    pub fn success(message_id: u32, command: CommandKind, payload: ResponsePayload) -> Self {
        Self {
            message_id,
            command,
            outcome: Ok(payload),
        }
    }

    pub fn failure(message_id: u32, command: CommandKind, error: ErrorDetail) -> Self {
        Self {
            message_id,
            command,
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Split into the payload or a [`CommandError`] naming this request.
    pub fn into_result(self) -> Result<ResponsePayload, CommandError> {
        self.outcome.map_err(|detail| CommandError {
            message_id: self.message_id,
            command: self.command,
            code: detail.code,
            message: detail.message,
            radio: detail.radio,
        })
    }
}
