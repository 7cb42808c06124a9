use serde_json::{Map, Value};

use crate::command::{Command, CommandKind};
use crate::error::{DecodeError, TransportError};
use crate::event::Event;
use crate::response::{CommandResponse, ErrorDetail, ResponsePayload};

const MESSAGE_TYPE: &str = "message_type";
const MESSAGE_ID: &str = "message_id";
const COMMAND: &str = "command";
const SUCCESS: &str = "success";

/// Top-level discriminator of every frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    Command,
    Result,
    Event,
}

/// A command together with its correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    pub message_id: u32,
    pub command: Command,
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Command(CommandMessage),
    Result(CommandResponse),
    Event(Event),
}

/// Parse a text frame into a JSON object.
pub fn parse_frame(text: &str) -> Result<Map<String, Value>, TransportError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TransportError::InvalidJson(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(TransportError::InvalidJson(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Command(_) => MessageType::Command,
            Self::Result(_) => MessageType::Result,
            Self::Event(_) => MessageType::Event,
        }
    }

    pub fn message_id(&self) -> Option<u32> {
        match self {
            Self::Command(cmd) => Some(cmd.message_id),
            Self::Result(result) => Some(result.message_id),
            Self::Event(_) => None,
        }
    }

    /// Decode one frame object.
    ///
    /// On failure the error carries the message type and id when those could
    /// still be read, so a broken result can be routed to its waiter.
    pub fn decode(mut fields: Map<String, Value>) -> Result<Self, DecodeError> {
        let message_type = match fields.remove(MESSAGE_TYPE) {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(DecodeError::new(format!(
                    "`message_type` must be a string, got {}",
                    json_kind(&other)
                )));
            }
            None => return Err(DecodeError::new("missing `message_type`")),
        };
        let message_id = take_message_id(&mut fields).map_err(|e| e.in_message(&message_type, None))?;
        let in_message = |e: DecodeError| e.in_message(&message_type, message_id);

        match message_type.parse::<MessageType>() {
            Ok(MessageType::Command) => {
                let message_id = message_id.ok_or_else(|| in_message(missing_id()))?;
                let command = serde_json::from_value(Value::Object(fields))
                    .map_err(|e| in_message(e.into()))?;
                Ok(Self::Command(CommandMessage {
                    message_id,
                    command,
                }))
            }
            Ok(MessageType::Result) => {
                let message_id = message_id.ok_or_else(|| in_message(missing_id()))?;
                decode_result(message_id, fields)
                    .map(Self::Result)
                    .map_err(in_message)
            }
            Ok(MessageType::Event) => Event::decode(fields).map(Self::Event).map_err(in_message),
            Err(_) => Err(in_message(DecodeError::new(format!(
                "unknown message_type `{message_type}`"
            )))),
        }
    }

    /// Encode into a frame object with the envelope fields in place.
    pub fn encode(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut fields = match self {
            Self::Command(cmd) => {
                let mut fields = match serde_json::to_value(&cmd.command)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                fields.insert(MESSAGE_ID.to_owned(), Value::from(cmd.message_id));
                fields
            }
            Self::Result(result) => {
                let mut fields = match &result.outcome {
                    Ok(payload) => payload.to_fields()?,
                    Err(detail) => detail.to_fields()?,
                };
                fields.insert(MESSAGE_ID.to_owned(), Value::from(result.message_id));
                fields.insert(COMMAND.to_owned(), Value::from(result.command.to_string()));
                fields.insert(SUCCESS.to_owned(), Value::from(result.is_success()));
                fields
            }
            Self::Event(event) => event.to_fields()?,
        };
        let message_type: &'static str = self.message_type().into();
        fields.insert(MESSAGE_TYPE.to_owned(), Value::from(message_type));
        Ok(fields)
    }

    /// Encode to frame text.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.encode()?)
    }
}

fn missing_id() -> DecodeError {
    DecodeError::new("missing `message_id`")
}

fn take_message_id(fields: &mut Map<String, Value>) -> Result<Option<u32>, DecodeError> {
    match fields.remove(MESSAGE_ID) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|id| u32::try_from(id).ok())
            .map(Some)
            .ok_or_else(|| DecodeError::new(format!("`message_id` {n} out of range"))),
        Some(other) => Err(DecodeError::new(format!(
            "`message_id` must be an integer, got {}",
            json_kind(&other)
        ))),
    }
}

fn decode_result(
    message_id: u32,
    mut fields: Map<String, Value>,
) -> Result<CommandResponse, DecodeError> {
    let command: CommandKind = match fields.remove(COMMAND) {
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| DecodeError::new(format!("unknown command `{s}` in result")))?,
        _ => return Err(DecodeError::new("result without a `command` string")),
    };
    let success = fields
        .remove(SUCCESS)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| DecodeError::new("result without a boolean `success`"))?;
    let outcome = if success {
        Ok(ResponsePayload::decode(command, fields)
            .map_err(|e| DecodeError::new(format!("{command} payload: {e}")))?)
    } else {
        Err(ErrorDetail::decode(fields)
            .map_err(|e| DecodeError::new(format!("{command} error: {e}")))?)
    };
    Ok(CommandResponse {
        message_id,
        command,
        outcome,
    })
}
