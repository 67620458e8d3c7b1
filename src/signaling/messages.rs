use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::types::{ConnectionId, OutboundMessage, RoomName, SignalingError};

/// Opaque event body, forwarded verbatim.
pub type Payload = Map<String, Value>;

/// Events sent from client to server: `{"event": "...", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Create (as host) or join a room
    Join(JoinRequest),

    /// Relay a payload to one member of a room
    Signal(Payload),

    /// Announce a new host to everyone subscribed to the room
    HostAvailable(Payload),
}

/// Join fields are read leniently: a field of the wrong JSON type never
/// rejects the envelope, so the caller always gets a `joined` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Non-string names read as absent.
    #[serde(default, deserialize_with = "string_or_none")]
    pub room: Option<String>,
    /// Falsy values read as no password, other scalars as their JSON text.
    #[serde(default, deserialize_with = "truthy_text")]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "truthy_flag")]
    pub is_host: Option<bool>,
}

fn string_or_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn truthy_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if !truthy(&value) {
        return Ok(None);
    }
    match value {
        Value::String(s) => Ok(Some(s)),
        other => Ok(Some(other.to_string())),
    }
}

fn truthy_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Value::deserialize(deserializer).map(|value| Some(truthy(&value)))
}

/// JSON truthiness: `null`, `false`, `0` and `""` are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl JoinRequest {
    pub fn host(room: &str, password: &str) -> Self {
        Self {
            room: Some(room.to_owned()),
            password: Some(password.to_owned()),
            is_host: Some(true),
        }
    }

    pub fn guest(room: &str, password: &str) -> Self {
        Self {
            room: Some(room.to_owned()),
            password: Some(password.to_owned()),
            is_host: Some(false),
        }
    }

    /// `None` when the name is absent or empty.
    pub fn room_name(&self) -> Option<RoomName> {
        self.room
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(RoomName::from)
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    pub fn is_host(&self) -> bool {
        self.is_host.unwrap_or(false)
    }
}

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once on connect with the transport-assigned id
    Connected { sid: ConnectionId },

    /// Reply to `join`, caller only
    Joined(JoinResponse),

    /// Forwarded `signal` payload
    Signal(Payload),

    /// Forwarded `host_available` payload
    HostAvailable(Payload),
}

impl ServerEvent {
    pub fn encode(&self) -> Result<OutboundMessage, SignalingError> {
        serde_json::to_string(self)
            .map(OutboundMessage::from)
            .map_err(|e| SignalingError::Internal(format!("encode failed: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub status: JoinStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomName>,
}

impl JoinResponse {
    pub fn created(room: RoomName) -> Self {
        Self {
            status: JoinStatus::Success,
            message: "Room created successfully".to_string(),
            room: Some(room),
        }
    }

    pub fn joined(room: RoomName) -> Self {
        Self {
            status: JoinStatus::Success,
            message: "Joined room successfully".to_string(),
            room: Some(room),
        }
    }

    pub fn error(err: &SignalingError) -> Self {
        Self {
            status: JoinStatus::Error,
            message: err.to_string(),
            room: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JoinStatus::Success
    }
}

/// String field of a payload, if present and a string.
pub fn str_field<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}
