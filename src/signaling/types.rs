use std::borrow::Borrow;
use std::fmt;

use axum::extract::ws::Utf8Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signaling errors, reported to the originating connection only.
///
/// The `Display` text of each variant is the exact message carried in the
/// `joined` reply envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Auth(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    pub const ROOM_NAME_REQUIRED: Self = Self::Validation("Room name is required");
    pub const ROOM_EXISTS: Self = Self::Conflict("Room already exists");
    pub const ROOM_NOT_FOUND: Self = Self::NotFound("Room not found");
    pub const TARGET_NOT_FOUND: Self = Self::NotFound("Target not found in room");
    pub const INVALID_PASSWORD: Self = Self::Auth("Invalid password");
}

const CONNECTION_ID_PREFIX: &str = "conn_";
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Transport-assigned identifier of one live client session ("conn_" + 16 hex).
///
/// Clients echo these back as `target` / `host_id`, so any string is accepted
/// on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let value: u64 = rng.random();

        let mut id = String::with_capacity(CONNECTION_ID_PREFIX.len() + 16);
        id.push_str(CONNECTION_ID_PREFIX);
        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            id.push(HEX_CHARS[nibble] as char);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Client-chosen room name. Case-sensitive, compared byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for RoomName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Serialized server envelope, shared between recipients without re-encoding.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for a WebSocket text frame
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// A room record. Lives in the relay's mapping until its host disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub host: ConnectionId,
    /// Empty means no password is required. Fixed at creation.
    pub password: String,
    /// Insertion-ordered, no duplicates.
    pub members: Vec<ConnectionId>,
}

impl Room {
    pub fn new(host: ConnectionId, password: String) -> Self {
        Self {
            members: vec![host.clone()],
            host,
            password,
        }
    }

    pub fn is_member(&self, conn: &ConnectionId) -> bool {
        self.members.contains(conn)
    }

    /// Returns false if `conn` was already a member.
    pub fn add_member(&mut self, conn: &ConnectionId) -> bool {
        if self.is_member(conn) {
            return false;
        }
        self.members.push(conn.clone());
        true
    }

    pub fn remove_member(&mut self, conn: &ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != conn);
        self.members.len() != before
    }

    pub fn accepts_password(&self, password: &str) -> bool {
        self.password.is_empty() || self.password == password
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_generate_has_correct_format() {
        let id = ConnectionId::generate();
        assert!(id.as_str().starts_with("conn_"));
        assert_eq!(id.as_str().len(), 21);
        assert!(id.as_str()[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn connection_ids_are_distinct() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn connection_id_keeps_long_client_strings_intact() {
        let id = ConnectionId::from("a-very-long-socket-identifier-from-a-client");
        assert_eq!(id.as_str(), "a-very-long-socket-identifier-from-a-client");
    }

    #[test]
    fn room_name_is_case_sensitive() {
        assert_ne!(RoomName::from("Table1"), RoomName::from("table1"));
    }

    #[test]
    fn room_name_serialization() {
        let json = serde_json::to_string(&RoomName::from("table1")).unwrap();
        assert_eq!(json, "\"table1\"");
        let name: RoomName = serde_json::from_str("\"table1\"").unwrap();
        assert_eq!(name.as_str(), "table1");
    }

    #[test]
    fn error_messages_match_wire_text() {
        assert_eq!(
            SignalingError::ROOM_NAME_REQUIRED.to_string(),
            "Room name is required"
        );
        assert_eq!(SignalingError::ROOM_EXISTS.to_string(), "Room already exists");
        assert_eq!(SignalingError::ROOM_NOT_FOUND.to_string(), "Room not found");
        assert_eq!(SignalingError::INVALID_PASSWORD.to_string(), "Invalid password");
    }

    #[test]
    fn room_starts_with_host_as_only_member() {
        let host = ConnectionId::from("h");
        let room = Room::new(host.clone(), String::new());
        assert_eq!(room.members, vec![host]);
    }

    #[test]
    fn room_add_member_is_idempotent() {
        let mut room = Room::new(ConnectionId::from("h"), String::new());
        let guest = ConnectionId::from("g");
        assert!(room.add_member(&guest));
        assert!(!room.add_member(&guest));
        assert_eq!(room.members.len(), 2);
    }

    #[test]
    fn room_remove_member_reports_presence() {
        let mut room = Room::new(ConnectionId::from("h"), String::new());
        assert!(room.remove_member(&ConnectionId::from("h")));
        assert!(!room.remove_member(&ConnectionId::from("h")));
        assert!(room.members.is_empty());
    }

    #[test]
    fn room_password_check() {
        let open = Room::new(ConnectionId::from("h"), String::new());
        assert!(open.accepts_password(""));
        assert!(open.accepts_password("anything"));

        let locked = Room::new(ConnectionId::from("h"), "abc".to_string());
        assert!(locked.accepts_password("abc"));
        assert!(!locked.accepts_password("xyz"));
        assert!(!locked.accepts_password(""));
        assert!(!locked.accepts_password("ABC"));
    }

    #[test]
    fn outbound_message_round_trips_text() {
        let msg = OutboundMessage::from("{\"event\":\"joined\"}".to_string());
        assert_eq!(msg.as_str(), "{\"event\":\"joined\"}");
        assert_eq!(msg.clone().into_inner().as_str(), "{\"event\":\"joined\"}");
    }
}
