//! Room-based WebRTC signaling relay

mod actor;
mod hub;
mod messages;
mod polling;
mod relay;
mod server;
mod types;

pub use actor::RelayHandle;
pub use hub::{Hub, Transport};
pub use messages::{ClientEvent, JoinRequest, JoinResponse, JoinStatus, Payload, ServerEvent};
pub use polling::PollSessions;
pub use relay::Relay;
pub use server::{LIVENESS_TEXT, SignalingServer};
pub use types::{ConnectionId, OutboundMessage, Room, RoomName, SignalingError};
