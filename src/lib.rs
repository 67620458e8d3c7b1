//! Minimal WebRTC signaling relay.
//!
//! Clients create or join named rooms and exchange opaque SDP/ICE payloads,
//! which the server routes to a single peer in the same room. Room state
//! lives only in process memory.

pub mod config;
pub mod signaling;
