//! Room bookkeeping and message routing.
//!
//! [`Relay`] owns the room mapping and is driven one event at a time; every
//! operation runs to completion, so the mapping needs no locking as long as a
//! single task owns the relay (see [`super::actor`]).

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::hub::Transport;
use super::messages::{ClientEvent, JoinRequest, JoinResponse, Payload, ServerEvent, str_field};
use super::types::{ConnectionId, Room, RoomName, SignalingError};

#[derive(Debug, Default)]
pub struct Relay {
    rooms: HashMap<RoomName, Room>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Dispatch one client event. Join outcomes are replied to the caller;
    /// undeliverable signals and announcements are logged and dropped.
    pub fn handle_event<T: Transport>(
        &mut self,
        transport: &mut T,
        conn: &ConnectionId,
        event: ClientEvent,
    ) {
        match event {
            ClientEvent::Join(req) => {
                let response = match self.join(transport, conn, &req) {
                    Ok(response) => response,
                    Err(e) => {
                        debug!("Join from {} rejected: {}", conn, e);
                        JoinResponse::error(&e)
                    }
                };
                match ServerEvent::Joined(response).encode() {
                    Ok(msg) => {
                        transport.send_to(conn, msg);
                    }
                    Err(e) => warn!("Failed to reply to {}: {}", conn, e),
                }
            }

            ClientEvent::Signal(payload) => {
                if let Err(e) = self.signal(transport, payload) {
                    debug!("Signal from {} dropped: {}", conn, e);
                }
            }

            ClientEvent::HostAvailable(payload) => {
                if let Err(e) = self.host_available(transport, payload) {
                    debug!("host_available from {} dropped: {}", conn, e);
                }
            }
        }
    }

    /// Create a room as host or join an existing one as guest.
    ///
    /// On success the caller is subscribed to the room's broadcast group.
    pub fn join<T: Transport>(
        &mut self,
        transport: &mut T,
        conn: &ConnectionId,
        req: &JoinRequest,
    ) -> Result<JoinResponse, SignalingError> {
        let name = req.room_name().ok_or(SignalingError::ROOM_NAME_REQUIRED)?;

        debug!(
            "Join request: room={}, is_host={}, has_password={}",
            name,
            req.is_host(),
            !req.password().is_empty()
        );

        if req.is_host() {
            if self.rooms.contains_key(&name) {
                return Err(SignalingError::ROOM_EXISTS);
            }

            self.rooms.insert(
                name.clone(),
                Room::new(conn.clone(), req.password().to_owned()),
            );
            transport.subscribe(conn, &name);

            info!("Room {} created by {}", name, conn);
            Ok(JoinResponse::created(name))
        } else {
            let room = self
                .rooms
                .get_mut(&name)
                .ok_or(SignalingError::ROOM_NOT_FOUND)?;

            if !room.accepts_password(req.password()) {
                return Err(SignalingError::INVALID_PASSWORD);
            }

            room.add_member(conn);
            transport.subscribe(conn, &name);

            info!("{} joined room {}", conn, name);
            Ok(JoinResponse::joined(name))
        }
    }

    /// Forward `payload` verbatim to `target` if it is a member of `room`.
    pub fn signal<T: Transport>(
        &self,
        transport: &mut T,
        payload: Payload,
    ) -> Result<(), SignalingError> {
        let room_name = str_field(&payload, "room").ok_or(SignalingError::ROOM_NOT_FOUND)?;
        let room = self
            .rooms
            .get(room_name)
            .ok_or(SignalingError::ROOM_NOT_FOUND)?;

        let target = str_field(&payload, "target")
            .map(ConnectionId::from)
            .ok_or(SignalingError::Validation("Signal target is required"))?;
        if !room.is_member(&target) {
            return Err(SignalingError::TARGET_NOT_FOUND);
        }

        info!(
            "Forwarding signal from {} to {}",
            str_field(&payload, "sender").unwrap_or("<unknown>"),
            target
        );
        let msg = ServerEvent::Signal(payload).encode()?;
        transport.send_to(&target, msg);
        Ok(())
    }

    /// Reassign the room's host and rebroadcast the payload to its group,
    /// sender included.
    pub fn host_available<T: Transport>(
        &mut self,
        transport: &mut T,
        payload: Payload,
    ) -> Result<(), SignalingError> {
        let room_name = str_field(&payload, "room").ok_or(SignalingError::ROOM_NOT_FOUND)?;
        let host_id = str_field(&payload, "host_id")
            .map(ConnectionId::from)
            .ok_or(SignalingError::Validation("Host id is required"))?;
        let room = self
            .rooms
            .get_mut(room_name)
            .ok_or(SignalingError::ROOM_NOT_FOUND)?;

        room.host = host_id;
        info!("Host {} available in room {}", room.host, room_name);

        let group = RoomName::from(room_name);
        let msg = ServerEvent::HostAvailable(payload).encode()?;
        transport.send_to_group(&group, msg);
        Ok(())
    }

    /// Remove `conn` from every room and delete the rooms it hosted.
    ///
    /// Returns the names of the deleted rooms. Remaining members are not
    /// notified.
    pub fn disconnect(&mut self, conn: &ConnectionId) -> Vec<RoomName> {
        let mut doomed = Vec::new();

        for (name, room) in self.rooms.iter_mut() {
            if room.remove_member(conn) {
                debug!("{} removed from room {}", conn, name);
            }
            if room.host == *conn {
                doomed.push(name.clone());
            }
        }

        for name in &doomed {
            if self.rooms.remove(name).is_some() {
                info!("Room {} deleted (host {} disconnected)", name, conn);
            }
        }

        doomed
    }
}
