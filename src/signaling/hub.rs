//! Connection registry and broadcast groups.
//!
//! The relay never touches sockets. It only needs to address one connection
//! or every subscriber of a named group; [`Transport`] is that seam and [`Hub`]
//! is the in-process implementation backed by per-connection channels.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use super::types::{ConnectionId, OutboundMessage, RoomName};

/// Delivery capability the relay depends on.
pub trait Transport {
    /// Subscribe `conn` to `group`. Idempotent.
    fn subscribe(&mut self, conn: &ConnectionId, group: &RoomName);

    /// Deliver to a single connection. Returns false if it is not connected.
    fn send_to(&self, conn: &ConnectionId, msg: OutboundMessage) -> bool;

    /// Deliver to every subscriber of `group`. Returns the number reached.
    fn send_to_group(&self, group: &RoomName, msg: OutboundMessage) -> usize;
}

#[derive(Debug, Default)]
pub struct Hub {
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<OutboundMessage>>,
    groups: HashMap<RoomName, Vec<ConnectionId>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) {
        self.connections.insert(conn, tx);
    }

    /// Drop the connection and all of its group subscriptions.
    pub fn unregister(&mut self, conn: &ConnectionId) {
        self.connections.remove(conn);
        self.groups.retain(|_, subscribers| {
            subscribers.retain(|c| c != conn);
            !subscribers.is_empty()
        });
    }

    pub fn is_connected(&self, conn: &ConnectionId) -> bool {
        self.connections.contains_key(conn)
    }

    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscribers(&self, group: &RoomName) -> &[ConnectionId] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Transport for Hub {
    fn subscribe(&mut self, conn: &ConnectionId, group: &RoomName) {
        let subscribers = self.groups.entry(group.clone()).or_default();
        if !subscribers.contains(conn) {
            subscribers.push(conn.clone());
        }
    }

    fn send_to(&self, conn: &ConnectionId, msg: OutboundMessage) -> bool {
        match self.connections.get(conn) {
            Some(tx) => tx.send(msg).is_ok(),
            None => {
                debug!("No live connection {}", conn);
                false
            }
        }
    }

    fn send_to_group(&self, group: &RoomName, msg: OutboundMessage) -> usize {
        self.subscribers(group)
            .iter()
            .filter(|conn| self.send_to(conn, msg.clone()))
            .count()
    }
}
