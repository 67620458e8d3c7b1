use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::hub::{Hub, Transport};
use super::messages::{ClientEvent, ServerEvent};
use super::relay::Relay;
use super::types::{ConnectionId, OutboundMessage, Room, SignalingError};

/// Commands sent to the relay actor
pub(crate) enum RelayCommand {
    Connect {
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Event {
        conn: ConnectionId,
        event: ClientEvent,
    },
    Disconnect {
        conn: ConnectionId,
    },
    RoomInfo {
        name: String,
        reply: oneshot::Sender<Option<Room>>,
    },
}

/// Owns the room mapping and the hub. Commands are handled strictly one at a
/// time, so every relay operation runs to completion before the next starts.
pub(crate) async fn relay_actor(mut rx: mpsc::Receiver<RelayCommand>) {
    let mut relay = Relay::new();
    let mut hub = Hub::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RelayCommand::Connect { peer_tx, reply } => {
                let conn = ConnectionId::generate();
                hub.register(conn.clone(), peer_tx);
                match (ServerEvent::Connected { sid: conn.clone() }).encode() {
                    Ok(msg) => {
                        hub.send_to(&conn, msg);
                    }
                    Err(e) => warn!("Failed to greet {}: {}", conn, e),
                }
                info!("Client connected: {}", conn);
                let _ = reply.send(conn);
            }

            RelayCommand::Event { conn, event } => {
                if hub.is_connected(&conn) {
                    relay.handle_event(&mut hub, &conn, event);
                }
            }

            RelayCommand::Disconnect { conn } => {
                relay.disconnect(&conn);
                hub.unregister(&conn);
                info!("Client disconnected: {}", conn);
            }

            RelayCommand::RoomInfo { name, reply } => {
                let _ = reply.send(relay.room(&name).cloned());
            }
        }
    }
}

/// Handle to communicate with the relay actor
#[derive(Clone)]
pub struct RelayHandle {
    pub(crate) tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Spawn the actor on the current runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<RelayCommand>(1024);
        tokio::spawn(relay_actor(rx));
        Self { tx }
    }

    /// Register a new connection whose outbound envelopes go to `peer_tx`.
    pub async fn connect(
        &self,
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ConnectionId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RelayCommand::Connect {
            peer_tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    /// Submit one client event. Replies, if any, arrive on the connection's
    /// outbound channel.
    pub async fn submit(
        &self,
        conn: &ConnectionId,
        event: ClientEvent,
    ) -> Result<(), SignalingError> {
        self.send(RelayCommand::Event {
            conn: conn.clone(),
            event,
        })
        .await
    }

    pub async fn disconnect(&self, conn: &ConnectionId) {
        let _ = self
            .send(RelayCommand::Disconnect { conn: conn.clone() })
            .await;
    }

    /// Snapshot of a room record, if it exists.
    pub async fn room(&self, name: &str) -> Result<Option<Room>, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RelayCommand::RoomInfo {
            name: name.to_owned(),
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    async fn send(&self, cmd: RelayCommand) -> Result<(), SignalingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }
}
