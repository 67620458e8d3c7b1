//! Long-polling sessions, the fallback for clients that cannot upgrade.
//!
//! Each session owns the receiving end of its connection's outbound channel.
//! A `GET` drains it, waiting up to the poll timeout for the first envelope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::value::RawValue;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::types::{ConnectionId, OutboundMessage};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<OutboundMessage>>>;

struct PollSession {
    rx: SharedReceiver,
    last_seen: Instant,
}

#[derive(Clone, Default)]
pub struct PollSessions {
    inner: Arc<Mutex<HashMap<ConnectionId, PollSession>>>,
}

impl PollSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: ConnectionId, rx: mpsc::UnboundedReceiver<OutboundMessage>) {
        let session = PollSession {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            last_seen: Instant::now(),
        };
        self.lock().insert(conn, session);
    }

    /// Mark the session as alive. Returns false for unknown sessions.
    pub fn touch(&self, conn: &ConnectionId) -> bool {
        match self.lock().get_mut(conn) {
            Some(session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, conn: &ConnectionId) -> bool {
        self.lock().remove(conn).is_some()
    }

    #[cfg(test)]
    fn contains(&self, conn: &ConnectionId) -> bool {
        self.lock().contains_key(conn)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    /// Wait up to `wait` for outbound envelopes and return everything queued.
    ///
    /// `None` means the session does not exist.
    pub async fn poll(&self, conn: &ConnectionId, wait: Duration) -> Option<Vec<OutboundMessage>> {
        let rx = {
            let mut sessions = self.lock();
            let session = sessions.get_mut(conn)?;
            session.last_seen = Instant::now();
            session.rx.clone()
        };

        let mut batch = Vec::new();
        {
            let mut rx = rx.lock().await;
            if let Ok(Some(first)) = tokio::time::timeout(wait, rx.recv()).await {
                batch.push(first);
                while let Ok(msg) = rx.try_recv() {
                    batch.push(msg);
                }
            }
        }

        self.touch(conn);
        Some(batch)
    }

    /// Remove and return sessions idle for longer than `idle`.
    pub fn take_expired(&self, idle: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.lock().retain(|conn, session| {
            let alive = now.duration_since(session.last_seen) <= idle;
            if !alive {
                expired.push(conn.clone());
            }
            alive
        });
        expired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, PollSession>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// JSON array body for a batch of already-encoded envelopes.
pub fn encode_batch(batch: &[OutboundMessage]) -> serde_json::Result<String> {
    let envelopes = batch
        .iter()
        .map(|msg| serde_json::from_str::<&RawValue>(msg.as_str()))
        .collect::<serde_json::Result<Vec<_>>>()?;
    serde_json::to_string(&envelopes)
}
