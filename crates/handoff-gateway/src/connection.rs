use chrono::{DateTime, Utc};
use dashmap::DashMap;
use handoff_core::{ClientRole, OutboundFrame};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A connected customer or staff client.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    pub session_id: String,
    pub role: ClientRole,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Arc<str>>,
    evicted: CancellationToken,
}

impl Connection {
    /// Creates a connection with a bounded outbound queue of `capacity`
    /// frames, returning the receiving end for the socket writer.
    pub fn channel(
        session_id: impl Into<String>,
        role: ClientRole,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role,
            connected_at: Utc::now(),
            tx,
            evicted: CancellationToken::new(),
        };
        (Arc::new(conn), rx)
    }

    /// Queues a serialized frame without waiting.
    ///
    /// Returns `false` if the queue is full or the writer is gone.
    pub fn send(&self, payload: Arc<str>) -> bool {
        self.tx.try_send(payload).is_ok()
    }

    /// Serializes and queues a single frame for this connection only.
    pub fn send_frame(&self, frame: &OutboundFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.send(json.into()),
            Err(e) => {
                tracing::warn!(connection_id = %self.id, error = %e, "Failed to serialize frame");
                false
            }
        }
    }

    /// Signals the connection's loop that the hub has dropped it.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    /// Resolves once [`evict`](Self::evict) has been called.
    pub async fn evicted(&self) {
        self.evicted.cancelled().await;
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }
}

/// Live connections grouped by session.
///
/// Each session's member list is a single map entry, so registration,
/// removal and fan-out on one session are linearizable with respect to each
/// other while different sessions proceed independently. Entries whose last
/// member leaves are reclaimed; session state lives in the session manager
/// and is unaffected.
pub struct ConnectionRegistry {
    sessions: DashMap<String, Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, conn: Arc<Connection>) {
        let (id, session_id, role) = (conn.id, conn.session_id.clone(), conn.role);
        self.sessions.entry(session_id.clone()).or_default().push(conn);
        tracing::info!(
            connection_id = %id,
            session_id = %session_id,
            role = %role,
            "Connection registered"
        );
    }

    /// Removes the connection. Removing one that is already gone is a no-op;
    /// the return value tells whether anything was removed.
    pub fn unregister(&self, conn: &Connection) -> bool {
        let removed = match self.sessions.get_mut(&conn.session_id) {
            Some(mut members) => {
                let before = members.len();
                members.retain(|c| c.id != conn.id);
                members.len() != before
            }
            None => false,
        };
        if removed {
            self.reclaim(&conn.session_id);
            tracing::info!(
                connection_id = %conn.id,
                session_id = %conn.session_id,
                "Connection removed"
            );
        }
        removed
    }

    /// Snapshot of a session's connections.
    pub fn members(&self, session_id: &str) -> Vec<Arc<Connection>> {
        self.sessions
            .get(session_id)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    pub fn members_by_role(&self, session_id: &str, role: ClientRole) -> Vec<Arc<Connection>> {
        self.sessions
            .get(session_id)
            .map(|members| members.iter().filter(|c| c.role == role).cloned().collect())
            .unwrap_or_default()
    }

    /// Sessions with at least one live connection.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Runs `f` with exclusive access to a session's member list.
    pub(crate) fn with_members<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Vec<Arc<Connection>>) -> R,
    ) -> Option<R> {
        let result = {
            let mut members = self.sessions.get_mut(session_id)?;
            f(members.value_mut())
        };
        self.reclaim(session_id);
        Some(result)
    }

    fn reclaim(&self, session_id: &str) {
        self.sessions.remove_if(session_id, |_, members| members.is_empty());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}
