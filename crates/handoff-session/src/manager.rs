use crate::archive::{ArchivedSession, HistoryArchive};
use crate::history::ChatHistoryBuffer;
use crate::session::SessionState;
use chrono::Utc;
use dashmap::DashMap;
use handoff_core::HandoffResult;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Shared, per-session exclusive access to a [`SessionState`].
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// In-process table of live sessions, created lazily on first use.
///
/// Each session sits behind its own mutex, so work on different sessions
/// never contends. When an archive is attached, a session unknown to this
/// process is first looked up there so history survives restarts.
pub struct SessionManager {
    sessions: DashMap<String, SessionHandle>,
    max_turns_for_prompt: usize,
    archive: Option<Arc<dyn HistoryArchive>>,
}

impl SessionManager {
    pub fn new(max_turns_for_prompt: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_turns_for_prompt,
            archive: None,
        }
    }

    /// Attach durable storage used for restore and [`archive`](Self::archive).
    pub fn with_archive(mut self, archive: Arc<dyn HistoryArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Returns the session, creating (or restoring) it on first use.
    ///
    /// A non-empty `customer_id` is adopted if the session has none yet.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        customer_id: Option<&str>,
    ) -> SessionHandle {
        let existing = self.sessions.get(session_id).map(|h| Arc::clone(h.value()));
        let handle = match existing {
            Some(handle) => handle,
            None => self.create(session_id).await,
        };
        if let Some(cid) = customer_id.filter(|c| !c.is_empty()) {
            handle.lock().await.adopt_customer_id(cid);
        }
        handle
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|h| Arc::clone(h.value()))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Copies out the full state of a known session.
    pub async fn snapshot(&self, session_id: &str) -> Option<ArchivedSession> {
        let handle = self.get(session_id)?;
        let state = handle.lock().await;
        Some(snapshot_of(&state))
    }

    /// Hands the session's full history to the archive, if one is attached.
    ///
    /// The session stays locked until the save completes, so saves of one
    /// session land in the order their snapshots were taken.
    pub async fn archive(&self, session_id: &str) -> HandoffResult<()> {
        let Some(archive) = &self.archive else {
            return Ok(());
        };
        let Some(handle) = self.get(session_id) else {
            return Ok(());
        };
        let state = handle.lock().await;
        let snapshot = snapshot_of(&state);
        archive.save(&snapshot).await?;
        debug!(session_id, turns = snapshot.turns.len(), "Session archived");
        Ok(())
    }

    async fn create(&self, session_id: &str) -> SessionHandle {
        let state = self.restore_or_new(session_id).await;
        // Another task may have created the session while we were loading.
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(state)));
        Arc::clone(entry.value())
    }

    async fn restore_or_new(&self, session_id: &str) -> SessionState {
        if let Some(archive) = &self.archive {
            match archive.load(session_id).await {
                Ok(Some(archived)) => {
                    info!(
                        session_id,
                        turns = archived.turns.len(),
                        "Session restored from archive"
                    );
                    let history =
                        ChatHistoryBuffer::from_turns(archived.turns, self.max_turns_for_prompt);
                    let mut state = SessionState::new(session_id, history);
                    state.restore(archived.customer_id, archived.responder);
                    return state;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(session_id, error = %e, "Failed to restore session, starting fresh");
                }
            }
        }
        info!(session_id, "Session created");
        SessionState::new(session_id, ChatHistoryBuffer::new(self.max_turns_for_prompt))
    }
}

fn snapshot_of(state: &SessionState) -> ArchivedSession {
    ArchivedSession {
        session_id: state.session_id.clone(),
        customer_id: state.customer_id().to_string(),
        responder: state.responder(),
        turns: state.history().all().to_vec(),
        updated_at: Utc::now(),
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(crate::history::DEFAULT_PROMPT_TURNS)
    }
}
