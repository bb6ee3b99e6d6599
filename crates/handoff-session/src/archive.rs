use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handoff_core::{ChatTurn, HandoffError, HandoffResult, Responder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Snapshot of a session handed to the history-storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchivedSession {
    pub session_id: String,
    pub customer_id: String,
    pub responder: Responder,
    pub turns: Vec<ChatTurn>,
    pub updated_at: DateTime<Utc>,
}

/// Durable storage for full session histories.
#[async_trait]
pub trait HistoryArchive: Send + Sync {
    async fn save(&self, session: &ArchivedSession) -> HandoffResult<()>;
    async fn load(&self, session_id: &str) -> HandoffResult<Option<ArchivedSession>>;
}

/// File-based archive: one pretty-printed JSON document per session.
///
/// Writes go to a temporary file that is renamed over the old snapshot, so a
/// reader never sees a half-written document.
pub struct FileHistoryArchive {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileHistoryArchive {
    pub async fn new(dir: PathBuf) -> HandoffResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_id)))
    }
}

/// Session ids are opaque client strings; anything outside `[A-Za-z0-9_-]`
/// is percent-encoded so ids map to distinct, traversal-free file names.
fn file_stem(session_id: &str) -> String {
    let mut stem = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[async_trait]
impl HistoryArchive for FileHistoryArchive {
    async fn save(&self, session: &ArchivedSession) -> HandoffResult<()> {
        let path = self.session_path(&session.session_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(session)?;

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, session_id: &str) -> HandoffResult<Option<ArchivedSession>> {
        let path = self.session_path(session_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let session: ArchivedSession = serde_json::from_str(&data)
            .map_err(|e| HandoffError::Session(format!("Failed to parse archived session: {e}")))?;
        Ok(Some(session))
    }
}
