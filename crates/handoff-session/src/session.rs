use crate::history::ChatHistoryBuffer;
use chrono::{DateTime, Utc};
use handoff_core::{ChatTurn, MessageRole, Responder};
use serde::Serialize;

/// Mutable per-session record.
///
/// Always accessed through the session's mutex (see
/// [`SessionHandle`](crate::SessionHandle)); the responder is only changed
/// by [`HandoffController`](crate::HandoffController).
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: String,
    customer_id: String,
    responder: Responder,
    pub created_at: DateTime<Utc>,
    last_interaction: DateTime<Utc>,
    history: ChatHistoryBuffer,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, history: ChatHistoryBuffer) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            customer_id: String::new(),
            responder: Responder::Bot,
            created_at: now,
            last_interaction: now,
            history,
        }
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Records the customer id the first time a non-empty one is seen.
    pub fn adopt_customer_id(&mut self, customer_id: &str) {
        if self.customer_id.is_empty() && !customer_id.is_empty() {
            self.customer_id = customer_id.to_string();
        }
    }

    pub fn responder(&self) -> Responder {
        self.responder
    }

    pub fn last_interaction(&self) -> DateTime<Utc> {
        self.last_interaction
    }

    pub fn history(&self) -> &ChatHistoryBuffer {
        &self.history
    }

    /// Appends a turn and bumps `last_interaction`.
    pub fn record(&mut self, role: MessageRole, content: impl Into<String>) -> ChatTurn {
        self.touch();
        self.history.add_turn(role, content)
    }

    pub fn touch(&mut self) {
        self.last_interaction = Utc::now();
    }

    pub(crate) fn set_responder(&mut self, responder: Responder) {
        self.responder = responder;
    }

    pub(crate) fn restore(&mut self, customer_id: String, responder: Responder) {
        self.customer_id = customer_id;
        self.responder = responder;
    }
}
