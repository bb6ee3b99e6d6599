//! Bot ↔ human responder transitions.
//!
//! Every transition runs while holding the session's mutex, including the
//! await on the [`HumanHandoff`] collaborator during a transfer. A second
//! request racing on the same session therefore always observes the
//! post-transition state: the first writer wins and the other is rejected
//! by the guard.
//!
//! Operations that append a turn take a `publish` callback that runs before
//! the lock is released. A client joining the session concurrently then
//! sees each turn exactly once, either in its history or live.

use crate::history::ChatHistoryBuffer;
use crate::manager::SessionManager;
use crate::session::SessionState;
use async_trait::async_trait;
use handoff_core::{ChatTurn, HandoffResult, MessageRole, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const ALREADY_HUMAN: &str = "Session already handled by human agent";
pub const ALREADY_BOT: &str = "Session already handled by bot";

/// Outcome of a guarded transition. A rejection is a normal outcome, not an
/// error.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub success: bool,
    pub message: String,
    /// System turn appended to history by the transition, if any.
    pub notice: Option<ChatTurn>,
}

impl Transition {
    fn accepted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            notice: None,
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            notice: None,
        }
    }

    fn with_notice(mut self, turn: ChatTurn) -> Self {
        self.notice = Some(turn);
        self
    }
}

/// Why a human is taking over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleReason {
    /// A staff member asked for it, explicitly or by typing into the chat.
    #[default]
    AgentInitiated,
    /// The customer asked for a person.
    CustomerRequested,
}

impl ToggleReason {
    fn confirmation(self) -> &'static str {
        match self {
            ToggleReason::AgentInitiated => "A human agent has joined the conversation.",
            ToggleReason::CustomerRequested => "Connecting you with a human agent as requested.",
        }
    }
}

/// Human-handling collaborator consulted when a session goes back to the bot.
#[async_trait]
pub trait HumanHandoff: Send + Sync {
    /// Returns the notice shown to everyone in the session.
    async fn transfer_to_bot(
        &self,
        session_id: &str,
        history: &ChatHistoryBuffer,
    ) -> HandoffResult<String>;
}

/// Answers every transfer with a fixed notice.
pub struct ScriptedHandoff {
    message: String,
}

impl ScriptedHandoff {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl HumanHandoff for ScriptedHandoff {
    async fn transfer_to_bot(
        &self,
        _session_id: &str,
        _history: &ChatHistoryBuffer,
    ) -> HandoffResult<String> {
        Ok(self.message.clone())
    }
}

/// Result of recording a staff chat line.
#[derive(Debug, Clone)]
pub struct StaffTurn {
    pub turn: ChatTurn,
    pub customer_id: String,
    /// Whether this message flipped the session to human.
    pub took_over: bool,
}

/// State machine governing who answers a session.
pub struct HandoffController {
    sessions: Arc<SessionManager>,
    handoff: Arc<dyn HumanHandoff>,
}

impl HandoffController {
    pub fn new(sessions: Arc<SessionManager>, handoff: Arc<dyn HumanHandoff>) -> Self {
        Self { sessions, handoff }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Bot → Human.
    pub async fn take_over(&self, session_id: &str, reason: ToggleReason) -> Transition {
        let handle = self.sessions.get_or_create(session_id, None).await;
        let mut state = handle.lock().await;
        Self::take_over_locked(&mut state, reason)
    }

    fn take_over_locked(state: &mut SessionState, reason: ToggleReason) -> Transition {
        if state.responder() == Responder::Human {
            debug!(session_id = %state.session_id, "Takeover rejected: already human");
            return Transition::rejected(ALREADY_HUMAN);
        }
        state.set_responder(Responder::Human);
        state.touch();
        info!(
            session_id = %state.session_id,
            reason = ?reason,
            "Session taken over by human agent"
        );
        Transition::accepted(reason.confirmation())
    }

    /// Human → Bot. The collaborator is only consulted when the guard passes;
    /// if it fails the session stays with the human. `publish` receives the
    /// recorded notice and the session's customer id.
    pub async fn transfer_to_bot<F>(
        &self,
        session_id: &str,
        publish: F,
    ) -> HandoffResult<Transition>
    where
        F: FnOnce(&ChatTurn, &str) + Send,
    {
        let handle = self.sessions.get_or_create(session_id, None).await;
        let mut state = handle.lock().await;
        if state.responder() == Responder::Bot {
            debug!(session_id, "Transfer rejected: already bot");
            return Ok(Transition::rejected(ALREADY_BOT));
        }

        let message = self.handoff.transfer_to_bot(session_id, state.history()).await?;
        state.set_responder(Responder::Bot);
        let notice = state.record(MessageRole::System, message.clone());
        publish(&notice, state.customer_id());
        info!(session_id, "Session transferred back to bot");
        Ok(Transition::accepted(message).with_notice(notice))
    }

    /// Records a staff chat line, taking the session over first if the bot
    /// still holds it. Both steps happen in one critical section so the
    /// recorded role always matches the responder.
    pub async fn record_staff_message<F>(
        &self,
        session_id: &str,
        customer_id: &str,
        content: &str,
        publish: F,
    ) -> StaffTurn
    where
        F: FnOnce(&StaffTurn) + Send,
    {
        let handle = self.sessions.get_or_create(session_id, None).await;
        let mut state = handle.lock().await;
        state.adopt_customer_id(customer_id);

        let took_over = state.responder() == Responder::Bot
            && Self::take_over_locked(&mut state, ToggleReason::AgentInitiated).success;
        let turn = state.record(MessageRole::HumanAgent, content);

        let staff = StaffTurn {
            turn,
            customer_id: state.customer_id().to_string(),
            took_over,
        };
        publish(&staff);
        staff
    }
}
