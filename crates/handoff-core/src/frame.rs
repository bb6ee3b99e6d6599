//! Wire frames exchanged over a chat connection.
//!
//! Both directions are closed tagged unions keyed on `"type"`. Anything that
//! does not deserialize into [`InboundFrame`] is rejected at the boundary.

use crate::message::{ChatTurn, MessageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client → hub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A chat line typed by a customer or staff member.
    Message {
        content: String,
        #[serde(default)]
        customer_id: String,
    },
    /// A staff control action such as `takeover`.
    Command {
        action: String,
        #[serde(default)]
        customer_id: String,
    },
}

/// A chat line as rendered to clients, in both `history` and `new_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub customer_id: String,
}

impl FrameMessage {
    /// Renders a stored turn for a given session.
    pub fn from_turn(turn: &ChatTurn, session_id: &str, customer_id: &str) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
            timestamp: turn.timestamp,
            session_id: session_id.to_string(),
            customer_id: customer_id.to_string(),
        }
    }
}

/// Hub → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Recent turns, sent once to a freshly connected client.
    History { messages: Vec<FrameMessage> },
    /// A single new chat line for every viewer of the session.
    NewMessage { message: FrameMessage },
    /// Acknowledgement of a staff command.
    CommandResult {
        action: String,
        success: bool,
        message: String,
    },
}

impl OutboundFrame {
    /// Builds a `history` frame from stored turns.
    pub fn history(turns: &[ChatTurn], session_id: &str, customer_id: &str) -> Self {
        Self::History {
            messages: turns
                .iter()
                .map(|t| FrameMessage::from_turn(t, session_id, customer_id))
                .collect(),
        }
    }

    /// Builds a `new_message` frame from a stored turn.
    pub fn new_message(turn: &ChatTurn, session_id: &str, customer_id: &str) -> Self {
        Self::NewMessage {
            message: FrameMessage::from_turn(turn, session_id, customer_id),
        }
    }

    /// Builds a `command_result` frame.
    pub fn command_result(
        action: impl Into<String>,
        success: bool,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandResult {
            action: action.into(),
            success,
            message: message.into(),
        }
    }

    /// Wire `type` tag, handy for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::History { .. } => "history",
            OutboundFrame::NewMessage { .. } => "new_message",
            OutboundFrame::CommandResult { .. } => "command_result",
        }
    }
}
