use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The author of a [`ChatTurn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The customer.
    User,
    /// The automated responder.
    Bot,
    /// A staff member answering by hand.
    HumanAgent,
    /// Notices generated by the hub itself (handoffs, transfers).
    System,
}

impl MessageRole {
    /// Lowercase wire name, e.g. `human_agent`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
            MessageRole::HumanAgent => "human_agent",
            MessageRole::System => "system",
        }
    }

    /// Label used when rendering history into a prompt.
    pub fn prompt_label(&self) -> &'static str {
        match self {
            MessageRole::User => "User",
            MessageRole::Bot => "Bot",
            MessageRole::HumanAgent => "Agent",
            MessageRole::System => "System",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a session's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    /// Who wrote the turn.
    pub role: MessageRole,
    /// The textual content.
    pub content: String,
    /// UTC time the turn was appended.
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Creates a turn stamped with the current time.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Which side of the conversation a connection serves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// The customer-facing widget.
    Customer,
    /// A staff console.
    Staff,
}

impl ClientRole {
    /// Lowercase name as used in endpoint paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientRole::Customer => "customer",
            ClientRole::Staff => "staff",
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(ClientRole::Customer),
            "staff" => Ok(ClientRole::Staff),
            other => Err(format!("unknown client type '{other}'")),
        }
    }
}

/// Who currently answers the customer in a session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Responder {
    /// Automated responses.
    #[default]
    Bot,
    /// A staff member has taken over.
    Human,
}

impl Responder {
    /// The role stamped on replies produced while in this mode.
    pub fn reply_role(&self) -> MessageRole {
        match self {
            Responder::Bot => MessageRole::Bot,
            Responder::Human => MessageRole::HumanAgent,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_wire_names() {
        assert_eq!(serde_json::to_string(&MessageRole::HumanAgent).unwrap(), "\"human_agent\"");
        assert_eq!(serde_json::to_string(&MessageRole::System).unwrap(), "\"system\"");
        assert_eq!(MessageRole::User.to_string(), "user");
    }

    #[test]
    fn test_client_role_parse() {
        assert_eq!("customer".parse::<ClientRole>().unwrap(), ClientRole::Customer);
        assert_eq!("staff".parse::<ClientRole>().unwrap(), ClientRole::Staff);
        assert!("admin".parse::<ClientRole>().is_err());
        assert!("Staff".parse::<ClientRole>().is_err());
    }

    #[test]
    fn test_responder_defaults_to_bot() {
        assert_eq!(Responder::default(), Responder::Bot);
        assert_eq!(Responder::Bot.reply_role(), MessageRole::Bot);
        assert_eq!(Responder::Human.reply_role(), MessageRole::HumanAgent);
    }
}
