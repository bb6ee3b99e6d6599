use crate::broadcast::BroadcastHub;
use handoff_core::{ClientRole, HandoffResult, OutboundFrame};
use handoff_session::{HandoffController, ToggleReason, Transition};
use std::sync::Arc;
use tracing::{info, warn};

/// Control actions a staff client can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaffAction {
    Takeover,
    TransferToBot,
    Unknown(String),
}

impl StaffAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "takeover" => StaffAction::Takeover,
            "transfer_to_bot" => StaffAction::TransferToBot,
            other => StaffAction::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StaffAction::Takeover => "takeover",
            StaffAction::TransferToBot => "transfer_to_bot",
            StaffAction::Unknown(action) => action,
        }
    }
}

/// Runs staff commands and reports the outcome to staff clients.
///
/// Failures never escape: they are logged and turned into an unsuccessful
/// `command_result`.
pub struct CommandProcessor {
    controller: Arc<HandoffController>,
    hub: BroadcastHub,
}

impl CommandProcessor {
    pub fn new(controller: Arc<HandoffController>, hub: BroadcastHub) -> Self {
        Self { controller, hub }
    }

    pub async fn process(&self, session_id: &str, customer_id: &str, action: &str) {
        let action = StaffAction::parse(action);
        let result = match self.run(session_id, customer_id, &action).await {
            Ok(transition) => transition,
            Err(e) => {
                warn!(session_id, action = action.as_str(), error = %e, "Command failed");
                Transition {
                    success: false,
                    message: format!("Error: {e}"),
                    notice: None,
                }
            }
        };

        info!(
            session_id,
            action = action.as_str(),
            success = result.success,
            "Command processed"
        );
        // A transition with a notice was already acknowledged while the
        // session was locked.
        if result.notice.is_some() {
            self.archive(session_id).await;
        } else {
            self.acknowledge(session_id, &action, result.success, &result.message);
        }
    }

    fn acknowledge(&self, session_id: &str, action: &StaffAction, success: bool, message: &str) {
        let ack = OutboundFrame::command_result(action.as_str(), success, message);
        self.hub.send_to_role(session_id, ClientRole::Staff, &ack);
    }

    async fn run(
        &self,
        session_id: &str,
        customer_id: &str,
        action: &StaffAction,
    ) -> HandoffResult<Transition> {
        match action {
            StaffAction::Takeover => {
                self.adopt(session_id, customer_id).await;
                Ok(self.controller.take_over(session_id, ToggleReason::AgentInitiated).await)
            }
            StaffAction::TransferToBot => {
                self.adopt(session_id, customer_id).await;
                self.controller
                    .transfer_to_bot(session_id, |notice, customer_id| {
                        self.acknowledge(session_id, action, true, &notice.content);
                        // Customers see the notice too.
                        let frame = OutboundFrame::new_message(notice, session_id, customer_id);
                        self.hub.broadcast(session_id, &frame);
                    })
                    .await
            }
            StaffAction::Unknown(other) => Ok(Transition {
                success: false,
                message: format!("Unknown action: {other}"),
                notice: None,
            }),
        }
    }

    async fn adopt(&self, session_id: &str, customer_id: &str) {
        self.controller
            .sessions()
            .get_or_create(session_id, Some(customer_id))
            .await;
    }

    async fn archive(&self, session_id: &str) {
        if let Err(e) = self.controller.sessions().archive(session_id).await {
            warn!(session_id, error = %e, "Failed to archive session");
        }
    }
}
