use crate::broadcast::BroadcastHub;
use crate::command::CommandProcessor;
use crate::config::HubConfig;
use crate::connection::Connection;
use handoff_core::{ClientRole, InboundFrame, MessageRole, OutboundFrame};
use handoff_session::{HandoffController, QueryEngine, ResponseRequest, SessionManager};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Interprets inbound frames from one connection and publishes the results.
///
/// One instance is shared by every connection; all per-session state lives
/// in the [`SessionManager`].
pub struct MessageIngester {
    sessions: Arc<SessionManager>,
    controller: Arc<HandoffController>,
    commands: CommandProcessor,
    engine: Arc<dyn QueryEngine>,
    hub: BroadcastHub,
    config: HubConfig,
}

impl MessageIngester {
    pub fn new(
        config: HubConfig,
        controller: Arc<HandoffController>,
        engine: Arc<dyn QueryEngine>,
        hub: BroadcastHub,
    ) -> Self {
        Self {
            sessions: controller.sessions().clone(),
            commands: CommandProcessor::new(controller.clone(), hub.clone()),
            controller,
            engine,
            hub,
            config,
        }
    }

    /// Sends the recent history to a client that just connected, then adds
    /// it to the session's audience.
    ///
    /// Both happen under the session lock, and every turn is broadcast under
    /// that same lock, so the client sees each turn exactly once: in the
    /// history frame or live after it.
    pub async fn admit(&self, conn: &Arc<Connection>) {
        let handle = self.sessions.get_or_create(&conn.session_id, None).await;
        let state = handle.lock().await;
        let frame = OutboundFrame::history(
            state.history().recent(self.config.history_window),
            &conn.session_id,
            state.customer_id(),
        );
        if !conn.send_frame(&frame) {
            warn!(
                connection_id = %conn.id,
                session_id = %conn.session_id,
                "Could not queue history frame"
            );
        }
        self.hub.registry().register(Arc::clone(conn));
    }

    /// Handles one inbound text frame. Never fails: bad input is logged and
    /// dropped.
    pub async fn handle_text(&self, conn: &Connection, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    connection_id = %conn.id,
                    session_id = %conn.session_id,
                    error = %e,
                    "Discarding malformed frame"
                );
                return;
            }
        };

        match (frame, conn.role) {
            (InboundFrame::Message { content, customer_id }, ClientRole::Customer) => {
                self.customer_message(&conn.session_id, &customer_id, content).await;
            }
            (InboundFrame::Message { content, customer_id }, ClientRole::Staff) => {
                self.staff_message(&conn.session_id, &customer_id, &content).await;
            }
            (InboundFrame::Command { action, customer_id }, ClientRole::Staff) => {
                self.commands.process(&conn.session_id, &customer_id, &action).await;
            }
            (InboundFrame::Command { action, .. }, ClientRole::Customer) => {
                debug!(
                    connection_id = %conn.id,
                    session_id = %conn.session_id,
                    action = %action,
                    "Ignoring command from customer"
                );
            }
        }
    }

    async fn customer_message(&self, session_id: &str, customer_id: &str, content: String) {
        let handle = self.sessions.get_or_create(session_id, Some(customer_id)).await;
        let request = {
            let state = handle.lock().await;
            ResponseRequest {
                content: content.clone(),
                session_id: session_id.to_string(),
                customer_id: state.customer_id().to_string(),
                responder: state.responder(),
                history: state.history().format_for_prompt(),
            }
        };

        let reply = match self.engine.produce_response(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id, error = %e, "Query engine failed, sending apology");
                self.config.apology.clone()
            }
        };

        {
            let mut state = handle.lock().await;
            let user_turn = state.record(MessageRole::User, content);
            let reply_role = state.responder().reply_role();
            let reply_turn = state.record(reply_role, reply);
            let customer_id = state.customer_id().to_string();
            for turn in [&user_turn, &reply_turn] {
                let frame = OutboundFrame::new_message(turn, session_id, &customer_id);
                self.hub.broadcast(session_id, &frame);
            }
            info!(session_id, role = %reply_role, "Customer message answered");
        }
        self.archive(session_id).await;
    }

    async fn staff_message(&self, session_id: &str, customer_id: &str, content: &str) {
        let staff = self
            .controller
            .record_staff_message(session_id, customer_id, content, |staff| {
                let frame = OutboundFrame::new_message(&staff.turn, session_id, &staff.customer_id);
                self.hub.broadcast(session_id, &frame);
            })
            .await;
        if staff.took_over {
            info!(session_id, "Staff message took over the session");
        }
        self.archive(session_id).await;
    }

    async fn archive(&self, session_id: &str) {
        if let Err(e) = self.sessions.archive(session_id).await {
            warn!(session_id, error = %e, "Failed to archive session");
        }
    }
}
