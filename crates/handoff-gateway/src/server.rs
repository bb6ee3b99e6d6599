use crate::broadcast::BroadcastHub;
use crate::config::HubConfig;
use crate::connection::{Connection, ConnectionRegistry};
use crate::ingest::MessageIngester;
use axum::{
    extract::{
        ws::{
            close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, Utf8Bytes,
            WebSocket, WebSocketUpgrade,
        },
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use handoff_core::{ClientRole, FrameMessage, OutboundFrame, Responder};
use handoff_session::{HandoffController, HumanHandoff, QueryEngine, SessionManager, ToggleReason};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long a close frame may wait on a peer that is not reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared application state.
pub struct AppState {
    pub config: HubConfig,
    pub sessions: Arc<SessionManager>,
    pub controller: Arc<HandoffController>,
    pub registry: Arc<ConnectionRegistry>,
    pub hub: BroadcastHub,
    pub ingester: Arc<MessageIngester>,
}

/// The chat hub's HTTP/WebSocket front.
pub struct GatewayServer;

impl GatewayServer {
    /// Wires one registry, hub and handoff controller around the given
    /// collaborators and returns the router.
    pub fn build(
        config: HubConfig,
        sessions: Arc<SessionManager>,
        engine: Arc<dyn QueryEngine>,
        handoff: Arc<dyn HumanHandoff>,
    ) -> Router {
        let registry = ConnectionRegistry::new();
        let hub = BroadcastHub::new(registry.clone());
        let controller = Arc::new(HandoffController::new(sessions.clone(), handoff));
        let ingester = Arc::new(MessageIngester::new(
            config.clone(),
            controller.clone(),
            engine,
            hub.clone(),
        ));

        let state = Arc::new(AppState {
            config,
            sessions,
            controller,
            registry,
            hub,
            ingester,
        });

        Router::new()
            .route("/chat/{session_id}/{client_type}", get(ws_handler))
            .route("/sessions/{session_id}/history", get(history_handler))
            .route("/sessions/{session_id}/takeover", post(takeover_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "handoff",
        "sessions": state.sessions.session_count(),
        "connections": state.registry.connection_count(),
    }))
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    session_id: String,
    responder: Responder,
    messages: Vec<FrameMessage>,
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(snapshot) = state.sessions.snapshot(&session_id).await else {
        return (StatusCode::NOT_FOUND, format!("unknown session '{session_id}'")).into_response();
    };
    let messages = snapshot
        .turns
        .iter()
        .map(|turn| FrameMessage::from_turn(turn, &snapshot.session_id, &snapshot.customer_id))
        .collect();
    Json(HistoryResponse {
        session_id: snapshot.session_id,
        responder: snapshot.responder,
        messages,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct TakeoverRequest {
    #[serde(default)]
    reason: ToggleReason,
}

#[derive(Debug, Serialize)]
struct TakeoverResponse {
    success: bool,
    message: String,
}

/// Takeover requested outside a staff socket, e.g. a customer-facing
/// "talk to a person" button. Staff clients are told through the usual
/// `command_result`.
async fn takeover_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<TakeoverRequest>,
) -> impl IntoResponse {
    let transition = state.controller.take_over(&session_id, request.reason).await;
    info!(
        session_id = %session_id,
        reason = ?request.reason,
        success = transition.success,
        "Takeover requested over HTTP"
    );
    state.hub.send_to_role(
        &session_id,
        ClientRole::Staff,
        &OutboundFrame::command_result("takeover", transition.success, transition.message.as_str()),
    );
    Json(TakeoverResponse {
        success: transition.success,
        message: transition.message,
    })
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path((session_id, client_type)): Path<(String, String)>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let role: ClientRole = match client_type.parse() {
        Ok(role) => role,
        Err(e) => {
            warn!(session_id = %session_id, client_type = %client_type, "Rejecting connection");
            return (StatusCode::BAD_REQUEST, e).into_response();
        }
    };
    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, session_id, role))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// Why a connection's loop stopped.
enum Ending {
    /// Client closed or the stream ended.
    Closed,
    /// The socket failed while reading or writing.
    Transport,
    /// The hub dropped the connection because its queue was full.
    Evicted,
    /// Frame handling panicked.
    Fault,
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: String,
    role: ClientRole,
) {
    let (conn, mut outbound) = Connection::channel(session_id, role, state.config.outbound_buffer);
    state.ingester.admit(&conn).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Frames are handled in arrival order on their own task so a panic in
    // handling is contained to this connection.
    let ingester = state.ingester.clone();
    let reader = conn.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            if reader.is_evicted() {
                return Ending::Evicted;
            }
            match msg {
                Ok(Message::Text(text)) => ingester.handle_text(&reader, text.as_str()).await,
                Ok(Message::Close(_)) => return Ending::Closed,
                Ok(_) => {}
                Err(e) => {
                    warn!(connection_id = %reader.id, error = %e, "WebSocket read failed");
                    return Ending::Transport;
                }
            }
        }
        Ending::Closed
    });

    let ending = loop {
        tokio::select! {
            Some(payload) = outbound.recv() => {
                // A peer that stops reading blocks the write; eviction must
                // still end the loop.
                tokio::select! {
                    sent = ws_sender.send(Message::Text(payload.to_string().into())) => {
                        if sent.is_err() {
                            break Ending::Transport;
                        }
                    }
                    _ = conn.evicted() => break Ending::Evicted,
                }
            }
            _ = conn.evicted() => break Ending::Evicted,
            joined = &mut recv_task => {
                break match joined {
                    Ok(ending) => ending,
                    Err(e) => {
                        error!(connection_id = %conn.id, error = %e, "Connection handler failed");
                        Ending::Fault
                    }
                };
            }
        }
    };

    recv_task.abort();

    let close = match ending {
        Ending::Fault => Some((close_code::ERROR, "internal error")),
        Ending::Evicted => Some((close_code::AGAIN, "too slow")),
        Ending::Closed | Ending::Transport => None,
    };
    if let Some((code, reason)) = close {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        };
        let sent = tokio::time::timeout(CLOSE_TIMEOUT, ws_sender.send(Message::Close(Some(frame))));
        if sent.await.is_err() {
            warn!(connection_id = %conn.id, "Peer did not accept close frame");
        }
    }

    state.registry.unregister(&conn);

    info!(
        connection_id = %conn.id,
        session_id = %conn.session_id,
        role = %conn.role,
        "WebSocket disconnected"
    );
}
