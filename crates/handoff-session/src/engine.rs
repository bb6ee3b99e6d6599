use async_trait::async_trait;
use handoff_core::{HandoffResult, Responder};
use serde::Serialize;

/// Everything a query engine needs to answer one customer message.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRequest {
    #[serde(rename = "query")]
    pub content: String,
    pub session_id: String,
    pub customer_id: String,
    /// Mode the session was in when the message arrived.
    pub responder: Responder,
    /// Recent turns rendered as `Role: content` lines.
    pub history: String,
}

/// Produces the reply to a customer message (bot answer, or a holding
/// message while a human handles the session).
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn produce_response(&self, request: &ResponseRequest) -> HandoffResult<String>;
}
