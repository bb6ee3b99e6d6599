use async_trait::async_trait;
use handoff_core::{HandoffError, HandoffResult};
use handoff_session::{QueryEngine, ResponseRequest};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct EngineReply {
    response: String,
}

/// Query engine reached over HTTP.
///
/// POSTs the [`ResponseRequest`] as JSON and expects `{"response": "..."}`
/// back.
pub struct HttpQueryEngine {
    client: reqwest::Client,
    url: String,
}

impl HttpQueryEngine {
    pub fn new(url: impl Into<String>, timeout: Duration) -> HandoffResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HandoffError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl QueryEngine for HttpQueryEngine {
    async fn produce_response(&self, request: &ResponseRequest) -> HandoffResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| HandoffError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandoffError::Engine(format!("engine returned {status}: {body}")));
        }

        let reply: EngineReply = response
            .json()
            .await
            .map_err(|e| HandoffError::Engine(format!("malformed engine reply: {e}")))?;
        Ok(reply.response)
    }
}
