#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Regression tests for handoff-gateway: connection lifecycle, fault
//! isolation, archive restore and the HTTP side endpoints.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use handoff_core::HandoffResult;
use handoff_gateway::{GatewayServer, HubConfig};
use handoff_session::{
    FileHistoryArchive, QueryEngine, ResponseRequest, ScriptedHandoff, SessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Panics on "boom", otherwise echoes.
struct FragileEngine;

#[async_trait]
impl QueryEngine for FragileEngine {
    async fn produce_response(&self, request: &ResponseRequest) -> HandoffResult<String> {
        if request.content == "boom" {
            panic!("engine blew up");
        }
        Ok(format!("echo: {}", request.content))
    }
}

async fn serve(sessions: Arc<SessionManager>) -> String {
    serve_with(HubConfig::default(), sessions).await
}

async fn serve_with(config: HubConfig, sessions: Arc<SessionManager>) -> String {
    let app = GatewayServer::build(
        config,
        sessions,
        Arc::new(FragileEngine),
        Arc::new(ScriptedHandoff::new("Back to the bot.")),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

async fn archived_sessions(dir: &std::path::Path) -> Arc<SessionManager> {
    let archive = FileHistoryArchive::new(dir.to_path_buf()).await.unwrap();
    Arc::new(SessionManager::default().with_archive(Arc::new(archive)))
}

async fn connect(addr: &str, session: &str, role: &str) -> (Ws, serde_json::Value) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/chat/{session}/{role}"))
        .await
        .unwrap();
    let history = recv(&mut ws).await;
    (ws, history)
}

async fn recv(ws: &mut Ws) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .unwrap();
    serde_json::from_str(&msg.into_text().unwrap()).unwrap()
}

async fn say(ws: &mut Ws, content: &str) {
    let frame = serde_json::json!({"type": "message", "content": content});
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn connections(addr: &str) -> u64 {
    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["connections"].as_u64().unwrap()
}

#[tokio::test]
async fn test_handler_panic_closes_with_internal_error() {
    let addr = serve(Arc::new(SessionManager::default())).await;
    let (mut victim, _) = connect(&addr, "s1", "customer").await;
    let (mut bystander, _) = connect(&addr, "s1", "staff").await;

    say(&mut victim, "boom").await;
    let close = loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), victim.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Close(frame) = msg {
            break frame;
        }
    };
    assert_eq!(close.unwrap().code, CloseCode::Error);

    // The other connection still works.
    say(&mut bystander, "still fine").await;
    assert_eq!(recv(&mut bystander).await["message"]["content"], "still fine");
}

#[tokio::test]
async fn test_stalled_reader_is_evicted_and_silenced() {
    let config = HubConfig {
        outbound_buffer: 2,
        ..HubConfig::default()
    };
    let addr = serve_with(config, Arc::new(SessionManager::default())).await;
    let (mut customer, _) = connect(&addr, "s1", "customer").await;
    // Never reads again, so its socket backs up.
    let (mut staff, _) = connect(&addr, "s1", "staff").await;

    let bulky = "x".repeat(256 * 1024);
    for _ in 0..64 {
        say(&mut customer, &bulky).await;
        recv(&mut customer).await;
        recv(&mut customer).await;
        if connections(&addr).await == 1 {
            break;
        }
    }
    assert_eq!(connections(&addr).await, 1);

    // Frames from the evicted connection must have no effect.
    let takeover = r#"{"type":"command","action":"takeover"}"#.to_string();
    let _ = staff.send(Message::Text(takeover)).await;
    let ghost = serde_json::json!({"type": "message", "content": "ghost"}).to_string();
    let _ = staff.send(Message::Text(ghost)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let silent = tokio::time::timeout(Duration::from_millis(200), customer.next()).await;
    assert!(silent.is_err(), "customer received a frame from an evicted connection");

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/sessions/s1/history"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["responder"], "bot");
    let messages = body["messages"].as_array().unwrap();
    assert!(messages.iter().all(|m| m["content"] != "ghost"));
}

#[tokio::test]
async fn test_disconnect_unregisters_once() {
    let addr = serve(Arc::new(SessionManager::default())).await;
    let (ws, _) = connect(&addr, "s1", "customer").await;
    assert_eq!(connections(&addr).await, 1);

    drop(ws);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(connections(&addr).await, 0);
}

#[tokio::test]
async fn test_reconnect_sees_earlier_conversation() {
    let addr = serve(Arc::new(SessionManager::default())).await;
    let (mut ws, _) = connect(&addr, "s1", "customer").await;
    say(&mut ws, "remember me").await;
    recv(&mut ws).await;
    recv(&mut ws).await;
    ws.close(None).await.unwrap();

    let (_ws, history) = connect(&addr, "s1", "customer").await;
    assert_eq!(history["messages"][0]["content"], "remember me");
}

#[tokio::test]
async fn test_concurrent_connections_across_sessions() {
    let addr = serve(Arc::new(SessionManager::default())).await;
    let mut handles = Vec::new();
    for i in 0..5 {
        let addr = addr.clone();
        handles.push(tokio::spawn(async move {
            let session = format!("s{i}");
            let (mut ws, _) = connect(&addr, &session, "customer").await;
            say(&mut ws, &format!("msg {i}")).await;
            let user = recv(&mut ws).await;
            assert_eq!(user["message"]["session_id"], session);
            assert_eq!(recv(&mut ws).await["message"]["content"], format!("echo: msg {i}"));
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

#[tokio::test]
async fn test_history_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();

    let addr = serve(archived_sessions(tmp.path()).await).await;
    // Percent-encoded in the URL, so the session id itself contains a slash.
    let (mut staff, _) = connect(&addr, "support%2F17", "staff").await;
    staff
        .send(Message::Text(r#"{"type":"command","action":"takeover"}"#.to_string()))
        .await
        .unwrap();
    recv(&mut staff).await;
    say(&mut staff, "I can help with that").await;
    recv(&mut staff).await;
    // Archiving happens after the broadcast.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A second process over the same data directory.
    let restarted = archived_sessions(tmp.path()).await;
    let addr = serve(restarted.clone()).await;
    let (_customer, history) = connect(&addr, "support%2F17", "customer").await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "human_agent");

    let handle = restarted.get("support/17").unwrap();
    assert_eq!(handle.lock().await.responder(), handoff_core::Responder::Human);
}

#[tokio::test]
async fn test_http_history_endpoint() {
    let addr = serve(Arc::new(SessionManager::default())).await;
    let missing = reqwest::get(format!("http://{addr}/sessions/nobody/history")).await.unwrap();
    assert_eq!(missing.status(), 404);

    let (mut ws, _) = connect(&addr, "s1", "customer").await;
    say(&mut ws, "hello").await;
    recv(&mut ws).await;
    recv(&mut ws).await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/sessions/s1/history"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["responder"], "bot");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_http_takeover_notifies_staff() {
    let addr = serve(Arc::new(SessionManager::default())).await;
    let (mut staff, _) = connect(&addr, "s1", "staff").await;

    let resp: serde_json::Value = reqwest::Client::new()
        .post(format!("http://{addr}/sessions/s1/takeover"))
        .json(&serde_json::json!({"reason": "customer_requested"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["success"], true);

    let ack = recv(&mut staff).await;
    assert_eq!(ack["type"], "command_result");
    assert_eq!(ack["action"], "takeover");
    assert_eq!(ack["message"], "Connecting you with a human agent as requested.");
}
