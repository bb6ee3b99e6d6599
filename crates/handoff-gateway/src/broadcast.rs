use crate::connection::{Connection, ConnectionRegistry};
use handoff_core::{ClientRole, OutboundFrame};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Connections whose queue was closed or full. They have been removed
    /// from the registry and told to shut down.
    pub failed: Vec<Uuid>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delivers frames to the live connections of a session.
///
/// A frame is serialized once and queued on every recipient without
/// waiting. Fan-out holds the session's registry entry for its whole
/// duration, so every recipient sees frames in the order they were handed
/// to the hub.
#[derive(Clone)]
pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Sends `frame` to every connection of the session.
    pub fn broadcast(&self, session_id: &str, frame: &OutboundFrame) -> DeliveryReport {
        self.deliver(session_id, frame, |_| true)
    }

    /// Sends `frame` to the session's connections of one role.
    pub fn send_to_role(
        &self,
        session_id: &str,
        role: ClientRole,
        frame: &OutboundFrame,
    ) -> DeliveryReport {
        self.deliver(session_id, frame, |conn| conn.role == role)
    }

    fn deliver(
        &self,
        session_id: &str,
        frame: &OutboundFrame,
        wanted: impl Fn(&Connection) -> bool,
    ) -> DeliveryReport {
        let payload: Arc<str> = match serde_json::to_string(frame) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(session_id, kind = frame.kind(), error = %e, "Failed to serialize frame");
                return DeliveryReport::default();
            }
        };

        let report = self
            .registry
            .with_members(session_id, |members| {
                let mut report = DeliveryReport::default();
                members.retain(|conn| {
                    if !wanted(conn) {
                        return true;
                    }
                    if conn.send(Arc::clone(&payload)) {
                        report.delivered += 1;
                        true
                    } else {
                        conn.evict();
                        report.failed.push(conn.id);
                        false
                    }
                });
                report
            })
            .unwrap_or_default();

        for id in &report.failed {
            warn!(
                session_id,
                connection_id = %id,
                kind = frame.kind(),
                "Delivery failed, connection evicted"
            );
        }
        debug!(session_id, kind = frame.kind(), delivered = report.delivered, "Frame delivered");
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use handoff_core::{ChatTurn, MessageRole};
    use tokio::sync::mpsc;

    fn hub() -> BroadcastHub {
        BroadcastHub::new(ConnectionRegistry::new())
    }

    fn join(
        hub: &BroadcastHub,
        session: &str,
        role: ClientRole,
        cap: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
        let (conn, rx) = Connection::channel(session, role, cap);
        hub.registry().register(conn.clone());
        (conn, rx)
    }

    fn text(content: &str) -> OutboundFrame {
        OutboundFrame::new_message(&ChatTurn::new(MessageRole::User, content), "s1", "c1")
    }

    fn kind_of(raw: &str) -> String {
        let v: serde_json::Value = serde_json::from_str(raw).unwrap();
        v["type"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_session_members() {
        let hub = hub();
        let (_a, mut ra) = join(&hub, "s1", ClientRole::Customer, 8);
        let (_b, mut rb) = join(&hub, "s1", ClientRole::Staff, 8);
        let (_c, mut rc) = join(&hub, "s2", ClientRole::Staff, 8);

        let report = hub.broadcast("s1", &text("hi"));
        assert_eq!(report.delivered, 2);
        assert!(report.is_clean());
        assert_eq!(kind_of(&ra.recv().await.unwrap()), "new_message");
        assert_eq!(kind_of(&rb.recv().await.unwrap()), "new_message");
        assert!(rc.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_role_filters() {
        let hub = hub();
        let (_a, mut customer) = join(&hub, "s1", ClientRole::Customer, 8);
        let (_b, mut staff) = join(&hub, "s1", ClientRole::Staff, 8);

        let frame = OutboundFrame::command_result("takeover", true, "ok");
        let report = hub.send_to_role("s1", ClientRole::Staff, &frame);
        assert_eq!(report.delivered, 1);
        assert_eq!(kind_of(&staff.recv().await.unwrap()), "command_result");
        assert!(customer.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_unknown_session_is_empty() {
        let report = hub().broadcast("nobody", &text("hi"));
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn test_full_queue_evicts_only_that_connection() {
        let hub = hub();
        let (slow, _slow_rx) = join(&hub, "s1", ClientRole::Staff, 1);
        let (_fast, mut fast_rx) = join(&hub, "s1", ClientRole::Customer, 8);

        assert_eq!(hub.broadcast("s1", &text("one")).delivered, 2);
        let report = hub.broadcast("s1", &text("two"));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec![slow.id]);
        assert!(slow.is_evicted());
        assert_eq!(hub.registry().members("s1").len(), 1);
        fast_rx.recv().await.unwrap();
        fast_rx.recv().await.unwrap();
    }

    #[test]
    fn test_closed_receiver_is_removed() {
        let hub = hub();
        let (gone, rx) = join(&hub, "s1", ClientRole::Customer, 4);
        drop(rx);
        let report = hub.broadcast("s1", &text("hi"));
        assert_eq!(report.failed, vec![gone.id]);
        assert_eq!(hub.registry().session_count(), 0);
        // Unregistering afterwards is harmless.
        assert!(!hub.registry().unregister(&gone));
    }

    #[tokio::test]
    async fn test_order_preserved_per_recipient() {
        let hub = hub();
        let (_c, mut rx) = join(&hub, "s1", ClientRole::Customer, 16);
        for i in 0..10 {
            hub.broadcast("s1", &text(&i.to_string()));
        }
        for i in 0..10 {
            let v: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(v["message"]["content"], i.to_string());
        }
    }
}
