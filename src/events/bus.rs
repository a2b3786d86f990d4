//! Event Bus (C9) — spec §4.7.
//!
//! Grounded on the teacher's `fleet/queue.rs` bounded-queue-with-drop
//! posture, adapted here from a disk-backed upload queue to an in-process
//! `tokio::sync::broadcast` channel: every subscriber task gets its own
//! lagged-drop detection for free, matching spec §4.7's "fire-and-forget
//! at-most-once per subscriber ... drops to a subscriber whose outbound
//! queue exceeds a configured high-water mark". The bus itself carries no
//! history (§4.7 "It does not retain history") and no subscription
//! bookkeeping — topic membership is owned by the Subscription Hub (C10);
//! the bus only broadcasts `EngineEvent`s with their routing keys
//! attached for the hub to filter against.

use super::types::EngineEvent;
use crate::audit::{AuditLog, AuditRecord};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct EventBus {
    sender: broadcast::Sender<Arc<EngineEvent>>,
    audit: AuditLog,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            audit: AuditLog::default(),
        }
    }

    /// Publishes one event to every current subscriber. Fire-and-forget:
    /// if there are no subscribers this is a no-op, and a slow subscriber
    /// that falls behind the channel capacity will observe a `Lagged`
    /// error on its next `recv()` rather than blocking the publisher.
    pub fn publish(&self, event: EngineEvent) {
        // `send` only errors when there are zero receivers, which is not
        // a failure worth surfacing — there is simply nobody to deliver to.
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Records that a subscriber was dropped for falling behind (spec
    /// §4.7 "with an audit entry"). Called by the Subscription Hub when
    /// its `recv()` loop observes `RecvError::Lagged`.
    pub fn record_dropped_subscriber(&self, connection_id: &str, skipped: u64) {
        self.audit.record(AuditRecord::new(
            "event_bus_subscriber",
            connection_id,
            None,
            format!("dropped, lagged by {skipped} events"),
        ));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::defaults::DEFAULT_BUS_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{LineStatusPayload, SystemAlertPayload};
    use crate::ids::{EquipmentCode, LineId};
    use chrono::Utc;

    fn system_alert() -> EngineEvent {
        EngineEvent::SystemAlert {
            timestamp: Utc::now(),
            payload: SystemAlertPayload { message: "test".to_string(), severity: "info".to_string() },
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(system_alert());
        let received = rx.recv().await.unwrap();
        assert!(matches!(*received, EngineEvent::SystemAlert { .. }));
    }

    #[tokio::test]
    async fn two_subscribers_both_see_the_same_event() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(EngineEvent::LineStatusUpdate {
            timestamp: Utc::now(),
            payload: LineStatusPayload { line_id: LineId::new(), equipment_code: EquipmentCode::from("E1"), running: true },
        });
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(system_alert());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn routing_keys_include_line_and_equipment_for_line_status() {
        let event = EngineEvent::LineStatusUpdate {
            timestamp: Utc::now(),
            payload: LineStatusPayload { line_id: LineId::new(), equipment_code: EquipmentCode::from("E1"), running: false },
        };
        let keys = event.routing_keys();
        assert!(keys.iter().any(|k| k.starts_with("line:")));
        assert!(keys.iter().any(|k| k == "equipment:E1"));
    }
}
