//! Per-event-kind handoff from the Poller to the Event Bus.
//!
//! Spec §9 design notes: "Where the source uses background worker queues
//! for production events (job completion, quality issues, changeover,
//! fault) the implementation should use typed channels between the Poller
//! and dedicated handler tasks — one channel per event kind — with
//! bounded capacity and explicit backpressure." Grounded on the teacher's
//! `fleet/queue.rs` bounded-queue-with-drop posture (same one the Event
//! Bus itself borrows from), applied one level upstream of the bus so a
//! slow publish of one event kind can't starve the others.
//!
//! Everything that isn't one of these four kinds (line status, production,
//! OEE, downtime, andon, escalation) is published straight to the bus from
//! the poller's own tick — only the four the design notes name are routed
//! through a handler task.

use crate::config::defaults::DEFAULT_BUS_QUEUE_CAPACITY;
use crate::events::{EngineEvent, EventBus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

fn spawn_handler(bus: Arc<EventBus>, capacity: usize, kind: &'static str) -> (mpsc::Sender<EngineEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            bus.publish(event);
        }
        tracing::debug!(kind, "event channel handler exiting, sender dropped");
    });
    (tx, handle)
}

/// Owns the four typed channels and their handler tasks. `try_send` on a
/// full channel logs and drops rather than blocking the poller's tick —
/// the same fire-and-forget posture the bus itself uses for subscribers.
pub struct EventChannels {
    job: mpsc::Sender<EngineEvent>,
    quality: mpsc::Sender<EngineEvent>,
    changeover: mpsc::Sender<EngineEvent>,
    fault: mpsc::Sender<EngineEvent>,
    handles: Vec<JoinHandle<()>>,
}

impl EventChannels {
    pub fn spawn(bus: Arc<EventBus>) -> Self {
        Self::spawn_with_capacity(bus, DEFAULT_BUS_QUEUE_CAPACITY)
    }

    pub fn spawn_with_capacity(bus: Arc<EventBus>, capacity: usize) -> Self {
        let (job, h1) = spawn_handler(bus.clone(), capacity, "job");
        let (quality, h2) = spawn_handler(bus.clone(), capacity, "quality");
        let (changeover, h3) = spawn_handler(bus.clone(), capacity, "changeover");
        let (fault, h4) = spawn_handler(bus, capacity, "fault");
        Self { job, quality, changeover, fault, handles: vec![h1, h2, h3, h4] }
    }

    pub fn send_job(&self, event: EngineEvent) {
        if self.job.try_send(event).is_err() {
            warn!("job event channel full or closed, dropping event");
        }
    }

    pub fn send_quality(&self, event: EngineEvent) {
        if self.quality.try_send(event).is_err() {
            warn!("quality event channel full or closed, dropping event");
        }
    }

    pub fn send_changeover(&self, event: EngineEvent) {
        if self.changeover.try_send(event).is_err() {
            warn!("changeover event channel full or closed, dropping event");
        }
    }

    pub fn send_fault(&self, event: EngineEvent) {
        if self.fault.try_send(event).is_err() {
            warn!("fault event channel full or closed, dropping event");
        }
    }
}

impl Drop for EventChannels {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{EquipmentCode, LineId};
    use chrono::Utc;

    #[tokio::test]
    async fn job_channel_reaches_the_bus() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let channels = EventChannels::spawn_with_capacity(bus, 8);
        channels.send_job(EngineEvent::JobCompleted {
            timestamp: Utc::now(),
            payload: crate::events::JobLifecyclePayload {
                line_id: LineId::new(),
                equipment_code: EquipmentCode::from("E1"),
                job_id: crate::ids::JobId::new(),
            },
        });
        let received = rx.recv().await.unwrap();
        assert!(matches!(*received, EngineEvent::JobCompleted { .. }));
    }
}
