//! Cross-component integration tests: one flow through several of the
//! engine's C1-C11 pieces at a time, rather than one module in isolation.

use chrono::{Duration as ChronoDuration, Utc};
use floorline_engine::andon::{AndonEngine, AndonEventType, AndonPriority, NullDirectory, TickFaultAnalysis};
use floorline_engine::config::{AndonCategory, AndonThresholds};
use floorline_engine::downtime::{DowntimeStatus, DowntimeTracker, DowntimeTransition};
use floorline_engine::events::{EngineEvent, EventBus};
use floorline_engine::faults::{FaultCatalog, FixedBitVec};
use floorline_engine::hub::SubscriptionHub;
use floorline_engine::ids::{EquipmentCode, LineId, UserId};
use floorline_engine::jobs::{JobMapper, JobUpdateOutcome, ProgressMetrics};
use floorline_engine::telemetry::{ContextStore, DerivedMetrics};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

fn running_metrics() -> DerivedMetrics {
    DerivedMetrics {
        running: true,
        speed: 100.0,
        product_count: 1,
        good_parts: Some(1),
        total_parts: Some(1),
        cycle_time: Some(1.0),
        temperature: None,
        pressure: None,
        vibration: None,
        fault_bits: FixedBitVec::zeroed(64),
        active_alarms: HashSet::new(),
        production_efficiency: 1.0,
        quality_rate: 1.0,
        changeover_status: floorline_engine::telemetry::ChangeoverStatus::None,
        material_shortage: false,
        material_jam: false,
    }
}

fn down_metrics(bit: usize) -> DerivedMetrics {
    let mut bits = FixedBitVec::zeroed(64);
    bits.set(bit, true);
    DerivedMetrics {
        running: false,
        speed: 0.0,
        ..running_metrics()
    }
    .with_fault_bits(bits)
}

trait WithFaultBits {
    fn with_fault_bits(self, bits: FixedBitVec) -> Self;
}

impl WithFaultBits for DerivedMetrics {
    fn with_fault_bits(mut self, bits: FixedBitVec) -> Self {
        self.fault_bits = bits;
        self
    }
}

/// A motor failure opens an unplanned downtime event with the matching
/// reason code, and closing it after 120 seconds produces the exact
/// duration the window's availability math depends on.
#[tokio::test]
async fn motor_failure_opens_and_closes_a_downtime_event_with_correct_duration() {
    let tracker = DowntimeTracker::new();
    let catalog = FaultCatalog::default_catalog();
    let ctx = floorline_engine::telemetry::EquipmentContext::new(LineId::new(), Utc::now());
    let code = EquipmentCode::from("L1-FILLER");
    let line_id = LineId::new();

    let t0 = Utc::now();
    let opened = tracker
        .process_tick(line_id, &code, &down_metrics(2), &ctx, &catalog, t0)
        .await
        .unwrap();
    assert!(matches!(opened, Some(DowntimeTransition::Opened(_))));

    for i in 1..120 {
        let merged = tracker
            .process_tick(line_id, &code, &down_metrics(2), &ctx, &catalog, t0 + ChronoDuration::seconds(i))
            .await
            .unwrap();
        assert!(matches!(merged, Some(DowntimeTransition::Merged)));
    }

    let closed = tracker
        .process_tick(line_id, &code, &running_metrics(), &ctx, &catalog, t0 + ChronoDuration::seconds(120))
        .await
        .unwrap();
    match closed {
        Some(DowntimeTransition::Closed(event)) => {
            assert_eq!(event.reason_code, "MOTOR_FAILURE");
            assert_eq!(event.duration_seconds, Some(120));
            assert_eq!(event.status, DowntimeStatus::Closed);
        }
        other => panic!("expected Closed, got {other:?}"),
    }
}

/// A second auto-creation pass for the same (line, equipment, event_type)
/// while the first event is still active must not create a duplicate.
#[tokio::test]
async fn andon_auto_create_does_not_duplicate_an_active_event() {
    let engine = AndonEngine::new(Arc::new(NullDirectory));
    let thresholds = AndonThresholds::default();
    let line_id = LineId::new();
    let code = EquipmentCode::from("L1-CAPPER");
    let now = Utc::now();

    let catalog = FaultCatalog::default_catalog();
    let fault = catalog.lookup(2).unwrap().clone();
    let mut by_category = HashMap::new();
    by_category.insert(AndonCategory::Critical, vec![fault]);
    let analysis = TickFaultAnalysis { by_category };

    let first = engine.auto_create(line_id, &code, &analysis, &thresholds, "poller", now);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].event_type, AndonEventType::Maintenance);
    assert_eq!(first[0].priority, AndonPriority::Critical);

    let second = engine.auto_create(line_id, &code, &analysis, &thresholds, "poller", now + ChronoDuration::seconds(1));
    assert!(second.is_empty(), "duplicate active event must not be created");

    let active = engine.active_events(&Default::default());
    assert_eq!(active.len(), 1);
}

/// Streaming ticks until the target quantity is reached auto-completes
/// the job exactly once and clears the equipment's context.
#[tokio::test]
async fn job_reaching_target_quantity_auto_completes_and_clears_context() {
    let context_store = Arc::new(ContextStore::new());
    let code = EquipmentCode::from("L1-LABELER");
    let line_id = LineId::new();
    let now = Utc::now();
    context_store.register(code.clone(), line_id, now);

    let job_id = floorline_engine::ids::JobId::new();
    let mapper = JobMapper::with_null_catalog(context_store.clone());
    mapper.assign(&code, job_id, None, 100, 1.0, None, "operator", false).unwrap();

    let mut outcome = None;
    for produced in (10..=100).step_by(10) {
        outcome = Some(
            mapper
                .update_progress(&code, ProgressMetrics { product_count: produced, production_efficiency: 1.0, quality_rate: 1.0 }, now)
                .await
                .unwrap(),
        );
    }

    match outcome {
        Some(JobUpdateOutcome::Completed(summary)) => {
            assert_eq!(summary.job_id, job_id);
            assert_eq!(summary.actual_quantity, 100);
        }
        other => panic!("expected Completed on the final tick, got {other:?}"),
    }

    let ctx = context_store.get(&code).unwrap();
    assert!(ctx.current_job_id.is_none());
    assert_eq!(ctx.actual_quantity, 0);
}

/// Two subscribers with different topic scopes each see exactly the
/// events their subscriptions cover; unsubscribing stops further
/// delivery.
#[test]
fn subscription_hub_filters_by_topic_scope() {
    let hub = SubscriptionHub::new();
    let (tx_a, _rx_a) = tokio::sync::mpsc::channel(8);
    let (tx_b, _rx_b) = tokio::sync::mpsc::channel(8);
    let now = Utc::now();
    let conn_a = hub.register(UserId::new(), tx_a, now);
    let conn_b = hub.register(UserId::new(), tx_b, now);

    let line1 = LineId::new();
    let line2 = LineId::new();
    hub.subscribe(conn_a, "oee", Some(&line1.to_string())).unwrap();
    hub.subscribe(conn_b, "oee", None).unwrap();

    let reading_line1 = sample_oee_event(line1);
    let keys_line1 = reading_line1.routing_keys();
    assert!(hub.is_subscribed_to_any(conn_a, &keys_line1));
    assert!(hub.is_subscribed_to_any(conn_b, &keys_line1));

    let reading_line2 = sample_oee_event(line2);
    let keys_line2 = reading_line2.routing_keys();
    assert!(!hub.is_subscribed_to_any(conn_a, &keys_line2));
    assert!(hub.is_subscribed_to_any(conn_b, &keys_line2));

    hub.unsubscribe(conn_a, "oee", Some(&line1.to_string())).unwrap();
    assert!(!hub.is_subscribed_to_any(conn_a, &keys_line1));
}

fn sample_oee_event(line_id: LineId) -> EngineEvent {
    use floorline_engine::ids::{EquipmentCode as Code, OeeReadingId};
    use floorline_engine::oee::OeeReading;
    EngineEvent::OeeUpdate {
        timestamp: Utc::now(),
        payload: OeeReading {
            id: OeeReadingId::new(),
            line_id,
            equipment_code: Code::from("L1-FILLER"),
            calculation_time: Utc::now(),
            window_seconds: 3600,
            availability: 1.0,
            performance: 1.0,
            quality: 1.0,
            oee: 1.0,
            planned_production_time: 3600,
            actual_production_time: 3600,
            ideal_cycle_time: 1.0,
            actual_cycle_time: 1.0,
            good_parts: 100,
            total_parts: 100,
        },
    }
}

/// An escalation timer fires once its acknowledgment deadline passes and
/// stops once the event is acknowledged.
#[tokio::test]
async fn andon_event_escalates_after_its_ack_timeout_and_stops_once_acknowledged() {
    let engine = AndonEngine::new(Arc::new(NullDirectory));
    let now = Utc::now();
    let new = floorline_engine::andon::NewAndonEvent {
        line_id: LineId::new(),
        equipment_code: EquipmentCode::from("L1-CAPPER"),
        event_type: AndonEventType::Maintenance,
        priority: AndonPriority::Medium,
        description: "jam".to_string(),
        reported_by: "operator".to_string(),
        auto_generated: false,
        plc_source: false,
        fault_data: None,
        related_downtime_event_id: None,
    };
    let event = engine.create(new, now).unwrap();

    let ack_timeout = AndonThresholds::ack_timeout(AndonPriority::Medium);
    let before_deadline = engine.run_timer_sweep(now + ChronoDuration::seconds(ack_timeout.as_secs() as i64 - 1));
    assert!(before_deadline.is_empty());

    let at_deadline = engine.run_timer_sweep(now + ChronoDuration::seconds(ack_timeout.as_secs() as i64));
    assert_eq!(at_deadline.len(), 1);
    assert_eq!(at_deadline[0].event_id, event.id);

    engine.acknowledge(event.id, "operator", now + ChronoDuration::seconds(ack_timeout.as_secs() as i64 + 5)).await.unwrap();
    let after_ack = engine.run_timer_sweep(now + ChronoDuration::hours(1));
    assert!(after_ack.is_empty());
}

/// Publishing to the event bus reaches every current subscriber exactly
/// once, regardless of subscriber count.
#[tokio::test]
async fn event_bus_delivers_to_all_subscribers() {
    let bus = EventBus::new(16);
    let mut rx1 = bus.subscribe();
    let mut rx2 = bus.subscribe();

    bus.publish(EngineEvent::SystemAlert {
        timestamp: Utc::now(),
        payload: floorline_engine::events::SystemAlertPayload { message: "test".to_string(), severity: "info".to_string() },
    });

    let got1 = rx1.recv().await.unwrap();
    let got2 = rx2.recv().await.unwrap();
    assert!(matches!(*got1, EngineEvent::SystemAlert { .. }));
    assert!(matches!(*got2, EngineEvent::SystemAlert { .. }));
}
