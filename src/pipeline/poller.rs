//! Poller (C11) — spec §4.9.
//!
//! A fixed-rate scheduler, one tick per second per line. Grounded on the
//! teacher's `pipeline/processing_loop.rs` `tokio::select!` +
//! `CancellationToken` shape (generalized here from a packet source to a
//! timer tick), with per-equipment sequential processing mirroring
//! `pipeline/coordinator.rs`.

use super::channels::EventChannels;
use super::driver::{DeviceDriver, DriverError};
use crate::andon::{AndonEngine, TickFaultAnalysis};
use crate::config::{AndonCategory, AndonThresholds};
use crate::downtime::{DowntimeCategory, DowntimeFilters, DowntimeTracker, DowntimeTransition};
use crate::events::{
    ChangeoverPayload, EngineEvent, EventBus, JobLifecyclePayload, LineStatusPayload, ProductionUpdatePayload,
    QualityAlertPayload, SystemAlertPayload,
};
use crate::faults::{FaultCatalog, FaultDefinition, FaultOrigin, FaultSeverity};
use crate::ids::{EquipmentCode, LineId, OeeReadingId};
use crate::jobs::{JobMapper, JobUpdateOutcome, ProgressMetrics};
use crate::line::ProductionLine;
use crate::oee::{self, OeeHistory, OeeInputs, OeeReading, OpenDowntime};
use crate::storage::{memory::InMemoryStore, Store};
use crate::telemetry::{ChangeoverStatus, ContextDelta, ContextStore, FaultStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything one line's Poller needs, injected at construction (spec §9
/// "Static methods and module-level singletons ... correspond here to
/// injected dependencies").
pub struct Poller {
    line: ProductionLine,
    driver: Arc<dyn DeviceDriver>,
    catalog: Arc<FaultCatalog>,
    context_store: Arc<ContextStore>,
    downtime: Arc<DowntimeTracker>,
    jobs: Arc<JobMapper>,
    andon: Arc<AndonEngine>,
    bus: Arc<EventBus>,
    channels: EventChannels,
    oee_history: OeeHistory,
    oee_store: Arc<dyn Store<OeeReadingId, OeeReading>>,
    andon_thresholds: AndonThresholds,
    oee_window: ChronoDuration,
    driver_failure_threshold: u32,
    consecutive_driver_failures: DashMap<EquipmentCode, u32>,
    tick_durations: Mutex<std::collections::VecDeque<std::time::Duration>>,
    tick_history_capacity: usize,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        line: ProductionLine,
        driver: Arc<dyn DeviceDriver>,
        catalog: Arc<FaultCatalog>,
        context_store: Arc<ContextStore>,
        downtime: Arc<DowntimeTracker>,
        jobs: Arc<JobMapper>,
        andon: Arc<AndonEngine>,
        bus: Arc<EventBus>,
        andon_thresholds: AndonThresholds,
        oee_window: ChronoDuration,
        driver_failure_threshold: u32,
    ) -> Self {
        let channels = EventChannels::spawn(bus.clone());
        Self {
            line,
            driver,
            catalog,
            context_store,
            downtime,
            jobs,
            andon,
            bus,
            channels,
            oee_history: OeeHistory::new(),
            oee_store: Arc::new(InMemoryStore::new()),
            andon_thresholds,
            oee_window,
            driver_failure_threshold,
            consecutive_driver_failures: DashMap::new(),
            tick_durations: Mutex::new(std::collections::VecDeque::new()),
            tick_history_capacity: crate::config::defaults::TICK_DURATION_WINDOW,
        }
    }

    pub fn with_oee_store(mut self, store: Arc<dyn Store<OeeReadingId, OeeReading>>) -> Self {
        self.oee_store = store;
        self
    }

    pub fn line(&self) -> &ProductionLine {
        &self.line
    }

    /// Rolling window of recent tick durations, oldest first (spec §4.9
    /// "tracks a rolling window of the last K tick durations").
    pub fn recent_tick_durations(&self) -> Vec<std::time::Duration> {
        self.tick_durations.lock().unwrap_or_else(|e| e.into_inner()).iter().copied().collect()
    }

    /// Runs until `cancel` fires, ticking once per `tick_interval`. Missed
    /// ticks are never compensated (spec §4.9 "no catch-up bursts") —
    /// `tokio::time::interval`'s default `MissedTickBehavior::Burst` is
    /// overridden to `Delay` for exactly that reason.
    pub async fn run(self: Arc<Self>, tick_interval: std::time::Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(line = %self.line.line_code, "poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let now = Utc::now();
                    self.tick(now).await;
                    self.record_tick_duration(started.elapsed(), tick_interval);
                }
            }
        }
    }

    fn record_tick_duration(&self, elapsed: std::time::Duration, budget: std::time::Duration) {
        let warn_at = budget.mul_f64(crate::config::defaults::TICK_BUDGET_WARN_FRACTION);
        if elapsed > warn_at {
            warn!(
                line = %self.line.line_code,
                elapsed_ms = elapsed.as_millis(),
                budget_ms = budget.as_millis(),
                "poller tick exceeded its budget"
            );
        }
        let mut durations = self.tick_durations.lock().unwrap_or_else(|e| e.into_inner());
        durations.push_back(elapsed);
        while durations.len() > self.tick_history_capacity {
            durations.pop_front();
        }
    }

    /// One tick for every piece of equipment on this line, followed by
    /// one Andon escalation sweep for the whole line.
    pub async fn tick(&self, now: DateTime<Utc>) {
        for equipment_code in self.line.equipment_codes.clone() {
            if let Err(e) = self.tick_equipment(&equipment_code, now).await {
                warn!(line = %self.line.line_code, equipment = %equipment_code, error = %e, "tick failed for equipment");
            }
        }

        for record in self.andon.run_timer_sweep(now) {
            self.bus.publish(EngineEvent::EscalationUpdate {
                timestamp: now,
                payload: crate::events::EscalationUpdatePayload {
                    event_id: record.event_id,
                    escalation_level: record.escalation_level,
                    priority: record.to_priority,
                },
            });
        }
    }

    async fn tick_equipment(&self, equipment_code: &EquipmentCode, now: DateTime<Utc>) -> Result<(), DriverError> {
        // Step 1: read snapshot via the device driver.
        let snapshot = match self.driver.read_all_tags(equipment_code, now).await {
            Ok(s) => s,
            Err(e) => {
                self.handle_driver_failure(equipment_code, now, e.to_string()).await;
                return Ok(());
            }
        };

        if snapshot.communication_status == crate::telemetry::CommunicationStatus::Lost {
            self.handle_driver_failure(equipment_code, now, "communication_status = lost".to_string()).await;
            return Ok(());
        }
        self.consecutive_driver_failures.remove(equipment_code);

        // Step 2: read context.
        let Some(context_before) = self.context_store.get(equipment_code) else {
            return Ok(());
        };

        // Step 3: transform raw -> metrics.
        let metrics = crate::telemetry::transform(&snapshot, &context_before);

        // Step 4: update context.
        let fault_active = metrics.fault_bits.any_set();
        let active_bit = metrics.fault_bits.set_bits().next();
        let fault_detected_at = if fault_active { Some(context_before.fault_detected_at.unwrap_or(now)) } else { None };
        let delta = ContextDelta {
            production_efficiency: Some(metrics.production_efficiency),
            quality_rate: Some(metrics.quality_rate),
            changeover_status: Some(metrics.changeover_status),
            fault_status: Some(if fault_active { FaultStatus::Active } else { FaultStatus::Clear }),
            active_fault_bit: Some(active_bit),
            fault_detected_at: Some(fault_detected_at),
            last_production_update: Some(now),
            ..Default::default()
        };
        let context = match self.context_store.update(equipment_code, delta, "poller tick") {
            Ok(c) => c,
            Err(e) => {
                warn!(equipment = %equipment_code, error = %e, "context update rejected, skipping tick");
                return Ok(());
            }
        };

        if context_before.changeover_status != ChangeoverStatus::InProgress && context.changeover_status == ChangeoverStatus::InProgress {
            self.channels.send_changeover(EngineEvent::ChangeoverStarted {
                timestamp: now,
                payload: ChangeoverPayload { line_id: self.line.id, equipment_code: equipment_code.clone() },
            });
        }
        if context.changeover_status == ChangeoverStatus::Completed && context_before.changeover_status != ChangeoverStatus::Completed {
            self.channels.send_changeover(EngineEvent::ChangeoverCompleted {
                timestamp: now,
                payload: ChangeoverPayload { line_id: self.line.id, equipment_code: equipment_code.clone() },
            });
        }

        // Step 5: feed metrics to the Downtime Tracker.
        let transition = self
            .downtime
            .process_tick(self.line.id, equipment_code, &metrics, &context, &self.catalog, now)
            .await
            .ok()
            .flatten();
        if let Some(DowntimeTransition::Opened(event) | DowntimeTransition::Closed(event)) = &transition {
            self.bus.publish(EngineEvent::DowntimeEvent { timestamp: now, payload: event.clone() });
        }

        // Step 6: update job progress via the Job Mapper.
        if context.current_job_id.is_some() {
            let progress = ProgressMetrics {
                product_count: metrics.product_count,
                production_efficiency: metrics.production_efficiency,
                quality_rate: metrics.quality_rate,
            };
            if let Ok(JobUpdateOutcome::Completed(summary)) = self.jobs.update_progress(equipment_code, progress, now).await {
                self.channels.send_job(EngineEvent::JobCompleted {
                    timestamp: now,
                    payload: JobLifecyclePayload {
                        line_id: self.line.id,
                        equipment_code: equipment_code.clone(),
                        job_id: summary.job_id,
                    },
                });
            }
        }

        self.bus.publish(EngineEvent::LineStatusUpdate {
            timestamp: now,
            payload: LineStatusPayload { line_id: self.line.id, equipment_code: equipment_code.clone(), running: metrics.running },
        });
        self.bus.publish(EngineEvent::ProductionUpdate {
            timestamp: now,
            payload: ProductionUpdatePayload {
                line_id: self.line.id,
                equipment_code: equipment_code.clone(),
                actual_quantity: context.actual_quantity,
                target_quantity: context.target_quantity,
                production_efficiency: metrics.production_efficiency,
                quality_rate: metrics.quality_rate,
            },
        });
        if metrics.quality_rate < crate::config::defaults::QUALITY_ALERT_THRESHOLD {
            self.channels.send_quality(EngineEvent::QualityAlert {
                timestamp: now,
                payload: QualityAlertPayload { line_id: self.line.id, equipment_code: equipment_code.clone(), quality_rate: metrics.quality_rate },
            });
        }

        // Step 7: recompute real-time OEE.
        let max_age = self.oee_window + ChronoDuration::seconds(1);
        self.oee_history.record(
            equipment_code,
            now,
            metrics.cycle_time,
            metrics.good_parts.unwrap_or(0),
            metrics.total_parts.unwrap_or(0),
            max_age,
        );
        let reading = self.compute_oee(equipment_code, &context, now).await;
        let _ = self.oee_store.put(reading.id, reading.clone()).await;
        self.bus.publish(EngineEvent::OeeUpdate { timestamp: now, payload: reading });

        // Step 8: Andon auto-creation from the tick's fault analysis.
        // Runs every tick, not just while down — quality and material
        // categories fire on a running line (spec §4.6 table; the
        // original's `_create_andon_from_plc_faults` runs every cycle).
        let analysis = build_fault_analysis(&metrics, &self.catalog);
        self.andon.auto_create(self.line.id, equipment_code, &analysis, &self.andon_thresholds, "poller", now);

        Ok(())
    }

    async fn handle_driver_failure(&self, equipment_code: &EquipmentCode, now: DateTime<Utc>, reason: String) {
        let count = {
            let mut entry = self.consecutive_driver_failures.entry(equipment_code.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        warn!(equipment = %equipment_code, count, reason = %reason, "device driver read failed");
        if count != self.driver_failure_threshold {
            return;
        }
        if let Ok(Some(DowntimeTransition::Opened(event))) =
            self.downtime.synthesize_plc_fault(self.line.id, equipment_code, now).await
        {
            self.bus.publish(EngineEvent::DowntimeEvent { timestamp: now, payload: event.clone() });
            self.andon.auto_create_from_downtime(
                self.line.id,
                equipment_code,
                crate::andon::AndonEventType::Stop,
                crate::andon::AndonPriority::Critical,
                "Lost communication with device driver".to_string(),
                event.fault_data.clone(),
                event.id,
                "poller:driver-outage",
                now,
            );
        }
        self.channels.send_fault(EngineEvent::SystemAlert {
            timestamp: now,
            payload: SystemAlertPayload {
                message: format!("{equipment_code}: device driver unreachable after {count} consecutive attempts"),
                severity: "critical".to_string(),
            },
        });
    }

    async fn compute_oee(&self, equipment_code: &EquipmentCode, context: &crate::telemetry::EquipmentContext, now: DateTime<Utc>) -> OeeReading {
        let window_start = now - self.oee_window;
        let filters = DowntimeFilters { line_id: Some(self.line.id), equipment_code: Some(equipment_code.clone()), from: None, to: Some(now) };
        let closed_unplanned_downtime_seconds = self
            .downtime
            .list(&filters, usize::MAX, 0)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.category == DowntimeCategory::Unplanned)
            .map(|e| overlap_seconds(e.start_time, e.end_time, window_start, now))
            .sum();
        let open_unplanned_downtime = self
            .downtime
            .open_event(equipment_code)
            .filter(|e| e.category == DowntimeCategory::Unplanned)
            .map(|e| OpenDowntime { start_time: e.start_time });

        let (actual_cycle_time_avg, good_parts, total_parts) = self.oee_history.window_metrics(equipment_code, window_start);
        let ideal_cycle_time = if context.target_speed > 0.0 { 1.0 / context.target_speed } else { 1.0 };

        let inputs = OeeInputs {
            window_start,
            window_end: now,
            closed_unplanned_downtime_seconds,
            open_unplanned_downtime,
            ideal_cycle_time,
            actual_cycle_time_avg,
            good_parts,
            total_parts,
        };
        oee::calculate(self.line.id, equipment_code.clone(), now, inputs)
    }
}

fn overlap_seconds(start: DateTime<Utc>, end: Option<DateTime<Utc>>, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> i64 {
    let Some(end) = end else { return 0 };
    let clipped_start = start.max(window_start);
    let clipped_end = end.min(window_end);
    (clipped_end - clipped_start).num_seconds().max(0)
}

/// Buckets the tick's active faults, plus material/quality conditions not
/// themselves fault bits, into the Andon category table (spec §4.6).
fn build_fault_analysis(metrics: &crate::telemetry::DerivedMetrics, catalog: &FaultCatalog) -> TickFaultAnalysis {
    let mut by_category: HashMap<AndonCategory, Vec<FaultDefinition>> = HashMap::new();
    for fault in catalog.active_faults(&metrics.fault_bits) {
        let category = match fault.origin {
            FaultOrigin::Upstream => AndonCategory::Upstream,
            FaultOrigin::Downstream => AndonCategory::Downstream,
            FaultOrigin::Internal => match fault.severity {
                FaultSeverity::Critical => AndonCategory::Critical,
                FaultSeverity::High => AndonCategory::High,
                FaultSeverity::Medium => AndonCategory::Medium,
                FaultSeverity::Low => AndonCategory::Low,
            },
        };
        by_category.entry(category).or_default().push(fault.clone());
    }
    if metrics.material_shortage || metrics.material_jam {
        let name = if metrics.material_shortage { "MATERIAL_SHORTAGE" } else { "MATERIAL_JAM" };
        by_category.entry(AndonCategory::Material).or_default().push(FaultDefinition {
            bit: usize::MAX,
            name: name.to_string(),
            description: "Material supply interruption".to_string(),
            origin: FaultOrigin::Internal,
            severity: FaultSeverity::Medium,
        });
    }
    if metrics.quality_rate < crate::config::defaults::QUALITY_ALERT_THRESHOLD {
        by_category.entry(AndonCategory::Quality).or_default().push(FaultDefinition {
            bit: usize::MAX,
            name: "QUALITY_DEGRADED".to_string(),
            description: format!("Quality rate dropped to {:.2}", metrics.quality_rate),
            origin: FaultOrigin::Internal,
            severity: FaultSeverity::Medium,
        });
    }
    TickFaultAnalysis { by_category }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::andon::{AndonEngine, NullDirectory};
    use crate::config::AndonThresholds;
    use crate::downtime::DowntimeTracker;
    use crate::events::EventBus;
    use crate::faults::FaultCatalog;
    use crate::ids::LineId;
    use crate::jobs::JobMapper;
    use crate::line::ProductionLine;
    use crate::pipeline::driver::SimulatedDriver;
    use crate::telemetry::ContextStore;
    use chrono::Duration;

    fn build_poller(code: &str, target_speed: f64) -> (Arc<Poller>, EquipmentCode) {
        let equipment_code = EquipmentCode::from(code);
        let line = ProductionLine::new("L1", "Line 1", target_speed).with_equipment([equipment_code.clone()]);

        let driver = Arc::new(SimulatedDriver::with_rates(0.0, 0.0));
        driver.register(equipment_code.clone(), target_speed);

        let context_store = Arc::new(ContextStore::new());
        context_store.register(equipment_code.clone(), line.id, Utc::now());

        let catalog = Arc::new(FaultCatalog::default_catalog());
        let downtime = Arc::new(DowntimeTracker::new());
        let jobs = Arc::new(JobMapper::with_null_catalog(context_store.clone()));
        let andon = Arc::new(AndonEngine::new(Arc::new(NullDirectory)));
        let bus = Arc::new(EventBus::new(64));

        let poller = Poller::new(
            line,
            driver,
            catalog,
            context_store,
            downtime,
            jobs,
            andon,
            bus,
            AndonThresholds::default(),
            Duration::minutes(60),
            3,
        );
        (Arc::new(poller), equipment_code)
    }

    #[tokio::test]
    async fn a_tick_with_no_job_still_publishes_line_status_and_oee() {
        let (poller, _code) = build_poller("LINE1-FILLER", 60.0);
        let mut rx = poller.bus.subscribe();
        poller.tick(Utc::now()).await;
        let mut saw_line_status = false;
        let mut saw_oee = false;
        while let Ok(event) = rx.try_recv() {
            match &*event {
                EngineEvent::LineStatusUpdate { .. } => saw_line_status = true,
                EngineEvent::OeeUpdate { .. } => saw_oee = true,
                _ => {}
            }
        }
        assert!(saw_line_status);
        assert!(saw_oee);
    }

    #[tokio::test]
    async fn driver_outage_synthesizes_downtime_after_threshold() {
        let equipment_code = EquipmentCode::from("LINE1-FILLER");
        let line = ProductionLine::new("L1", "Line 1", 60.0).with_equipment([equipment_code.clone()]);

        struct AlwaysLost;
        #[async_trait::async_trait]
        impl DeviceDriver for AlwaysLost {
            async fn read_all_tags(&self, code: &EquipmentCode, now: DateTime<Utc>) -> Result<crate::telemetry::RawSnapshot, DriverError> {
                Ok(crate::telemetry::RawSnapshot {
                    equipment_code: code.clone(),
                    timestamp: now,
                    tag_values: Default::default(),
                    fault_bits: crate::faults::FixedBitVec::zeroed(0),
                    active_alarms: Default::default(),
                    communication_status: crate::telemetry::CommunicationStatus::Lost,
                })
            }
        }

        let context_store = Arc::new(ContextStore::new());
        context_store.register(equipment_code.clone(), line.id, Utc::now());
        let downtime = Arc::new(DowntimeTracker::new());
        let poller = Poller::new(
            line,
            Arc::new(AlwaysLost),
            Arc::new(FaultCatalog::default_catalog()),
            context_store,
            downtime.clone(),
            Arc::new(JobMapper::with_null_catalog(Arc::new(ContextStore::new()))),
            Arc::new(AndonEngine::new(Arc::new(NullDirectory))),
            Arc::new(EventBus::new(64)),
            AndonThresholds::default(),
            Duration::minutes(60),
            3,
        );

        for _ in 0..4 {
            poller.tick(Utc::now()).await;
        }
        assert!(downtime.open_event(&EquipmentCode::from("LINE1-FILLER")).is_some());
    }
}
