//! Andon Engine (C8) — spec §4.6.
//!
//! Auto-creation/dedup from PLC fault analysis, manual creation, the
//! state machine, escalation handling and statistics. Grounded on
//! `andon_service.py` (original_source) for `ESCALATION_LEVELS` and the
//! dashboard aggregation formulas, and on the teacher's
//! `fleet/queue.rs` for the durable bounded-queue-with-retry posture
//! applied here to escalation records.

use super::timers::{EscalationKind, EscalationRecord, RecipientDirectory, TimerWheel};
use super::types::{
    AndonEvent, AndonEventType, AndonFilters, AndonPriority, AndonStatistics, AndonStatus,
    EquipmentAndonRanking, NewAndonEvent,
};
use crate::audit::{AuditLog, AuditRecord};
use crate::config::{AndonCategory, AndonThresholds};
use crate::downtime::FaultSnapshot;
use crate::faults::FaultDefinition;
use crate::ids::{AndonEventId, EquipmentCode, LineId};
use crate::storage::{memory::InMemoryStore, Store, StorageError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AndonError {
    #[error("andon event {0} not found")]
    NotFound(AndonEventId),
    #[error("an active andon event already exists for this line/equipment/event_type")]
    DuplicateActive,
    #[error("event cannot transition from {from:?} to {to:?}")]
    InvalidTransition { from: AndonStatus, to: AndonStatus },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The tick's fault analysis, already bucketed by category (spec §4.6:
/// "the tick's fault analysis (categorized as critical / high / medium /
/// low / upstream / downstream / material / quality)").
#[derive(Debug, Clone, Default)]
pub struct TickFaultAnalysis {
    pub by_category: std::collections::HashMap<AndonCategory, Vec<FaultDefinition>>,
}

impl TickFaultAnalysis {
    pub fn faults_for(&self, category: AndonCategory) -> &[FaultDefinition] {
        self.by_category.get(&category).map_or(&[], |v| v.as_slice())
    }
}

/// Maps an Andon category to the `AndonEventType`/`priority` pair its
/// auto-created events carry (spec §4.6 threshold table). Internal-fault
/// severities (critical/high/medium/low) all map to `maintenance`, per
/// `_classify_fault_category_for_andon` in the original source.
fn event_type_for(category: AndonCategory) -> AndonEventType {
    match category {
        AndonCategory::Critical | AndonCategory::High | AndonCategory::Medium | AndonCategory::Low => {
            AndonEventType::Maintenance
        }
        AndonCategory::Upstream => AndonEventType::Upstream,
        AndonCategory::Downstream => AndonEventType::Downstream,
        AndonCategory::Material => AndonEventType::Material,
        AndonCategory::Quality => AndonEventType::Quality,
    }
}

/// Builds a deterministic description from up to the first three fault
/// names (spec §4.6 "Description is built deterministically from up to
/// the first three fault names").
fn describe_faults(faults: &[FaultDefinition]) -> String {
    let names: Vec<&str> = faults.iter().take(3).map(|f| f.name.as_str()).collect();
    if names.is_empty() {
        "Unclassified fault condition".to_string()
    } else {
        names.join(", ")
    }
}

pub struct AndonEngine {
    /// Non-terminal events, keyed by id, for fast status-transition and
    /// timer-driven access.
    active: DashMap<AndonEventId, AndonEvent>,
    history: Arc<dyn Store<AndonEventId, AndonEvent>>,
    timers: TimerWheel,
    directory: Arc<dyn RecipientDirectory>,
    audit: AuditLog,
}

impl AndonEngine {
    pub fn new(directory: Arc<dyn RecipientDirectory>) -> Self {
        Self {
            active: DashMap::new(),
            history: Arc::new(InMemoryStore::new()),
            timers: TimerWheel::new(),
            directory,
            audit: AuditLog::default(),
        }
    }

    pub fn with_store(directory: Arc<dyn RecipientDirectory>, history: Arc<dyn Store<AndonEventId, AndonEvent>>) -> Self {
        Self {
            active: DashMap::new(),
            history,
            timers: TimerWheel::new(),
            directory,
            audit: AuditLog::default(),
        }
    }

    fn has_active_duplicate(&self, line_id: LineId, equipment_code: &EquipmentCode, event_type: AndonEventType) -> bool {
        self.active
            .iter()
            .any(|e| e.line_id == line_id && &e.equipment_code == equipment_code && e.event_type == event_type)
    }

    fn insert_active(&self, event: AndonEvent) -> AndonEvent {
        self.timers.arm(event.id, event.priority, event.reported_at);
        self.audit.record(AuditRecord::new("andon_event", event.id.to_string(), None, "created"));
        self.active.insert(event.id, event.clone());
        event
    }

    /// `create` (spec §4.6 "Manual creation"): validated against the same
    /// uniqueness rule as auto-creation.
    pub fn create(&self, new: NewAndonEvent, now: DateTime<Utc>) -> Result<AndonEvent, AndonError> {
        if self.has_active_duplicate(new.line_id, &new.equipment_code, new.event_type) {
            return Err(AndonError::DuplicateActive);
        }
        Ok(self.insert_active(AndonEvent::from_new(new, now)))
    }

    /// Runs the per-category auto-creation pass for one tick (spec §4.6).
    /// Returns every event newly created this tick (categories that are
    /// disabled, below threshold, or already have an active duplicate
    /// produce nothing).
    pub fn auto_create(
        &self,
        line_id: LineId,
        equipment_code: &EquipmentCode,
        analysis: &TickFaultAnalysis,
        thresholds: &AndonThresholds,
        reported_by: &str,
        now: DateTime<Utc>,
    ) -> Vec<AndonEvent> {
        let mut created = Vec::new();
        for category in AndonCategory::ALL {
            let faults = analysis.faults_for(category);
            if faults.is_empty() {
                continue;
            }
            let cfg = thresholds.get(category);
            if !cfg.enabled || faults.len() < cfg.min_faults {
                continue;
            }
            let event_type = event_type_for(category);
            if self.has_active_duplicate(line_id, equipment_code, event_type) {
                continue;
            }
            let new = NewAndonEvent {
                line_id,
                equipment_code: equipment_code.clone(),
                event_type,
                priority: cfg.priority,
                description: describe_faults(faults),
                reported_by: reported_by.to_string(),
                auto_generated: true,
                plc_source: true,
                fault_data: None,
                related_downtime_event_id: None,
            };
            created.push(self.insert_active(AndonEvent::from_new(new, now)));
        }
        created
    }

    /// Auto-creates from an already-classified downtime event, carrying
    /// its fault snapshot and linking back to it (used by the poller when
    /// a downtime event opens with fault data attached).
    pub fn auto_create_from_downtime(
        &self,
        line_id: LineId,
        equipment_code: &EquipmentCode,
        event_type: AndonEventType,
        priority: AndonPriority,
        description: String,
        fault_data: FaultSnapshot,
        related_downtime_event_id: crate::ids::DowntimeEventId,
        reported_by: &str,
        now: DateTime<Utc>,
    ) -> Option<AndonEvent> {
        if self.has_active_duplicate(line_id, equipment_code, event_type) {
            return None;
        }
        let new = NewAndonEvent {
            line_id,
            equipment_code: equipment_code.clone(),
            event_type,
            priority,
            description,
            reported_by: reported_by.to_string(),
            auto_generated: true,
            plc_source: true,
            fault_data: Some(fault_data),
            related_downtime_event_id: Some(related_downtime_event_id),
        };
        Some(self.insert_active(AndonEvent::from_new(new, now)))
    }

    fn transition(&self, event_id: AndonEventId, next: AndonStatus) -> Result<AndonEvent, AndonError> {
        let mut entry = self.active.get_mut(&event_id).ok_or(AndonError::NotFound(event_id))?;
        if !entry.status.can_transition_to(next) {
            return Err(AndonError::InvalidTransition { from: entry.status, to: next });
        }
        entry.status = next;
        Ok(entry.value().clone())
    }

    /// `acknowledge(id, by)` (spec §4.6): requires status in
    /// {open, escalated}; idempotent in the sense that acknowledging an
    /// already-acknowledged event is rejected, not silently repeated.
    pub async fn acknowledge(&self, event_id: AndonEventId, by: &str, now: DateTime<Utc>) -> Result<AndonEvent, AndonError> {
        let updated = {
            let mut entry = self.active.get_mut(&event_id).ok_or(AndonError::NotFound(event_id))?;
            if !matches!(entry.status, AndonStatus::Open | AndonStatus::Escalated) {
                return Err(AndonError::InvalidTransition { from: entry.status, to: AndonStatus::Acknowledged });
            }
            entry.status = AndonStatus::Acknowledged;
            entry.acknowledged_by = Some(by.to_string());
            entry.acknowledged_at = Some(now);
            entry.value().clone()
        };
        self.timers.cancel_acknowledgment(event_id);
        self.audit.record(AuditRecord::new("andon_event", event_id.to_string(), Some(by.to_string()), "acknowledged"));
        Ok(updated)
    }

    /// `resolve(id, by, notes)` (spec §4.6): terminal; moves the event out
    /// of the active index into durable history.
    pub async fn resolve(&self, event_id: AndonEventId, by: &str, notes: Option<String>, now: DateTime<Utc>) -> Result<AndonEvent, AndonError> {
        let mut event = {
            let entry = self.active.get(&event_id).ok_or(AndonError::NotFound(event_id))?;
            if !matches!(entry.status, AndonStatus::Open | AndonStatus::Acknowledged | AndonStatus::Escalated) {
                return Err(AndonError::InvalidTransition { from: entry.status, to: AndonStatus::Resolved });
            }
            entry.value().clone()
        };
        event.status = AndonStatus::Resolved;
        event.resolved_by = Some(by.to_string());
        event.resolved_at = Some(now);
        event.resolution_notes = notes;
        self.timers.cancel_all(event_id);
        self.active.remove(&event_id);
        self.history.put(event_id, event.clone()).await?;
        self.audit.record(AuditRecord::new("andon_event", event_id.to_string(), Some(by.to_string()), "resolved"));
        Ok(event)
    }

    /// `escalate(id, level, by, notes?)` (spec §4.6): explicit escalation,
    /// idempotent to the same level.
    pub fn escalate(&self, event_id: AndonEventId, level: u32, now: DateTime<Utc>) -> Result<AndonEvent, AndonError> {
        let mut entry = self.active.get_mut(&event_id).ok_or(AndonError::NotFound(event_id))?;
        if entry.escalation_level == level {
            return Ok(entry.value().clone());
        }
        if !entry.status.can_transition_to(AndonStatus::Escalated) && entry.status != AndonStatus::Escalated {
            return Err(AndonError::InvalidTransition { from: entry.status, to: AndonStatus::Escalated });
        }
        entry.status = AndonStatus::Escalated;
        entry.escalation_level = level;
        entry.escalated_at = Some(now);
        let new_priority = entry.priority.escalated();
        entry.priority = new_priority;
        let updated = entry.value().clone();
        drop(entry);
        self.timers.rearm_after_escalation(event_id, new_priority, now);
        self.audit.record(AuditRecord::new("andon_event", event_id.to_string(), None, format!("escalated to level {level}")));
        Ok(updated)
    }

    /// Scans armed timers and applies the escalation rules of spec §4.6:
    /// an `open` event whose acknowledgment timer fires transitions to
    /// `escalated` and is re-armed at the next-higher priority; an event
    /// still `open`/`acknowledged` when its resolution timer fires gets a
    /// further escalation record (without changing status — resolution
    /// itself is a human action).
    pub fn run_timer_sweep(&self, now: DateTime<Utc>) -> Vec<EscalationRecord> {
        let mut records = Vec::new();

        for (event_id, priority) in self.timers.due_acknowledgment(now) {
            let Some(mut entry) = self.active.get_mut(&event_id) else { continue };
            if entry.status != AndonStatus::Open {
                continue;
            }
            entry.status = AndonStatus::Escalated;
            entry.escalation_level += 1;
            entry.escalated_at = Some(now);
            let new_priority = priority.escalated();
            entry.priority = new_priority;
            let escalation_level = entry.escalation_level;
            drop(entry);
            self.timers.rearm_after_escalation(event_id, new_priority, now);
            records.push(EscalationRecord {
                event_id,
                kind: EscalationKind::Acknowledgment,
                from_priority: priority,
                to_priority: new_priority,
                escalation_level,
                fired_at: now,
            });
        }

        for (event_id, priority) in self.timers.due_resolution(now) {
            let Some(mut entry) = self.active.get_mut(&event_id) else { continue };
            if matches!(entry.status, AndonStatus::Open | AndonStatus::Acknowledged) {
                entry.escalation_level += 1;
                entry.escalated_at = Some(now);
                records.push(EscalationRecord {
                    event_id,
                    kind: EscalationKind::Resolution,
                    from_priority: priority,
                    to_priority: priority,
                    escalation_level: entry.escalation_level,
                    fired_at: now,
                });
            }
        }

        records
    }

    pub fn directory(&self) -> &Arc<dyn RecipientDirectory> {
        &self.directory
    }

    pub fn get_active(&self, event_id: AndonEventId) -> Option<AndonEvent> {
        self.active.get(&event_id).map(|e| e.value().clone())
    }

    /// Active (non-resolved) events (spec §4.6 "Queries").
    pub fn active_events(&self, filters: &AndonFilters) -> Vec<AndonEvent> {
        self.active
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| matches_filters(e, filters))
            .collect()
    }

    pub async fn history_and_active(&self, filters: &AndonFilters, limit: usize, offset: usize) -> Result<Vec<AndonEvent>, AndonError> {
        let mut events: Vec<AndonEvent> = self.history.list().await?;
        events.extend(self.active.iter().map(|e| e.value().clone()));
        events.retain(|e| matches_filters(e, filters));
        events.sort_by_key(|e| std::cmp::Reverse(e.reported_at));
        Ok(events.into_iter().skip(offset).take(limit).collect())
    }

    pub async fn statistics(&self, filters: &AndonFilters) -> Result<AndonStatistics, AndonError> {
        let events = self.history_and_active(filters, usize::MAX, 0).await?;
        let mut stats = AndonStatistics::default();
        let mut resolved_durations = Vec::new();
        for event in &events {
            stats.total_events += 1;
            *stats.by_status.entry(format!("{:?}", event.status)).or_insert(0) += 1;
            *stats.by_priority.entry(format!("{:?}", event.priority)).or_insert(0) += 1;
            *stats.by_type.entry(format!("{:?}", event.event_type)).or_insert(0) += 1;
            *stats.by_hour.entry(event.reported_at.format("%H").to_string()).or_insert(0) += 1;
            *stats.by_day.entry(event.reported_at.format("%Y-%m-%d").to_string()).or_insert(0) += 1;
            if let Some(duration) = event.resolution_duration() {
                resolved_durations.push(duration.num_seconds() as f64);
            }
        }
        stats.average_resolution_seconds = if resolved_durations.is_empty() {
            0.0
        } else {
            resolved_durations.iter().sum::<f64>() / resolved_durations.len() as f64
        };
        Ok(stats)
    }

    /// Top-problematic equipment by event count (spec §4.6 "Queries" ->
    /// "top-problematic equipment"), grounded on
    /// `andon_service.py::_get_top_equipment_by_events`.
    pub async fn top_problematic_equipment(&self, filters: &AndonFilters, top_n: usize) -> Result<Vec<EquipmentAndonRanking>, AndonError> {
        let events = self.history_and_active(filters, usize::MAX, 0).await?;
        let mut counts: std::collections::HashMap<EquipmentCode, usize> = std::collections::HashMap::new();
        for event in &events {
            *counts.entry(event.equipment_code.clone()).or_insert(0) += 1;
        }
        let mut ranking: Vec<EquipmentAndonRanking> = counts
            .into_iter()
            .map(|(equipment_code, event_count)| EquipmentAndonRanking { equipment_code, event_count })
            .collect();
        ranking.sort_by_key(|r| std::cmp::Reverse(r.event_count));
        ranking.truncate(top_n);
        Ok(ranking)
    }
}

fn matches_filters(event: &AndonEvent, filters: &AndonFilters) -> bool {
    filters.line_id.map_or(true, |l| l == event.line_id)
        && filters.equipment_code.as_ref().map_or(true, |c| c == &event.equipment_code)
        && filters.status.map_or(true, |s| s == event.status)
        && filters.priority.map_or(true, |p| p == event.priority)
        && filters.from.map_or(true, |f| event.reported_at >= f)
        && filters.to.map_or(true, |t| event.reported_at <= t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::timers::NullDirectory;
    use crate::faults::{FaultDefinition, FaultOrigin, FaultSeverity};

    fn engine() -> AndonEngine {
        AndonEngine::new(Arc::new(NullDirectory))
    }

    fn new_event(line_id: LineId, code: &str, event_type: AndonEventType) -> NewAndonEvent {
        NewAndonEvent {
            line_id,
            equipment_code: EquipmentCode::from(code),
            event_type,
            priority: AndonPriority::Medium,
            description: "test".to_string(),
            reported_by: "system".to_string(),
            auto_generated: false,
            plc_source: false,
            fault_data: None,
            related_downtime_event_id: None,
        }
    }

    #[test]
    fn duplicate_active_event_is_rejected() {
        let engine = engine();
        let line_id = LineId::new();
        engine.create(new_event(line_id, "E1", AndonEventType::Maintenance), Utc::now()).unwrap();
        let result = engine.create(new_event(line_id, "E1", AndonEventType::Maintenance), Utc::now());
        assert!(matches!(result, Err(AndonError::DuplicateActive)));
    }

    #[tokio::test]
    async fn acknowledge_then_resolve_is_allowed() {
        let engine = engine();
        let line_id = LineId::new();
        let event = engine.create(new_event(line_id, "E1", AndonEventType::Stop), Utc::now()).unwrap();
        let acked = engine.acknowledge(event.id, "alice", Utc::now()).await.unwrap();
        assert_eq!(acked.status, AndonStatus::Acknowledged);
        let resolved = engine.resolve(event.id, "alice", Some("fixed".to_string()), Utc::now()).await.unwrap();
        assert_eq!(resolved.status, AndonStatus::Resolved);
    }

    #[tokio::test]
    async fn resolve_after_resolve_is_rejected() {
        let engine = engine();
        let line_id = LineId::new();
        let event = engine.create(new_event(line_id, "E1", AndonEventType::Stop), Utc::now()).unwrap();
        engine.resolve(event.id, "alice", None, Utc::now()).await.unwrap();
        let second = engine.resolve(event.id, "alice", None, Utc::now()).await;
        assert!(matches!(second, Err(AndonError::NotFound(_))));
    }

    #[test]
    fn auto_create_respects_enabled_and_min_faults() {
        let engine = engine();
        let thresholds = AndonThresholds::default();
        let line_id = LineId::new();
        let code = EquipmentCode::from("E1");
        let mut analysis = TickFaultAnalysis::default();
        analysis.by_category.insert(
            AndonCategory::Low,
            vec![FaultDefinition { bit: 10, name: "LOW1".to_string(), description: "d".to_string(), origin: FaultOrigin::Internal, severity: FaultSeverity::Low }],
        );
        let created = engine.auto_create(line_id, &code, &analysis, &thresholds, "system", Utc::now());
        assert!(created.is_empty(), "low category is disabled per spec table");
    }

    #[test]
    fn auto_create_dedupes_against_active_event() {
        let engine = engine();
        let thresholds = AndonThresholds::default();
        let line_id = LineId::new();
        let code = EquipmentCode::from("E1");
        let fault = FaultDefinition { bit: 2, name: "MOTOR_FAILURE".to_string(), description: "d".to_string(), origin: FaultOrigin::Internal, severity: FaultSeverity::Critical };
        let mut analysis = TickFaultAnalysis::default();
        analysis.by_category.insert(AndonCategory::Critical, vec![fault.clone()]);
        let first = engine.auto_create(line_id, &code, &analysis, &thresholds, "system", Utc::now());
        assert_eq!(first.len(), 1);
        let second = engine.auto_create(line_id, &code, &analysis, &thresholds, "system", Utc::now());
        assert!(second.is_empty());
    }

    #[test]
    fn acknowledgment_timeout_escalates_open_event() {
        let engine = engine();
        let line_id = LineId::new();
        let start = Utc::now();
        let event = engine.create(
            NewAndonEvent { priority: AndonPriority::Medium, ..new_event(line_id, "E1", AndonEventType::Stop) },
            start,
        ).unwrap();
        let after_ack_timeout = start + chrono::Duration::minutes(11);
        let records = engine.run_timer_sweep(after_ack_timeout);
        assert_eq!(records.len(), 1);
        let updated = engine.get_active(event.id).unwrap();
        assert_eq!(updated.status, AndonStatus::Escalated);
        assert_eq!(updated.escalation_level, 1);
        assert_eq!(updated.priority, AndonPriority::High);
    }

    #[tokio::test]
    async fn acknowledging_cancels_further_escalation() {
        let engine = engine();
        let line_id = LineId::new();
        let start = Utc::now();
        let event = engine.create(new_event(line_id, "E1", AndonEventType::Stop), start).unwrap();
        engine.acknowledge(event.id, "alice", start + chrono::Duration::minutes(1)).await.unwrap();
        let records = engine.run_timer_sweep(start + chrono::Duration::minutes(11));
        assert!(records.is_empty());
    }
}
