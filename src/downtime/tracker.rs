//! Downtime Tracker (C5) — spec §4.3.
//!
//! Per-equipment `RUNNING`/`DOWN` state machine. Grounded on the
//! teacher's `pipeline/coordinator.rs` per-equipment sequential
//! tick-processing shape, generalized so the open-event index is a
//! `DashMap` (single-writer-per-key, matching §5's "Downtime active-event
//! index is single-writer-per-key").

use super::event::{ContextSnapshot, DowntimeEvent, DowntimeStatus, FaultSnapshot};
use super::reason::classify;
use crate::audit::{AuditLog, AuditRecord};
use crate::faults::FaultCatalog;
use crate::ids::{DowntimeEventId, EquipmentCode, LineId};
use crate::storage::{memory::InMemoryStore, Store, StorageError};
use crate::telemetry::{DerivedMetrics, EquipmentContext};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DowntimeError {
    #[error("no downtime event {0} found")]
    NotFound(DowntimeEventId),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub enum DowntimeTransition {
    Opened(DowntimeEvent),
    Closed(DowntimeEvent),
    Merged,
}

#[derive(Debug, Default, Clone)]
pub struct DowntimeFilters {
    pub line_id: Option<LineId>,
    pub equipment_code: Option<EquipmentCode>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct DowntimeStatistics {
    pub total_events: usize,
    pub total_duration_seconds: i64,
    pub average_duration_seconds: f64,
    pub by_reason: std::collections::HashMap<String, usize>,
    pub by_day: std::collections::HashMap<String, i64>,
}

pub struct DowntimeTracker {
    open_events: DashMap<EquipmentCode, DowntimeEvent>,
    history: Arc<dyn Store<DowntimeEventId, DowntimeEvent>>,
    audit: AuditLog,
}

impl DowntimeTracker {
    pub fn new() -> Self {
        Self {
            open_events: DashMap::new(),
            history: Arc::new(InMemoryStore::new()),
            audit: AuditLog::default(),
        }
    }

    pub fn with_store(history: Arc<dyn Store<DowntimeEventId, DowntimeEvent>>) -> Self {
        Self {
            open_events: DashMap::new(),
            history,
            audit: AuditLog::default(),
        }
    }

    /// One tick's worth of downtime-state evaluation for one equipment.
    /// Spec §4.3 transitions: RUNNING->DOWN opens, DOWN->DOWN merges,
    /// DOWN->RUNNING closes.
    pub async fn process_tick(
        &self,
        line_id: LineId,
        equipment_code: &EquipmentCode,
        metrics: &DerivedMetrics,
        context: &EquipmentContext,
        catalog: &FaultCatalog,
        tick_time: DateTime<Utc>,
    ) -> Result<Option<DowntimeTransition>, DowntimeError> {
        if metrics.running {
            return self.close_if_open(equipment_code, tick_time).await;
        }

        if let Some(mut entry) = self.open_events.get_mut(equipment_code) {
            entry.merge_fault_data(&metrics.fault_bits, &metrics.active_alarms);
            return Ok(Some(DowntimeTransition::Merged));
        }

        let classified = classify(&metrics.fault_bits, metrics, context, catalog);
        let event = DowntimeEvent::open(
            line_id,
            equipment_code.clone(),
            tick_time,
            classified.reason_code,
            classified.reason_description,
            classified.category,
            classified.subcategory,
            FaultSnapshot {
                fault_bits: metrics.fault_bits.clone(),
                active_alarms: metrics.active_alarms.clone(),
            },
            ContextSnapshot {
                operator: context.operator.clone(),
                shift: context.shift.clone(),
                job_id: context.current_job_id.map(|j| j.to_string()),
                recovered: false,
            },
            true,
        );
        self.open_events.insert(equipment_code.clone(), event.clone());
        self.audit.record(AuditRecord::new(
            "downtime_event",
            event.id.to_string(),
            None,
            "opened",
        ));
        Ok(Some(DowntimeTransition::Opened(event)))
    }

    /// Synthesizes a `PLC_FAULT` downtime when the driver reports
    /// `communication_status = lost` (spec §4.9 step 1).
    pub async fn synthesize_plc_fault(
        &self,
        line_id: LineId,
        equipment_code: &EquipmentCode,
        tick_time: DateTime<Utc>,
    ) -> Result<Option<DowntimeTransition>, DowntimeError> {
        if self.open_events.contains_key(equipment_code) {
            return Ok(None);
        }
        let event = DowntimeEvent::open(
            line_id,
            equipment_code.clone(),
            tick_time,
            "PLC_FAULT".to_string(),
            "Lost communication with device driver".to_string(),
            super::reason::DowntimeCategory::Unplanned,
            None,
            FaultSnapshot {
                fault_bits: crate::faults::FixedBitVec::zeroed(0),
                active_alarms: Default::default(),
            },
            ContextSnapshot::default(),
            true,
        );
        self.open_events.insert(equipment_code.clone(), event.clone());
        Ok(Some(DowntimeTransition::Opened(event)))
    }

    async fn close_if_open(
        &self,
        equipment_code: &EquipmentCode,
        tick_time: DateTime<Utc>,
    ) -> Result<Option<DowntimeTransition>, DowntimeError> {
        let Some((_, mut event)) = self.open_events.remove(equipment_code) else {
            return Ok(None);
        };
        event.close(tick_time);
        self.history.put(event.id, event.clone()).await?;
        self.audit.record(AuditRecord::new(
            "downtime_event",
            event.id.to_string(),
            None,
            "closed",
        ));
        Ok(Some(DowntimeTransition::Closed(event)))
    }

    pub fn open_event(&self, equipment_code: &EquipmentCode) -> Option<DowntimeEvent> {
        self.open_events.get(equipment_code).map(|e| e.value().clone())
    }

    /// `confirm` (spec §4.3): allowed on `closed` or `open` events.
    pub async fn confirm(
        &self,
        event_id: DowntimeEventId,
        by: &str,
        notes: Option<String>,
    ) -> Result<DowntimeEvent, DowntimeError> {
        if let Some(mut entry) = self
            .open_events
            .iter_mut()
            .find(|e| e.value().id == event_id)
        {
            entry.status = DowntimeStatus::Confirmed;
            entry.confirmed_by = Some(by.to_string());
            entry.confirmed_at = Some(Utc::now());
            if notes.is_some() {
                entry.notes = notes;
            }
            return Ok(entry.value().clone());
        }

        let mut event = self
            .history
            .get(&event_id)
            .await?
            .ok_or(DowntimeError::NotFound(event_id))?;
        event.status = DowntimeStatus::Confirmed;
        event.confirmed_by = Some(by.to_string());
        event.confirmed_at = Some(Utc::now());
        if notes.is_some() {
            event.notes = notes;
        }
        self.history.put(event_id, event.clone()).await?;
        Ok(event)
    }

    pub async fn list(&self, filters: &DowntimeFilters, limit: usize, offset: usize) -> Result<Vec<DowntimeEvent>, DowntimeError> {
        let mut events: Vec<DowntimeEvent> = self.history.list().await?;
        events.extend(self.open_events.iter().map(|e| e.value().clone()));
        events.retain(|e| {
            filters.line_id.map_or(true, |l| l == e.line_id)
                && filters
                    .equipment_code
                    .as_ref()
                    .map_or(true, |c| c == &e.equipment_code)
                && filters.from.map_or(true, |f| e.start_time >= f)
                && filters.to.map_or(true, |t| e.start_time <= t)
        });
        events.sort_by_key(|e| std::cmp::Reverse(e.start_time));
        Ok(events.into_iter().skip(offset).take(limit).collect())
    }

    pub async fn statistics(&self, filters: &DowntimeFilters) -> Result<DowntimeStatistics, DowntimeError> {
        let events = self.list(filters, usize::MAX, 0).await?;
        let mut stats = DowntimeStatistics::default();
        for event in &events {
            stats.total_events += 1;
            if let Some(duration) = event.duration_seconds {
                stats.total_duration_seconds += duration;
                *stats.by_day.entry(event.start_time.format("%Y-%m-%d").to_string()).or_insert(0) += duration;
            }
            *stats.by_reason.entry(event.reason_code.clone()).or_insert(0) += 1;
        }
        stats.average_duration_seconds = if stats.total_events > 0 {
            stats.total_duration_seconds as f64 / stats.total_events as f64
        } else {
            0.0
        };
        Ok(stats)
    }
}

impl Default for DowntimeTracker {
    fn default() -> Self {
        Self::new()
    }
}
