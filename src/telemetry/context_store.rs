//! Equipment Context Store (C4) — spec §4.2.
//!
//! Holds one `EquipmentContext` per equipment code with single-writer-per-key
//! semantics: readers never block writers at a different key, and two
//! writers at the same key serialize. Grounded on the teacher's
//! `pipeline/state.rs` `Arc<RwLock<AppState>>` sharing pattern, generalized
//! from one global lock to a `DashMap` of per-key entries so the lock
//! granularity matches the concurrency the spec actually requires (per §5
//! "Shared-resource policy").

use super::context::{ChangeoverStatus, EquipmentContext, FaultStatus};
use crate::audit::{AuditLog, AuditRecord};
use crate::ids::{EquipmentCode, JobId, LineId, ProductTypeId, ScheduleId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextStoreError {
    #[error("no context registered for equipment {0}")]
    NotFound(EquipmentCode),
    #[error("invariant violated for equipment {equipment_code}: {reason}")]
    InvariantViolated {
        equipment_code: EquipmentCode,
        reason: String,
    },
    #[error("equipment {0} already has an assigned job; pass force=true to override")]
    AlreadyAssigned(EquipmentCode),
}

/// A partial update to an `EquipmentContext`. Fields left `None` are
/// untouched; fields that can themselves be cleared (e.g. `current_job_id`)
/// take `Option<Option<T>>` so "clear this" and "leave alone" are distinct.
#[derive(Debug, Clone, Default)]
pub struct ContextDelta {
    pub current_job_id: Option<Option<JobId>>,
    pub schedule_id: Option<Option<ScheduleId>>,
    pub product_type_id: Option<Option<ProductTypeId>>,
    pub target_quantity: Option<u64>,
    pub actual_quantity: Option<u64>,
    pub target_speed: Option<f64>,
    pub operator: Option<Option<String>>,
    pub shift: Option<Option<String>>,
    pub planned_stop: Option<bool>,
    pub planned_stop_reason: Option<Option<String>>,
    pub changeover_status: Option<ChangeoverStatus>,
    pub fault_status: Option<FaultStatus>,
    pub active_fault_bit: Option<Option<usize>>,
    pub fault_detected_at: Option<Option<DateTime<Utc>>>,
    pub last_production_update: Option<DateTime<Utc>>,
    pub production_efficiency: Option<f64>,
    pub quality_rate: Option<f64>,
    pub default_quality_rate: Option<f64>,
    pub planned_stop_is_preventive: Option<bool>,
    pub material_shortage_is_raw: Option<bool>,
}

impl ContextDelta {
    fn apply_to(self, ctx: &mut EquipmentContext) {
        if let Some(v) = self.current_job_id {
            ctx.current_job_id = v;
        }
        if let Some(v) = self.schedule_id {
            ctx.schedule_id = v;
        }
        if let Some(v) = self.product_type_id {
            ctx.product_type_id = v;
        }
        if let Some(v) = self.target_quantity {
            ctx.target_quantity = v;
        }
        if let Some(v) = self.actual_quantity {
            ctx.actual_quantity = v;
        }
        if let Some(v) = self.target_speed {
            ctx.target_speed = v;
        }
        if let Some(v) = self.operator {
            ctx.operator = v;
        }
        if let Some(v) = self.shift {
            ctx.shift = v;
        }
        if let Some(v) = self.planned_stop {
            ctx.planned_stop = v;
        }
        if let Some(v) = self.planned_stop_reason {
            ctx.planned_stop_reason = v;
        }
        if let Some(v) = self.changeover_status {
            ctx.changeover_status = v;
        }
        if let Some(v) = self.fault_status {
            ctx.fault_status = v;
        }
        if let Some(v) = self.active_fault_bit {
            ctx.active_fault_bit = v;
        }
        if let Some(v) = self.fault_detected_at {
            ctx.fault_detected_at = v;
        }
        if let Some(v) = self.last_production_update {
            ctx.last_production_update = v;
        }
        if let Some(v) = self.production_efficiency {
            ctx.production_efficiency = v;
        }
        if let Some(v) = self.quality_rate {
            ctx.quality_rate = v;
        }
        if let Some(v) = self.default_quality_rate {
            ctx.default_quality_rate = v;
        }
        if let Some(v) = self.planned_stop_is_preventive {
            ctx.planned_stop_is_preventive = v;
        }
        if let Some(v) = self.material_shortage_is_raw {
            ctx.material_shortage_is_raw = v;
        }
    }
}

#[derive(Debug)]
pub struct ContextStore {
    contexts: DashMap<EquipmentCode, EquipmentContext>,
    audit: AuditLog,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
            audit: AuditLog::default(),
        }
    }

    /// Registers equipment with a fresh default context if it has none yet.
    /// No-op if the equipment is already known.
    pub fn register(&self, equipment_code: EquipmentCode, line_id: LineId, now: DateTime<Utc>) {
        self.contexts
            .entry(equipment_code)
            .or_insert_with(|| EquipmentContext::new(line_id, now));
    }

    pub fn get(&self, equipment_code: &EquipmentCode) -> Option<EquipmentContext> {
        self.contexts.get(equipment_code).map(|r| r.value().clone())
    }

    pub fn contains(&self, equipment_code: &EquipmentCode) -> bool {
        self.contexts.contains_key(equipment_code)
    }

    pub fn equipment_codes(&self) -> Vec<EquipmentCode> {
        self.contexts.iter().map(|r| r.key().clone()).collect()
    }

    /// Applies a delta to one equipment's context and returns the new
    /// context. Re-validates invariants after applying; on violation the
    /// mutation is rolled back and the entry left as it was.
    pub fn apply(
        &self,
        equipment_code: &EquipmentCode,
        delta: ContextDelta,
    ) -> Result<EquipmentContext, ContextStoreError> {
        let mut entry = self
            .contexts
            .get_mut(equipment_code)
            .ok_or_else(|| ContextStoreError::NotFound(equipment_code.clone()))?;

        let before = entry.value().clone();
        delta.apply_to(entry.value_mut());

        if let Err(reason) = entry.value().check_invariants() {
            *entry.value_mut() = before;
            return Err(ContextStoreError::InvariantViolated {
                equipment_code: equipment_code.clone(),
                reason,
            });
        }

        Ok(entry.value().clone())
    }

    /// `update` (spec §4.2): atomic merge with an audited `reason`.
    pub fn update(
        &self,
        equipment_code: &EquipmentCode,
        delta: ContextDelta,
        reason: &str,
    ) -> Result<EquipmentContext, ContextStoreError> {
        let before = self.get(equipment_code);
        let after = self.apply(equipment_code, delta)?;
        self.audit.record(
            AuditRecord::new("equipment_context", equipment_code.to_string(), None, reason)
                .with_before(&before)
                .with_after(&after),
        );
        Ok(after)
    }

    /// `assign_job` (spec §4.2): fails if a job is already assigned unless
    /// `force` is set.
    #[allow(clippy::too_many_arguments)]
    pub fn assign_job(
        &self,
        equipment_code: &EquipmentCode,
        job_id: JobId,
        schedule_id: Option<ScheduleId>,
        target_quantity: u64,
        target_speed: f64,
        product_type_id: Option<ProductTypeId>,
        by: &str,
        force: bool,
    ) -> Result<EquipmentContext, ContextStoreError> {
        let current = self
            .get(equipment_code)
            .ok_or_else(|| ContextStoreError::NotFound(equipment_code.clone()))?;
        if current.current_job_id.is_some() && !force {
            return Err(ContextStoreError::AlreadyAssigned(equipment_code.clone()));
        }
        let delta = ContextDelta {
            current_job_id: Some(Some(job_id)),
            schedule_id: Some(schedule_id),
            product_type_id: Some(product_type_id),
            target_quantity: Some(target_quantity),
            target_speed: Some(target_speed),
            actual_quantity: Some(0),
            changeover_status: Some(ChangeoverStatus::None),
            ..Default::default()
        };
        self.update(equipment_code, delta, &format!("assign_job by {by}"))
    }

    /// `unassign_job` (spec §4.2): clears job fields and resets progress.
    pub fn unassign_job(
        &self,
        equipment_code: &EquipmentCode,
        by: &str,
    ) -> Result<EquipmentContext, ContextStoreError> {
        let delta = ContextDelta {
            current_job_id: Some(None),
            schedule_id: Some(None),
            product_type_id: Some(None),
            target_quantity: Some(0),
            actual_quantity: Some(0),
            production_efficiency: Some(0.0),
            quality_rate: Some(1.0),
            changeover_status: Some(ChangeoverStatus::None),
            ..Default::default()
        };
        self.update(equipment_code, delta, &format!("unassign_job by {by}"))
    }

    pub fn audit_trail(&self, equipment_code: &EquipmentCode) -> Vec<AuditRecord> {
        self.audit.for_entity("equipment_context", &equipment_code.to_string())
    }

    pub fn remove(&self, equipment_code: &EquipmentCode) -> Option<EquipmentContext> {
        self.contexts.remove(equipment_code).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::LineId;

    fn store_with_one(code: &str) -> (ContextStore, EquipmentCode) {
        let store = ContextStore::new();
        let code = EquipmentCode::from(code);
        store.register(code.clone(), LineId::new(), Utc::now());
        (store, code)
    }

    #[test]
    fn register_is_idempotent() {
        let (store, code) = store_with_one("LINE1-FILLER");
        let first = store.get(&code).unwrap();
        store.register(code.clone(), LineId::new(), Utc::now());
        let second = store.get(&code).unwrap();
        assert_eq!(first.line_id, second.line_id);
    }

    #[test]
    fn unknown_equipment_returns_not_found() {
        let store = ContextStore::new();
        let code = EquipmentCode::from("MISSING");
        let delta = ContextDelta::default();
        assert!(matches!(
            store.apply(&code, delta),
            Err(ContextStoreError::NotFound(_))
        ));
    }

    #[test]
    fn apply_updates_targeted_fields_only() {
        let (store, code) = store_with_one("LINE1-FILLER");
        let delta = ContextDelta {
            target_speed: Some(120.0),
            ..Default::default()
        };
        let updated = store.apply(&code, delta).unwrap();
        assert_eq!(updated.target_speed, 120.0);
        assert_eq!(updated.target_quantity, 0);
    }

    #[test]
    fn delta_can_clear_an_optional_field() {
        let (store, code) = store_with_one("LINE1-FILLER");
        let job_id = JobId::new();
        store
            .apply(
                &code,
                ContextDelta {
                    current_job_id: Some(Some(job_id)),
                    target_quantity: Some(100),
                    ..Default::default()
                },
            )
            .unwrap();
        let cleared = store
            .apply(
                &code,
                ContextDelta {
                    current_job_id: Some(None),
                    target_quantity: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.current_job_id.is_none());
    }

    #[test]
    fn assign_job_fails_when_already_assigned_without_force() {
        let (store, code) = store_with_one("LINE1-FILLER");
        store
            .assign_job(&code, JobId::new(), None, 100, 50.0, None, "alice", false)
            .unwrap();
        let result = store.assign_job(&code, JobId::new(), None, 100, 50.0, None, "bob", false);
        assert!(matches!(result, Err(ContextStoreError::AlreadyAssigned(_))));
    }

    #[test]
    fn assign_job_with_force_overrides_existing_assignment() {
        let (store, code) = store_with_one("LINE1-FILLER");
        store
            .assign_job(&code, JobId::new(), None, 100, 50.0, None, "alice", false)
            .unwrap();
        let second_job = JobId::new();
        let updated = store
            .assign_job(&code, second_job, None, 200, 60.0, None, "bob", true)
            .unwrap();
        assert_eq!(updated.current_job_id, Some(second_job));
        assert_eq!(updated.target_quantity, 200);
    }

    #[test]
    fn unassign_job_resets_progress_fields() {
        let (store, code) = store_with_one("LINE1-FILLER");
        store
            .assign_job(&code, JobId::new(), None, 100, 50.0, None, "alice", false)
            .unwrap();
        let cleared = store.unassign_job(&code, "alice").unwrap();
        assert!(cleared.current_job_id.is_none());
        assert_eq!(cleared.target_quantity, 0);
        assert_eq!(cleared.quality_rate, 1.0);
    }

    #[test]
    fn update_writes_an_audit_record() {
        let (store, code) = store_with_one("LINE1-FILLER");
        store
            .update(
                &code,
                ContextDelta {
                    target_speed: Some(80.0),
                    ..Default::default()
                },
                "operator override",
            )
            .unwrap();
        let trail = store.audit_trail(&code);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].what, "operator override");
    }

    #[test]
    fn invariant_violation_is_rolled_back() {
        let (store, code) = store_with_one("LINE1-FILLER");
        let before = store.get(&code).unwrap();
        let result = store.apply(
            &code,
            ContextDelta {
                target_quantity: Some(50),
                ..Default::default()
            },
        );
        assert!(result.is_err());
        let after = store.get(&code).unwrap();
        assert_eq!(before.target_quantity, after.target_quantity);
    }
}
