//! Equipment–Job Mapper (C7) — spec §4.5.
//!
//! Grounded on `equipment_job_mapper.py` (original_source) for the
//! progress-percentage and estimated-completion formulas, and on the
//! teacher's `pipeline/coordinator.rs` for threading a per-tick update
//! through an already-shared piece of state (here, the Context Store)
//! rather than owning a second copy of equipment state.

use super::types::{JobCompletionSummary, JobDescription, JobUpdateOutcome, JobView, ProgressMetrics};
use crate::audit::{AuditLog, AuditRecord};
use crate::ids::{EquipmentCode, JobId, ProductTypeId, ScheduleId};
use crate::telemetry::{ContextStore, ContextStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobMapperError {
    #[error("equipment {0} has no job assigned")]
    NoJobAssigned(EquipmentCode),
    #[error(transparent)]
    ContextStore(#[from] ContextStoreError),
}

/// External lookup for descriptive job/schedule/product-type detail (spec
/// §1: HTTP CRUD for schedule/line/job records is out of scope and
/// treated as an external collaborator). The Mapper's progress math never
/// depends on this — it's display metadata only.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    async fn describe(&self, job_id: JobId) -> Option<JobDescription>;
}

/// Default catalog: no descriptive detail available. Used when no CRUD
/// layer is wired in (e.g. in tests, or a deployment that only needs the
/// telemetry-derived fields).
#[derive(Debug, Default)]
pub struct NullCatalog;

#[async_trait]
impl JobCatalog for NullCatalog {
    async fn describe(&self, _job_id: JobId) -> Option<JobDescription> {
        None
    }
}

/// Caps at 100%, two decimal places (spec §4.5 / original source's
/// `_calculate_progress_percentage`).
fn progress_percentage(actual: u64, target: u64) -> f64 {
    if target == 0 {
        return 0.0;
    }
    let pct = (actual as f64 / target as f64) * 100.0;
    (pct.min(100.0) * 100.0).round() / 100.0
}

/// `now + (target - actual) / target_speed`, or `None` if there's nothing
/// left to estimate (spec §4.5).
fn estimated_completion(actual: u64, target: u64, target_speed: f64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if target == 0 || actual >= target || target_speed <= 0.0 {
        return None;
    }
    let remaining = (target - actual) as f64;
    let seconds = remaining / target_speed;
    Some(now + chrono::Duration::milliseconds((seconds * 1000.0) as i64))
}

pub struct JobMapper {
    context_store: Arc<ContextStore>,
    catalog: Arc<dyn JobCatalog>,
    audit: AuditLog,
}

impl JobMapper {
    pub fn new(context_store: Arc<ContextStore>, catalog: Arc<dyn JobCatalog>) -> Self {
        Self {
            context_store,
            catalog,
            audit: AuditLog::default(),
        }
    }

    pub fn with_null_catalog(context_store: Arc<ContextStore>) -> Self {
        Self::new(context_store, Arc::new(NullCatalog))
    }

    /// `current_job` (spec §4.5): join of context + (optional) descriptive
    /// job record + computed progress/estimated_completion. `None` if no
    /// job is currently assigned, matching the original's "returns None".
    pub async fn current_job(
        &self,
        equipment_code: &EquipmentCode,
        now: DateTime<Utc>,
    ) -> Result<Option<JobView>, JobMapperError> {
        let Some(ctx) = self.context_store.get(equipment_code) else {
            return Ok(None);
        };
        let Some(job_id) = ctx.current_job_id else {
            return Ok(None);
        };
        let description = self.catalog.describe(job_id).await;
        Ok(Some(JobView {
            equipment_code: equipment_code.clone(),
            line_id: ctx.line_id,
            job_id,
            schedule_id: ctx.schedule_id,
            product_type_id: ctx.product_type_id,
            target_quantity: ctx.target_quantity,
            actual_quantity: ctx.actual_quantity,
            target_speed: ctx.target_speed,
            production_efficiency: ctx.production_efficiency,
            quality_rate: ctx.quality_rate,
            changeover_status: ctx.changeover_status,
            operator: ctx.operator.clone(),
            shift: ctx.shift.clone(),
            progress: progress_percentage(ctx.actual_quantity, ctx.target_quantity),
            estimated_completion: estimated_completion(ctx.actual_quantity, ctx.target_quantity, ctx.target_speed, now),
            description,
        }))
    }

    /// `update_progress` (spec §4.5): writes the tick's derived counters
    /// into context, then auto-completes and unassigns when the target is
    /// reached.
    pub async fn update_progress(
        &self,
        equipment_code: &EquipmentCode,
        metrics: ProgressMetrics,
        now: DateTime<Utc>,
    ) -> Result<JobUpdateOutcome, JobMapperError> {
        let before = self
            .context_store
            .get(equipment_code)
            .ok_or_else(|| JobMapperError::NoJobAssigned(equipment_code.clone()))?;
        let job_id = before
            .current_job_id
            .ok_or_else(|| JobMapperError::NoJobAssigned(equipment_code.clone()))?;

        let delta = crate::telemetry::ContextDelta {
            actual_quantity: Some(metrics.product_count),
            production_efficiency: Some(metrics.production_efficiency),
            quality_rate: Some(metrics.quality_rate),
            last_production_update: Some(now),
            ..Default::default()
        };
        let updated = self
            .context_store
            .update(equipment_code, delta, "job progress update")?;

        if updated.target_quantity > 0 && updated.actual_quantity >= updated.target_quantity {
            let summary = JobCompletionSummary {
                equipment_code: equipment_code.clone(),
                line_id: updated.line_id,
                job_id,
                target_quantity: updated.target_quantity,
                actual_quantity: updated.actual_quantity,
                completed_at: now,
            };
            self.context_store.unassign_job(equipment_code, "auto-complete: target reached")?;
            self.audit.record(
                AuditRecord::new("job", job_id.to_string(), None, "completed: target reached")
                    .with_after(&summary),
            );
            return Ok(JobUpdateOutcome::Completed(summary));
        }

        let description = self.catalog.describe(job_id).await;
        Ok(JobUpdateOutcome::Updated(JobView {
            equipment_code: equipment_code.clone(),
            line_id: updated.line_id,
            job_id,
            schedule_id: updated.schedule_id,
            product_type_id: updated.product_type_id,
            target_quantity: updated.target_quantity,
            actual_quantity: updated.actual_quantity,
            target_speed: updated.target_speed,
            production_efficiency: updated.production_efficiency,
            quality_rate: updated.quality_rate,
            changeover_status: updated.changeover_status,
            operator: updated.operator.clone(),
            shift: updated.shift.clone(),
            progress: progress_percentage(updated.actual_quantity, updated.target_quantity),
            estimated_completion: estimated_completion(
                updated.actual_quantity,
                updated.target_quantity,
                updated.target_speed,
                now,
            ),
            description,
        }))
    }

    /// `assign` (spec §4.5): delegates to the Context Store and audits.
    #[allow(clippy::too_many_arguments)]
    pub fn assign(
        &self,
        equipment_code: &EquipmentCode,
        job_id: JobId,
        schedule_id: Option<ScheduleId>,
        target_quantity: u64,
        target_speed: f64,
        product_type_id: Option<ProductTypeId>,
        by: &str,
        force: bool,
    ) -> Result<(), JobMapperError> {
        self.context_store.assign_job(
            equipment_code,
            job_id,
            schedule_id,
            target_quantity,
            target_speed,
            product_type_id,
            by,
            force,
        )?;
        self.audit.record(AuditRecord::new(
            "job",
            job_id.to_string(),
            Some(by.to_string()),
            format!("assigned to {equipment_code}"),
        ));
        Ok(())
    }

    /// `unassign` (spec §4.5): delegates to the Context Store and audits.
    pub fn unassign(&self, equipment_code: &EquipmentCode, by: &str) -> Result<(), JobMapperError> {
        let before = self.context_store.get(equipment_code);
        self.context_store.unassign_job(equipment_code, by)?;
        if let Some(job_id) = before.and_then(|c| c.current_job_id) {
            self.audit.record(AuditRecord::new(
                "job",
                job_id.to_string(),
                Some(by.to_string()),
                format!("unassigned from {equipment_code}"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::LineId;
    use chrono::Duration;

    fn mapper_with_equipment(code: &str) -> (JobMapper, EquipmentCode) {
        let store = Arc::new(ContextStore::new());
        let equipment_code = EquipmentCode::from(code);
        store.register(equipment_code.clone(), LineId::new(), Utc::now());
        (JobMapper::with_null_catalog(store), equipment_code)
    }

    #[tokio::test]
    async fn current_job_is_none_before_assignment() {
        let (mapper, code) = mapper_with_equipment("LINE1-FILLER");
        assert!(mapper.current_job(&code, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn assign_then_current_job_reports_progress() {
        let (mapper, code) = mapper_with_equipment("LINE1-FILLER");
        mapper
            .assign(&code, JobId::new(), None, 100, 1.0, None, "alice", false)
            .unwrap();
        let view = mapper.current_job(&code, Utc::now()).await.unwrap().unwrap();
        assert_eq!(view.target_quantity, 100);
        assert_eq!(view.progress, 0.0);
        assert!(view.estimated_completion.is_some());
    }

    #[tokio::test]
    async fn scenario_s3_job_completes_exactly_at_target() {
        // Spec §8 S3: target_quantity=100, target_speed=1.0, ticks until
        // actual_quantity=100 -> exactly one completion, context cleared.
        let (mapper, code) = mapper_with_equipment("LINE1-FILLER");
        mapper
            .assign(&code, JobId::new(), None, 100, 1.0, None, "alice", false)
            .unwrap();
        let now = Utc::now();
        let outcome = mapper
            .update_progress(
                &code,
                ProgressMetrics { product_count: 100, production_efficiency: 1.0, quality_rate: 1.0 },
                now,
            )
            .await
            .unwrap();
        let summary = match outcome {
            JobUpdateOutcome::Completed(summary) => summary,
            JobUpdateOutcome::Updated(_) => panic!("expected completion"),
        };
        assert_eq!(summary.actual_quantity, 100);
        let ctx = mapper.context_store.get(&code).unwrap();
        assert!(ctx.current_job_id.is_none());
        assert_eq!(ctx.actual_quantity, 0);
    }

    #[tokio::test]
    async fn update_progress_before_target_does_not_complete() {
        let (mapper, code) = mapper_with_equipment("LINE1-FILLER");
        mapper
            .assign(&code, JobId::new(), None, 100, 1.0, None, "alice", false)
            .unwrap();
        let outcome = mapper
            .update_progress(
                &code,
                ProgressMetrics { product_count: 40, production_efficiency: 0.8, quality_rate: 0.95 },
                Utc::now(),
            )
            .await
            .unwrap();
        match outcome {
            JobUpdateOutcome::Updated(view) => {
                assert_eq!(view.actual_quantity, 40);
                assert_eq!(view.progress, 40.0);
            }
            JobUpdateOutcome::Completed(_) => panic!("should not complete yet"),
        }
    }

    #[tokio::test]
    async fn update_progress_without_assignment_is_an_error() {
        let (mapper, code) = mapper_with_equipment("LINE1-FILLER");
        let result = mapper
            .update_progress(
                &code,
                ProgressMetrics { product_count: 1, production_efficiency: 1.0, quality_rate: 1.0 },
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(JobMapperError::NoJobAssigned(_))));
    }

    #[test]
    fn progress_percentage_caps_at_one_hundred() {
        assert_eq!(progress_percentage(150, 100), 100.0);
        assert_eq!(progress_percentage(0, 100), 0.0);
        assert_eq!(progress_percentage(0, 0), 0.0);
    }

    #[test]
    fn estimated_completion_is_none_once_target_reached() {
        let now = Utc::now();
        assert!(estimated_completion(100, 100, 1.0, now).is_none());
        assert!(estimated_completion(50, 100, 0.0, now).is_none());
        let eta = estimated_completion(50, 100, 1.0, now).unwrap();
        assert!(eta > now && eta <= now + Duration::seconds(51));
    }
}
