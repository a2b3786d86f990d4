//! Equipment–Job Mapper (C7) view types — spec §4.5.

use crate::ids::{EquipmentCode, JobId, LineId, ProductTypeId, ScheduleId};
use crate::telemetry::ChangeoverStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive metadata for a job, sourced from the external schedule/job
/// CRUD system (out of scope per the purpose & scope section). The Mapper
/// never needs these fields for progress math — they're carried through
/// for display purposes only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescription {
    pub job_id: JobId,
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// What `update_progress` reports for one equipment metrics tick (spec
/// §4.5: `product_count`, `production_efficiency`, `quality_rate` from
/// the Metric Transformer's `DerivedMetrics`).
#[derive(Debug, Clone, Copy)]
pub struct ProgressMetrics {
    pub product_count: u64,
    pub production_efficiency: f64,
    pub quality_rate: f64,
}

/// Join of context + (job, schedule, product type — when the external
/// catalog has them) + computed progress, per spec §4.5 `current_job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub equipment_code: EquipmentCode,
    pub line_id: LineId,
    pub job_id: JobId,
    pub schedule_id: Option<ScheduleId>,
    pub product_type_id: Option<ProductTypeId>,
    pub target_quantity: u64,
    pub actual_quantity: u64,
    pub target_speed: f64,
    pub production_efficiency: f64,
    pub quality_rate: f64,
    pub changeover_status: ChangeoverStatus,
    pub operator: Option<String>,
    pub shift: Option<String>,
    pub progress: f64,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub description: Option<JobDescription>,
}

/// A completed job as reported by `update_progress` (spec §4.5 "emits a
/// `job_completed` event and unassigns the job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletionSummary {
    pub equipment_code: EquipmentCode,
    pub line_id: LineId,
    pub job_id: JobId,
    pub target_quantity: u64,
    pub actual_quantity: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum JobUpdateOutcome {
    Updated(JobView),
    Completed(JobCompletionSummary),
}
