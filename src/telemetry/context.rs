//! EquipmentContext — the currently-active production parameters for one
//! piece of equipment (spec §3).

use crate::ids::{JobId, LineId, ProductTypeId, ScheduleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeoverStatus {
    None,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultStatus {
    Clear,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentContext {
    pub current_job_id: Option<JobId>,
    pub schedule_id: Option<ScheduleId>,
    pub line_id: LineId,
    pub product_type_id: Option<ProductTypeId>,
    pub target_quantity: u64,
    pub actual_quantity: u64,
    pub target_speed: f64,
    pub operator: Option<String>,
    pub shift: Option<String>,
    pub planned_stop: bool,
    pub planned_stop_reason: Option<String>,
    pub changeover_status: ChangeoverStatus,
    pub fault_status: FaultStatus,
    pub active_fault_bit: Option<usize>,
    pub fault_detected_at: Option<DateTime<Utc>>,
    pub last_production_update: DateTime<Utc>,
    /// Last value written by the Job Mapper's `update_progress` (spec
    /// §4.5); not itself recomputed here.
    pub production_efficiency: f64,
    pub quality_rate: f64,
    /// Per-equipment default quality rate used when `total_parts == 0`
    /// (spec §4.1 "the equipment's configured default ... if unset, 1.0").
    pub default_quality_rate: f64,
    /// True if the current planned stop is preventive maintenance rather
    /// than corrective (spec §4.3 subcategory heuristics).
    pub planned_stop_is_preventive: bool,
    /// True if a material shortage is due to raw material rather than
    /// packaging (spec §4.3 subcategory heuristics).
    pub material_shortage_is_raw: bool,
}

impl EquipmentContext {
    pub fn new(line_id: LineId, now: DateTime<Utc>) -> Self {
        Self {
            current_job_id: None,
            schedule_id: None,
            line_id,
            product_type_id: None,
            target_quantity: 0,
            actual_quantity: 0,
            target_speed: 0.0,
            operator: None,
            shift: None,
            planned_stop: false,
            planned_stop_reason: None,
            changeover_status: ChangeoverStatus::None,
            fault_status: FaultStatus::Clear,
            active_fault_bit: None,
            fault_detected_at: None,
            last_production_update: now,
            production_efficiency: 0.0,
            quality_rate: 1.0,
            default_quality_rate: 1.0,
            planned_stop_is_preventive: false,
            material_shortage_is_raw: false,
        }
    }

    /// Checks the invariants of spec §3:
    /// `current_job_id is null ⇒ target_quantity = 0 ∧ changeover_status = none`
    /// `fault_status = active ⇔ active_fault_bit is not null`
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.current_job_id.is_none() {
            if self.target_quantity != 0 {
                return Err("target_quantity must be 0 when no job is assigned".to_string());
            }
            if self.changeover_status != ChangeoverStatus::None {
                return Err("changeover_status must be none when no job is assigned".to_string());
            }
        }
        let fault_consistent = match self.fault_status {
            FaultStatus::Active => self.active_fault_bit.is_some(),
            FaultStatus::Clear => self.active_fault_bit.is_none(),
        };
        if !fault_consistent {
            return Err("fault_status must agree with active_fault_bit".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_satisfies_invariants() {
        let ctx = EquipmentContext::new(LineId::new(), Utc::now());
        assert!(ctx.check_invariants().is_ok());
    }

    #[test]
    fn job_null_with_nonzero_target_is_invalid() {
        let mut ctx = EquipmentContext::new(LineId::new(), Utc::now());
        ctx.target_quantity = 10;
        assert!(ctx.check_invariants().is_err());
    }

    #[test]
    fn fault_status_mismatch_is_invalid() {
        let mut ctx = EquipmentContext::new(LineId::new(), Utc::now());
        ctx.fault_status = FaultStatus::Active;
        assert!(ctx.check_invariants().is_err());
    }
}
