//! OEEReading — spec §3.

use crate::ids::{EquipmentCode, LineId, OeeReadingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OeeReading {
    pub id: OeeReadingId,
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub calculation_time: DateTime<Utc>,
    pub window_seconds: i64,
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
    pub planned_production_time: i64,
    pub actual_production_time: i64,
    pub ideal_cycle_time: f64,
    pub actual_cycle_time: f64,
    pub good_parts: u64,
    pub total_parts: u64,
}

/// Rounds to 4 decimal places for persisted form (spec §4.4 "All values
/// are rounded to 4 decimal places in persisted form").
pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
