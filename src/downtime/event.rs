//! DowntimeEvent — spec §3.

use super::reason::{DowntimeCategory, DowntimeSubcategory};
use crate::faults::FixedBitVec;
use crate::ids::{DowntimeEventId, EquipmentCode, LineId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowntimeStatus {
    Open,
    Closed,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultSnapshot {
    pub fault_bits: FixedBitVec,
    pub active_alarms: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextSnapshot {
    pub operator: Option<String>,
    pub shift: Option<String>,
    pub job_id: Option<String>,
    pub recovered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowntimeEvent {
    pub id: DowntimeEventId,
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub reason_code: String,
    pub reason_description: String,
    pub category: DowntimeCategory,
    pub subcategory: Option<DowntimeSubcategory>,
    pub status: DowntimeStatus,
    pub reported_by: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub plc_source: bool,
    pub fault_data: FaultSnapshot,
    pub context_data: ContextSnapshot,
    pub auto_detected: bool,
    pub notes: Option<String>,
}

impl DowntimeEvent {
    pub fn open(
        line_id: LineId,
        equipment_code: EquipmentCode,
        start_time: DateTime<Utc>,
        reason_code: String,
        reason_description: String,
        category: DowntimeCategory,
        subcategory: Option<DowntimeSubcategory>,
        fault_data: FaultSnapshot,
        context_data: ContextSnapshot,
        auto_detected: bool,
    ) -> Self {
        Self {
            id: DowntimeEventId::new(),
            line_id,
            equipment_code,
            start_time,
            end_time: None,
            duration_seconds: None,
            reason_code,
            reason_description,
            category,
            subcategory,
            status: DowntimeStatus::Open,
            reported_by: None,
            confirmed_by: None,
            confirmed_at: None,
            plc_source: auto_detected,
            fault_data,
            context_data,
            auto_detected,
            notes: None,
        }
    }

    pub fn merge_fault_data(&mut self, fault_bits: &FixedBitVec, active_alarms: &HashSet<String>) {
        self.fault_data.fault_bits = self.fault_data.fault_bits.union(fault_bits);
        self.fault_data.active_alarms.extend(active_alarms.iter().cloned());
    }

    pub fn close(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.duration_seconds = Some((end_time - self.start_time).num_seconds());
        self.status = DowntimeStatus::Closed;
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds.map(Duration::seconds)
    }
}
