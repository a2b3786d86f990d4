//! RawSnapshot — what the device driver (C1) returns for one equipment on
//! one poll (spec §3).

use crate::faults::FixedBitVec;
use crate::ids::EquipmentCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    Ok,
    Degraded,
    Lost,
}

/// Raw tag values + fault bits read from one PLC on demand (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub equipment_code: EquipmentCode,
    pub timestamp: DateTime<Utc>,
    pub tag_values: HashMap<String, f64>,
    pub fault_bits: FixedBitVec,
    pub active_alarms: HashSet<String>,
    pub communication_status: CommunicationStatus,
}

impl RawSnapshot {
    pub fn tag(&self, name: &str) -> Option<f64> {
        self.tag_values.get(name).copied()
    }

    pub fn tag_bool(&self, name: &str) -> bool {
        self.tag(name).map(|v| v != 0.0).unwrap_or(false)
    }
}
