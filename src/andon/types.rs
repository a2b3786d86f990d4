//! AndonEvent and its supporting enums (spec §3).

use crate::downtime::FaultSnapshot;
use crate::ids::{AndonEventId, DowntimeEventId, EquipmentCode, LineId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AndonEventType {
    Stop,
    Quality,
    Maintenance,
    Material,
    Safety,
    Upstream,
    Downstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AndonPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AndonPriority {
    /// The next-higher priority, clamping at `Critical` (spec §4.6
    /// "re-armed with the next-higher priority's timeouts (critical
    /// clamps)").
    pub fn escalated(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AndonStatus {
    Open,
    Acknowledged,
    Resolved,
    Escalated,
}

impl AndonStatus {
    /// True once no further transition is allowed (spec §3 "resolved is
    /// terminal").
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// Whether `self -> next` is in the monotone graph of spec §4.6 /
    /// §3's invariant 2.
    pub fn can_transition_to(self, next: AndonStatus) -> bool {
        use AndonStatus::*;
        matches!(
            (self, next),
            (Open, Acknowledged) | (Open, Escalated) | (Open, Resolved)
                | (Acknowledged, Resolved) | (Acknowledged, Escalated)
                | (Escalated, Acknowledged) | (Escalated, Resolved)
        )
    }

    /// Non-terminal statuses participate in the duplicate-active-event and
    /// re-escalation checks (spec §3 invariant 3, §4.6).
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AndonEvent {
    pub id: AndonEventId,
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub event_type: AndonEventType,
    pub priority: AndonPriority,
    pub description: String,
    pub status: AndonStatus,
    pub reported_by: String,
    pub reported_at: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub escalation_level: u32,
    /// When the event last escalated. Used on restart to recompute timer
    /// deadlines from the most recent reference instant (spec §4.6
    /// "Reliability": "recomputed from reported_at / escalated_at").
    pub escalated_at: Option<DateTime<Utc>>,
    pub auto_generated: bool,
    pub plc_source: bool,
    pub fault_data: Option<FaultSnapshot>,
    pub related_downtime_event_id: Option<DowntimeEventId>,
}

#[derive(Debug, Clone)]
pub struct NewAndonEvent {
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub event_type: AndonEventType,
    pub priority: AndonPriority,
    pub description: String,
    pub reported_by: String,
    pub auto_generated: bool,
    pub plc_source: bool,
    pub fault_data: Option<FaultSnapshot>,
    pub related_downtime_event_id: Option<DowntimeEventId>,
}

impl AndonEvent {
    pub fn from_new(new: NewAndonEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: AndonEventId::new(),
            line_id: new.line_id,
            equipment_code: new.equipment_code,
            event_type: new.event_type,
            priority: new.priority,
            description: new.description,
            status: AndonStatus::Open,
            reported_by: new.reported_by,
            reported_at: now,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            escalation_level: 0,
            escalated_at: None,
            auto_generated: new.auto_generated,
            plc_source: new.plc_source,
            fault_data: new.fault_data,
            related_downtime_event_id: new.related_downtime_event_id,
        }
    }

    /// Dedup key for spec §3 invariant 3 / §4.6's "same (line_id,
    /// equipment_code, event_type) and non-terminal status already exists".
    pub fn dedup_key(&self) -> (LineId, EquipmentCode, AndonEventType) {
        (self.line_id, self.equipment_code.clone(), self.event_type)
    }

    pub fn resolution_duration(&self) -> Option<chrono::Duration> {
        self.resolved_at.map(|r| r - self.reported_at)
    }
}

#[derive(Debug, Default, Clone)]
pub struct AndonFilters {
    pub line_id: Option<LineId>,
    pub equipment_code: Option<EquipmentCode>,
    pub status: Option<AndonStatus>,
    pub priority: Option<AndonPriority>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AndonStatistics {
    pub total_events: usize,
    pub by_status: std::collections::HashMap<String, usize>,
    pub by_priority: std::collections::HashMap<String, usize>,
    pub by_type: std::collections::HashMap<String, usize>,
    pub average_resolution_seconds: f64,
    pub by_hour: std::collections::HashMap<String, usize>,
    pub by_day: std::collections::HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentAndonRanking {
    pub equipment_code: EquipmentCode,
    pub event_count: usize,
}
