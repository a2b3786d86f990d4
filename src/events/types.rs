//! Event Bus (C9) event hierarchy — spec §4.7.
//!
//! The source's dynamic dict payloads become a tagged sum type per spec
//! §9 ("Dynamic dict payloads ... should become tagged variants / sum
//! types for the event hierarchy"); `serde`'s internally-tagged
//! representation gives the wire shape `{"type": ..., "timestamp": ...,
//! ...}` the WebSocket protocol (§4.8) expects directly.

use crate::andon::{AndonEvent, AndonPriority};
use crate::downtime::DowntimeEvent as DowntimeEventRecord;
use crate::ids::{EquipmentCode, JobId, LineId};
use crate::oee::OeeReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineStatusPayload {
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionUpdatePayload {
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub actual_quantity: u64,
    pub target_quantity: u64,
    pub production_efficiency: f64,
    pub quality_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLifecyclePayload {
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationUpdatePayload {
    pub event_id: crate::ids::AndonEventId,
    pub escalation_level: u32,
    pub priority: AndonPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAlertPayload {
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
    pub quality_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeoverPayload {
    pub line_id: LineId,
    pub equipment_code: EquipmentCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAlertPayload {
    pub message: String,
    pub severity: String,
}

/// A typed, tagged event on the bus (spec §4.7). Each variant carries its
/// own payload; `routing_keys` is computed once at construction (see
/// `EngineEvent::routing_keys`) so publishers never hand-build topic
/// strings at the call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    LineStatusUpdate { timestamp: DateTime<Utc>, payload: LineStatusPayload },
    ProductionUpdate { timestamp: DateTime<Utc>, payload: ProductionUpdatePayload },
    OeeUpdate { timestamp: DateTime<Utc>, payload: OeeReading },
    DowntimeEvent { timestamp: DateTime<Utc>, payload: DowntimeEventRecord },
    JobAssigned { timestamp: DateTime<Utc>, payload: JobLifecyclePayload },
    JobStarted { timestamp: DateTime<Utc>, payload: JobLifecyclePayload },
    JobCompleted { timestamp: DateTime<Utc>, payload: JobLifecyclePayload },
    JobCancelled { timestamp: DateTime<Utc>, payload: JobLifecyclePayload },
    AndonEvent { timestamp: DateTime<Utc>, payload: AndonEvent },
    EscalationUpdate { timestamp: DateTime<Utc>, payload: EscalationUpdatePayload },
    QualityAlert { timestamp: DateTime<Utc>, payload: QualityAlertPayload },
    ChangeoverStarted { timestamp: DateTime<Utc>, payload: ChangeoverPayload },
    ChangeoverCompleted { timestamp: DateTime<Utc>, payload: ChangeoverPayload },
    SystemAlert { timestamp: DateTime<Utc>, payload: SystemAlertPayload },
}

impl EngineEvent {
    /// Topic strings this event must be delivered to (spec §4.7's routing
    /// key table: `line:<id>`, `equipment:<code>`, `job:<id>`,
    /// `oee:<id>|all`, `downtime:<line>|<equip>|all`, `andon:<line>|all`,
    /// `escalation:<id|priority>|all`, `quality:<line>|all`,
    /// `changeover:<line>|all`).
    pub fn routing_keys(&self) -> Vec<String> {
        match self {
            Self::LineStatusUpdate { payload, .. } => vec![
                format!("line:{}", payload.line_id),
                format!("equipment:{}", payload.equipment_code),
            ],
            Self::ProductionUpdate { payload, .. } => vec![
                format!("line:{}", payload.line_id),
                format!("equipment:{}", payload.equipment_code),
                "production:all".to_string(),
            ],
            Self::OeeUpdate { payload, .. } => vec![
                format!("oee:{}", payload.line_id),
                "oee:all".to_string(),
                format!("equipment:{}", payload.equipment_code),
            ],
            Self::DowntimeEvent { payload, .. } => vec![
                format!("downtime:{}|{}", payload.line_id, payload.equipment_code),
                "downtime:all".to_string(),
                format!("line:{}", payload.line_id),
            ],
            Self::JobAssigned { payload, .. }
            | Self::JobStarted { payload, .. }
            | Self::JobCompleted { payload, .. }
            | Self::JobCancelled { payload, .. } => vec![
                format!("job:{}", payload.job_id),
                format!("equipment:{}", payload.equipment_code),
                format!("line:{}", payload.line_id),
            ],
            Self::AndonEvent { payload, .. } => vec![
                format!("andon:{}", payload.line_id),
                "andon:all".to_string(),
                format!("equipment:{}", payload.equipment_code),
            ],
            Self::EscalationUpdate { payload, .. } => vec![
                format!("escalation:{}", payload.event_id),
                format!("escalation:{:?}", payload.priority).to_lowercase(),
                "escalation:all".to_string(),
            ],
            Self::QualityAlert { payload, .. } => vec![
                format!("quality:{}", payload.line_id),
                "quality:all".to_string(),
                format!("equipment:{}", payload.equipment_code),
            ],
            Self::ChangeoverStarted { payload, .. } | Self::ChangeoverCompleted { payload, .. } => vec![
                format!("changeover:{}", payload.line_id),
                "changeover:all".to_string(),
                format!("equipment:{}", payload.equipment_code),
            ],
            Self::SystemAlert { .. } => vec!["system:all".to_string()],
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::LineStatusUpdate { timestamp, .. }
            | Self::ProductionUpdate { timestamp, .. }
            | Self::OeeUpdate { timestamp, .. }
            | Self::DowntimeEvent { timestamp, .. }
            | Self::JobAssigned { timestamp, .. }
            | Self::JobStarted { timestamp, .. }
            | Self::JobCompleted { timestamp, .. }
            | Self::JobCancelled { timestamp, .. }
            | Self::AndonEvent { timestamp, .. }
            | Self::EscalationUpdate { timestamp, .. }
            | Self::QualityAlert { timestamp, .. }
            | Self::ChangeoverStarted { timestamp, .. }
            | Self::ChangeoverCompleted { timestamp, .. }
            | Self::SystemAlert { timestamp, .. } => *timestamp,
        }
    }
}
