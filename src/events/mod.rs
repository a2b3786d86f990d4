//! Event Bus (C9) — spec §4.7.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{
    ChangeoverPayload, EngineEvent, EscalationUpdatePayload, JobLifecyclePayload, LineStatusPayload,
    ProductionUpdatePayload, QualityAlertPayload, SystemAlertPayload,
};
