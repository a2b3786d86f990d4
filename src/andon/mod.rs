//! Andon Engine (C8): creation, dedup, state machine, escalation timers,
//! statistics (spec §4.6).

mod engine;
mod timers;
mod types;

pub use engine::{AndonEngine, AndonError, TickFaultAnalysis};
pub use timers::{EscalationKind, EscalationRecord, NullDirectory, RecipientDirectory, TimerWheel};
pub use types::{
    AndonEvent, AndonEventType, AndonFilters, AndonPriority, AndonStatistics, AndonStatus,
    EquipmentAndonRanking, NewAndonEvent,
};
