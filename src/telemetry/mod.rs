//! Telemetry: raw PLC snapshots, derived metrics, equipment context and the
//! per-equipment context store (spec C3/C4).

mod context;
mod context_store;
mod raw;
mod transformer;

pub use context::{ChangeoverStatus, EquipmentContext, FaultStatus};
pub use context_store::{ContextDelta, ContextStore, ContextStoreError};
pub use raw::{CommunicationStatus, RawSnapshot};
pub use transformer::{transform, DerivedMetrics};
