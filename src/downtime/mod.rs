//! Downtime Tracker (C5): per-equipment RUNNING/DOWN state machine,
//! reason classification, and the durable event record.

mod event;
mod reason;
mod tracker;

pub use event::{ContextSnapshot, DowntimeEvent, DowntimeStatus, FaultSnapshot};
pub use reason::{classify, ClassifiedReason, DowntimeCategory, DowntimeSubcategory};
pub use tracker::{DowntimeError, DowntimeFilters, DowntimeStatistics, DowntimeTracker, DowntimeTransition};
