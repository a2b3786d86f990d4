//! floorline: a manufacturing-floor telemetry, OEE and Andon engine.
//!
//! Turns periodic PLC tag snapshots into equipment state, downtime
//! events, real-time OEE, job progress and Andon escalations, and fans
//! the results out over a typed event bus and a WebSocket subscription
//! hub. See `DESIGN.md` for how each module maps onto its source.

pub mod andon;
pub mod api;
pub mod audit;
pub mod config;
pub mod downtime;
pub mod error;
pub mod events;
pub mod faults;
pub mod hub;
pub mod ids;
pub mod jobs;
pub mod line;
pub mod oee;
pub mod pipeline;
pub mod storage;
pub mod telemetry;

pub use error::EngineError;
pub use line::{LineRegistry, ProductionLine};
