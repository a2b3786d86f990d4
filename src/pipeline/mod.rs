//! Poller (C11) and its device-driver and event-fanout collaborators —
//! spec §4.9.

pub mod channels;
pub mod driver;
mod poller;

pub use channels::EventChannels;
pub use driver::{DeviceDriver, DriverError, SimulatedDriver};
pub use poller::Poller;
