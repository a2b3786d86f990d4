//! Subscription Hub (C10) — spec §4.8.

mod protocol;
mod socket;
mod subscription;

pub use protocol::{event_to_wire, ClientMessage, ConnectionStatsPayload, ServerMessage};
pub use socket::{ws_handler, HubState, PermissiveVerifier, TokenVerifier};
pub use subscription::{HubError, SubscriptionHub, TOPIC_FAMILIES};
