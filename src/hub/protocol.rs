//! Subscription Hub wire protocol (spec §4.8).
//!
//! Grounded on `websocket_manager.py` (original_source) for the message
//! type enumeration; the JSON shape is re-expressed here as tagged Rust
//! enums instead of untyped dicts, per the event hierarchy's own
//! tagged-enum treatment (`events::types`).

use crate::events::EngineEvent;
use crate::ids::ConnectionId;
use serde::{Deserialize, Serialize};

/// Inbound client message (spec §4.8).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { subscription_type: String, target_id: Option<String> },
    Unsubscribe { subscription_type: String, target_id: Option<String> },
    Ping,
    GetStats,
    GetSubscriptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatsPayload {
    pub active_connections: usize,
    pub subscriptions_by_family: std::collections::HashMap<String, usize>,
}

/// Outbound protocol reply (spec §4.8: `subscription_confirmed` /
/// `unsubscription_confirmed` / `pong` / `connection_stats` /
/// `subscription_details` / `error`). Distinct from `EngineEvent` forwarding,
/// which uses `event_to_wire` below to preserve the event's own `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SubscriptionConfirmed { subscription_type: String, target_id: Option<String> },
    UnsubscriptionConfirmed { subscription_type: String, target_id: Option<String> },
    Pong,
    ConnectionStats { data: ConnectionStatsPayload },
    SubscriptionDetails { connection_id: ConnectionId, subscriptions: Vec<String>, is_active: bool },
    Error { message: String },
}

/// Renders an `EngineEvent` in the wire shape spec §4.8 promises:
/// `{type, timestamp, data, ...}` rather than the internal `payload` field
/// name `EngineEvent`'s own `Serialize` impl uses.
pub fn event_to_wire(event: &EngineEvent) -> serde_json::Value {
    let mut value = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
    if let Some(obj) = value.as_object_mut() {
        if let Some(payload) = obj.remove("payload") {
            obj.insert("data".to_string(), payload);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LineStatusPayload, SystemAlertPayload};
    use crate::ids::{EquipmentCode, LineId};
    use chrono::Utc;

    #[test]
    fn client_subscribe_message_parses() {
        let json = r#"{"type":"subscribe","subscription_type":"line","target_id":"abc"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, ClientMessage::Subscribe { subscription_type, target_id }
            if subscription_type == "line" && target_id.as_deref() == Some("abc")));
    }

    #[test]
    fn ping_message_parses_without_extra_fields() {
        let json = r#"{"type":"ping"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed, ClientMessage::Ping));
    }

    #[test]
    fn event_to_wire_renames_payload_to_data() {
        let event = EngineEvent::LineStatusUpdate {
            timestamp: Utc::now(),
            payload: LineStatusPayload { line_id: LineId::new(), equipment_code: EquipmentCode::from("E1"), running: true },
        };
        let wire = event_to_wire(&event);
        assert_eq!(wire["type"], "LineStatusUpdate");
        assert!(wire.get("data").is_some());
        assert!(wire.get("payload").is_none());
    }

    #[test]
    fn system_alert_wire_round_trips_its_own_fields() {
        let event = EngineEvent::SystemAlert {
            timestamp: Utc::now(),
            payload: SystemAlertPayload { message: "overheat".to_string(), severity: "critical".to_string() },
        };
        let wire = event_to_wire(&event);
        assert_eq!(wire["data"]["message"], "overheat");
    }
}
