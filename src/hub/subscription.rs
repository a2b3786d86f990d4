//! Subscription Hub (C10) connection/subscription state — spec §4.8.
//!
//! Grounded on `websocket_manager.py` (original_source) for the
//! per-connection `(topic_family, target)` subscription bookkeeping and
//! `get_connection_stats`/`get_subscription_details`; generalized from its
//! per-family `Dict[str, Set[str]]` sprawl to one `HashSet<String>` per
//! connection keyed on the same topic strings `EngineEvent::routing_keys`
//! produces, so membership testing is a single set lookup instead of ten
//! parallel maps.

use axum::extract::ws::Message;
use crate::ids::{ConnectionId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Topic families a client may subscribe to (spec §4.8).
pub const TOPIC_FAMILIES: &[&str] = &[
    "line", "equipment", "job", "production", "oee", "downtime", "andon", "escalation", "quality", "changeover",
];

#[derive(Debug, Error)]
pub enum HubError {
    #[error("unknown subscription_type {0:?}")]
    UnknownFamily(String),
    #[error("no such connection")]
    NoSuchConnection,
}

fn topic_key(family: &str, target_id: Option<&str>) -> String {
    format!("{family}:{}", target_id.unwrap_or("all"))
}

struct Connection {
    user_id: UserId,
    topics: std::collections::HashSet<String>,
    outbound: mpsc::Sender<Message>,
    last_seen: DateTime<Utc>,
}

/// Per-connection state and topic-subscription bookkeeping. Fan-out
/// filtering itself happens in `hub::socket`'s per-connection reader task
/// (it owns the Event Bus receiver); this registry only answers "is this
/// connection subscribed to any of these topics".
pub struct SubscriptionHub {
    connections: DashMap<ConnectionId, Connection>,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self { connections: DashMap::new() }
    }

    pub fn register(&self, user_id: UserId, outbound: mpsc::Sender<Message>, now: DateTime<Utc>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        self.connections.insert(
            connection_id,
            Connection { user_id, topics: std::collections::HashSet::new(), outbound, last_seen: now },
        );
        connection_id
    }

    pub fn remove(&self, connection_id: ConnectionId) {
        self.connections.remove(&connection_id);
    }

    pub fn touch(&self, connection_id: ConnectionId, now: DateTime<Utc>) {
        if let Some(mut entry) = self.connections.get_mut(&connection_id) {
            entry.last_seen = now;
        }
    }

    pub fn subscribe(
        &self,
        connection_id: ConnectionId,
        family: &str,
        target_id: Option<&str>,
    ) -> Result<String, HubError> {
        if !TOPIC_FAMILIES.contains(&family) {
            return Err(HubError::UnknownFamily(family.to_string()));
        }
        let key = topic_key(family, target_id);
        let mut entry = self.connections.get_mut(&connection_id).ok_or(HubError::NoSuchConnection)?;
        entry.topics.insert(key.clone());
        Ok(key)
    }

    pub fn unsubscribe(
        &self,
        connection_id: ConnectionId,
        family: &str,
        target_id: Option<&str>,
    ) -> Result<String, HubError> {
        let key = topic_key(family, target_id);
        let mut entry = self.connections.get_mut(&connection_id).ok_or(HubError::NoSuchConnection)?;
        entry.topics.remove(&key);
        Ok(key)
    }

    /// True if the connection's subscriptions intersect any of `keys`
    /// (an event's `routing_keys()`).
    pub fn is_subscribed_to_any(&self, connection_id: ConnectionId, keys: &[String]) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|c| keys.iter().any(|k| c.topics.contains(k)))
    }

    pub fn subscriptions(&self, connection_id: ConnectionId) -> Option<Vec<String>> {
        self.connections.get(&connection_id).map(|c| c.topics.iter().cloned().collect())
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Counts by topic family across all connections (spec §4.8 /
    /// original's `get_connection_stats`).
    pub fn subscription_counts(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = TOPIC_FAMILIES.iter().map(|f| (f.to_string(), 0)).collect();
        for entry in self.connections.iter() {
            for topic in &entry.topics {
                if let Some((family, _)) = topic.split_once(':') {
                    if let Some(count) = counts.get_mut(family) {
                        *count += 1;
                    }
                }
            }
        }
        counts
    }

    /// Connections whose last traffic predates `now - stale_after` (spec
    /// §4.8 "no traffic within 2x heartbeat").
    pub fn stale_connections(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| now - entry.value().last_seen > stale_after)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn outbound_sender(&self, connection_id: ConnectionId) -> Option<mpsc::Sender<Message>> {
        self.connections.get(&connection_id).map(|c| c.outbound.clone())
    }
}
