//! Subscription Hub (C10) WebSocket transport — spec §4.8.
//!
//! Grounded on the teacher's `pipeline/processing_loop.rs` `tokio::select!`
//! cancellation-token loop shape (generalized here from a packet source to
//! a websocket + broadcast receiver pair), and `api/setup.rs` for axum
//! router/handler/`State<T>` idioms.

use super::protocol::{event_to_wire, ClientMessage, ConnectionStatsPayload, ServerMessage};
use super::subscription::SubscriptionHub;
use crate::config::defaults::HEARTBEAT_INTERVAL;
use crate::events::EventBus;
use crate::ids::{ConnectionId, UserId};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Verifies a bearer token at handshake into the `UserId` it belongs to
/// (spec §4.8 "Authentication"). Token issuance and refresh are explicit
/// external collaborators (spec §1); only verification is this core's
/// concern.
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<UserId>;
}

/// Accepts any non-empty token as a fresh, otherwise-unidentified user.
/// Suitable for local development and tests; a real deployment wires in a
/// verifier backed by whatever issues the tokens.
#[derive(Debug, Default)]
pub struct PermissiveVerifier;

#[async_trait::async_trait]
impl TokenVerifier for PermissiveVerifier {
    async fn verify(&self, token: &str) -> Option<UserId> {
        if token.is_empty() {
            None
        } else {
            Some(UserId::new())
        }
    }
}

#[derive(Clone)]
pub struct HubState {
    pub hub: Arc<SubscriptionHub>,
    pub bus: Arc<EventBus>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub send_queue_capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<HubState>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(socket: WebSocket, state: HubState, token: String) {
    let Some(user_id) = state.verifier.verify(&token).await else {
        close_with(socket, close_code::POLICY, "invalid or expired token").await;
        return;
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(state.send_queue_capacity);
    let now = Utc::now();
    let connection_id = state.hub.register(user_id, outbound_tx.clone(), now);
    info!(%connection_id, %user_id, "websocket connection established");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let fanout = tokio::spawn(run_fanout(state.hub.clone(), state.bus.clone(), connection_id, outbound_tx.clone()));

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let stale_after = chrono::Duration::from_std(HEARTBEAT_INTERVAL * 2).unwrap_or(chrono::Duration::seconds(60));

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.hub.touch(connection_id, Utc::now());
                        handle_client_message(&state.hub, connection_id, &text, &outbound_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        state.hub.touch(connection_id, Utc::now());
                    }
                    Some(Err(e)) => {
                        warn!(%connection_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                let now = Utc::now();
                if state.hub.stale_connections(now, stale_after).contains(&connection_id) {
                    debug!(%connection_id, "closing stale connection");
                    break;
                }
            }
        }
    }

    fanout.abort();
    writer.abort();
    state.hub.remove(connection_id);
    info!(%connection_id, "websocket connection closed");
}

/// Reads the Event Bus and forwards matching events to one connection's
/// outbound queue. A full queue is the spec §4.8 "outbound queue exceeds a
/// configured high-water mark" condition; the connection is torn down with
/// close code 1011 rather than blocking the bus.
async fn run_fanout(
    hub: Arc<SubscriptionHub>,
    bus: Arc<EventBus>,
    connection_id: ConnectionId,
    outbound_tx: mpsc::Sender<Message>,
) {
    let mut rx = bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                if !hub.is_subscribed_to_any(connection_id, &event.routing_keys()) {
                    continue;
                }
                let wire = event_to_wire(&event).to_string();
                if outbound_tx.try_send(Message::Text(wire)).is_err() {
                    let _ = outbound_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::ERROR,
                            reason: "outbound queue overflow".into(),
                        })))
                        .await;
                    bus.record_dropped_subscriber(&connection_id.to_string(), 0);
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                bus.record_dropped_subscriber(&connection_id.to_string(), skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn handle_client_message(
    hub: &SubscriptionHub,
    connection_id: ConnectionId,
    text: &str,
    outbound_tx: &mpsc::Sender<Message>,
) {
    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { subscription_type, target_id }) => {
            match hub.subscribe(connection_id, &subscription_type, target_id.as_deref()) {
                Ok(_) => ServerMessage::SubscriptionConfirmed { subscription_type, target_id },
                Err(e) => ServerMessage::Error { message: e.to_string() },
            }
        }
        Ok(ClientMessage::Unsubscribe { subscription_type, target_id }) => {
            match hub.unsubscribe(connection_id, &subscription_type, target_id.as_deref()) {
                Ok(_) => ServerMessage::UnsubscriptionConfirmed { subscription_type, target_id },
                Err(e) => ServerMessage::Error { message: e.to_string() },
            }
        }
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Ok(ClientMessage::GetStats) => ServerMessage::ConnectionStats {
            data: ConnectionStatsPayload {
                active_connections: hub.active_connections(),
                subscriptions_by_family: hub.subscription_counts(),
            },
        },
        Ok(ClientMessage::GetSubscriptions) => ServerMessage::SubscriptionDetails {
            connection_id,
            subscriptions: hub.subscriptions(connection_id).unwrap_or_default(),
            is_active: true,
        },
        Err(e) => ServerMessage::Error { message: format!("malformed message: {e}") },
    };
    if let Ok(text) = serde_json::to_string(&reply) {
        let _ = outbound_tx.send(Message::Text(text)).await;
    }
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket.send(Message::Close(Some(CloseFrame { code, reason: reason.into() }))).await;
}
