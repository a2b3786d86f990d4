//! HTTP surface: health/stats endpoints plus the subscription hub's
//! WebSocket upgrade route (spec §1 treats request/response CRUD as an
//! external concern; this module only exposes what the engine itself
//! needs to answer: is it alive, and what does it currently see).
//!
//! Grounded on the teacher's `api/mod.rs` `create_app` composition
//! (`Router` + `TraceLayer` + `CorsLayer`, `.with_state`).

mod handlers;

use crate::andon::AndonEngine;
use crate::downtime::DowntimeTracker;
use crate::events::EventBus;
use crate::hub::{HubState, SubscriptionHub, TokenVerifier};
use crate::line::LineRegistry;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct EngineState {
    pub lines: Arc<LineRegistry>,
    pub bus: Arc<EventBus>,
    pub andon: Arc<AndonEngine>,
    pub downtime: Arc<DowntimeTracker>,
}

/// Builds the full application router: health/stats under `/api/v1`, the
/// websocket hub at `/ws`.
pub fn create_app(state: EngineState, hub: Arc<SubscriptionHub>, verifier: Arc<dyn TokenVerifier>, send_queue_capacity: usize) -> Router {
    let hub_state = HubState {
        hub,
        bus: state.bus.clone(),
        verifier,
        send_queue_capacity,
    };

    let api = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/stats", get(handlers::get_stats))
        .with_state(state);

    let ws = Router::new()
        .route("/ws", get(crate::hub::ws_handler))
        .with_state(hub_state);

    Router::new()
        .nest("/api/v1", api)
        .merge(ws)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
