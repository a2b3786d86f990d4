//! Health/stats HTTP handlers (spec §1: CRUD is out of scope, but the
//! engine still needs a liveness/metrics surface an operator can poll).
//!
//! Grounded on the teacher's `api/handlers/status.rs` `get_health`/
//! `get_status` shape: a plain `Json<T>` response built from whatever the
//! engine already tracks, no request body.

use super::EngineState;
use crate::andon::AndonFilters;
use crate::downtime::DowntimeFilters;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub lines: usize,
    pub subscribers: usize,
}

pub async fn get_health(State(state): State<EngineState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        lines: state.lines.all().len(),
        subscribers: state.bus.subscriber_count(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active_andon_events: usize,
    pub open_downtime_events: usize,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/v1/stats — rollup an operator dashboard can poll without
/// subscribing to the websocket feed.
pub async fn get_stats(State(state): State<EngineState>) -> Json<StatsResponse> {
    let active_andon_events = state.andon.active_events(&AndonFilters::default()).len();
    let open_downtime_events = state
        .downtime
        .list(&DowntimeFilters::default(), usize::MAX, 0)
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|e| e.end_time.is_none())
        .count();

    Json(StatsResponse {
        active_andon_events,
        open_downtime_events,
        timestamp: Utc::now(),
    })
}
