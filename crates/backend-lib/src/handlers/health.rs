// ============================
// crates/backend-lib/src/handlers/health.rs
// ============================
//! Liveness report.

use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub rooms: usize,
    pub peers: usize,
    pub uptime_sec: u64,
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let (rooms, peers) = state.registry.counts();
    Json(HealthReport {
        ok: true,
        rooms,
        peers,
        uptime_sec: state.registry.uptime().as_secs(),
    })
}
