// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! HTTP routing: the WebSocket endpoint, health, and the static client.

use crate::handlers::{assets::static_files, health::health_handler};
use crate::handshake::ws_handler;
use crate::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .fallback_service(static_files(&state.settings.web_root))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
