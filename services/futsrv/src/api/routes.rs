//! API Route Configuration

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use common::admin_api::{get_log_level, set_log_level};
use tower_http::trace::TraceLayer;

use super::handlers::{
    edit_page, health_check, index, metrics, read_holding, read_input, write_holding,
};
use super::AppState;

/// Create all routes for the bridge service
pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/edit", get(edit_page))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        // Device data
        .route("/api/read-input", get(read_input))
        .route("/api/read-holding", get(read_holding))
        .route("/api/write-holding", post(write_holding))
        // Admin
        .route(
            "/api/admin/logs/level",
            get(get_log_level).post(set_log_level),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
