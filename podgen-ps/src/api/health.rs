//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use podgen_common::time::now;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Job ids with at least one open stream
    pub active_jobs: usize,
    pub uptime_secs: i64,
}

/// GET /health
///
/// Does NOT require the access key.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "podgen-ps".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_jobs: state.bus.active_jobs(),
        uptime_secs: (now() - state.startup_time).num_seconds(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
