//! podgen-ps library - Progress Stream service
//!
//! Streams episode generation progress to clients over Server-Sent Events
//! and accepts progress reports from out-of-process producers.

use axum::Router;
use chrono::{DateTime, Utc};
use podgen_common::sse::StreamOptions;
use podgen_common::ProgressBus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Progress bus shared with in-process producers
    pub bus: ProgressBus,
    /// Shared secret expected in the `key` query parameter
    pub access_key: Arc<str>,
    pub stream_options: StreamOptions,
    /// Cancelled on server shutdown; ends every open stream
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        bus: ProgressBus,
        access_key: impl Into<Arc<str>>,
        stream_options: StreamOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bus,
            access_key: access_key.into(),
            stream_options,
            shutdown,
            startup_time: podgen_common::time::now(),
        }
    }

    pub fn from_config(
        bus: ProgressBus,
        config: &config::Config,
        shutdown: CancellationToken,
    ) -> Self {
        Self::new(
            bus,
            config.access_key.as_str(),
            config.stream.clone(),
            shutdown,
        )
    }
}

/// Build application router
///
/// Progress routes require the access key; /health is public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::get;

    let protected = Router::new()
        .route(
            "/api/progress/:job_id",
            get(api::progress_stream).post(api::publish_progress),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        // Browser EventSource clients connect from the web app's origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
