//! Progress endpoints
//!
//! - `GET /api/progress/:job_id` streams a job's progress events over SSE
//! - `POST /api/progress/:job_id` reports a progress event for a job

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use podgen_common::sse::create_progress_sse_stream;
use podgen_common::ProgressStep;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{ApiError, ApiResult, AppState};

/// GET /api/progress/:job_id - SSE stream of one job's progress
///
/// Frames are `data: {"step":..,"data":..,"ts":..}`; the first is always the
/// `connecting` greeting. The stream stays open until the client
/// disconnects or the server shuts down.
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let sse = create_progress_sse_stream(
        &state.bus,
        job_id,
        &state.stream_options,
        state.shutdown.clone(),
    );

    // Sse sets Content-Type and Cache-Control itself
    (
        [(header::CONNECTION, HeaderValue::from_static("keep-alive"))],
        sse,
    )
}

/// Body of a progress report
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub step: String,
    /// Defaults to an empty object when omitted
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub job_id: String,
    pub step: ProgressStep,
    /// Streams subscribed to the job when the report was accepted
    pub subscribers: usize,
}

/// POST /api/progress/:job_id - report progress for a job
///
/// Fire-and-forget: returns 202 whether or not anyone is listening.
pub async fn publish_progress(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let step: ProgressStep = request.step.parse()?;

    let subscribers = state.bus.subscriber_count(&job_id);
    state
        .bus
        .emit_progress(&job_id, step.clone(), request.data);
    debug!(job_id = %job_id, step = %step, subscribers, "Progress reported");

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            job_id,
            step,
            subscribers,
        }),
    ))
}
