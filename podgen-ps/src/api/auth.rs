//! Access-key check for progress routes
//!
//! Clients pass the shared secret as the `key` query parameter. Browser
//! EventSource connections cannot set custom headers, so the query string is
//! the only place the key can travel on the stream endpoint.

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::warn;

use crate::{ApiError, AppState};

/// Query fields consumed by the middleware
#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub key: Option<String>,
}

/// Authentication middleware
///
/// Returns 401 before the handler runs when `key` is missing or does not
/// match the configured access key, so no stream is ever opened for a
/// rejected request. A query string that fails to parse counts as missing.
pub async fn auth_middleware(
    State(state): State<AppState>,
    query: Option<Query<AccessQuery>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = query.and_then(|Query(q)| q.key);

    match provided {
        Some(key) if key == *state.access_key => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request with invalid access key");
            Err(ApiError::Unauthorized("invalid access key".to_string()))
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request without access key");
            Err(ApiError::Unauthorized("missing access key".to_string()))
        }
    }
}
