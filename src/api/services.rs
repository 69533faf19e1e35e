use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use http_body_util::BodyExt;

use super::{
    models::{HealthResponse, RetryResponse, StartRequest, StartResponse, UnboundStatus},
    state::AppState,
};
use crate::api::error::ApiError;
use crate::jobs::RetryDispatch;

const SESSION_HEADER: &str = "X-Songbox-Session";

/// Download batch ingestion endpoint (POST /downloads/start)
///
/// ## Flow:
/// 1. Validate headers (Content-Type, session)
/// 2. Read body, enforce the configured size limit
/// 3. Split `urls_text` on whitespace into http(s) URLs; 400 when none
/// 4. Parse `quality_kbps` (default from config); fixed at job creation
/// 5. Dispatcher expands playlists, dedups, binds or creates the session's
///    job, appends, and spawns a worker if the job was idle
/// 6. Return 202 Accepted with the job id and the number of items added
///
/// Repeated submissions of the same batch are safe: URLs already present
/// in the job are skipped, so the same request twice yields `added: 0` the
/// second time and the same `job_id`.
pub async fn start_downloads(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let session = require_session(&headers)?;

    let body_bytes = read_body(body, state.config.server.max_request_bytes).await?;
    let request: StartRequest = serde_json::from_slice(&body_bytes)?;

    let urls = super::utils::extract_urls(&request.urls_text);
    if urls.is_empty() {
        return Err(ApiError::InvalidPayload(
            "no http(s) URLs found in urls_text".to_string(),
        ));
    }

    let quality_kbps = super::utils::parse_quality(
        request.quality_kbps.as_deref(),
        state.config.media.default_quality_kbps,
    )?;

    let outcome = state
        .dispatcher
        .start_batch(&session, urls, quality_kbps)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let response = StartResponse {
        job_id: outcome.job_id,
        added: outcome.added,
    };
    Ok((axum::http::StatusCode::ACCEPTED, Json(response)))
}

/// Failed-item retry endpoint (POST /downloads/retry)
///
/// Resets every failed item of the session's job back to pending and
/// spawns a worker if none is running. A job with nothing to retry is left
/// untouched and no worker is spawned. 404 when the session never started
/// a job.
pub async fn retry_downloads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&headers)?;

    let dispatch = state
        .dispatcher
        .retry(&session)
        .map_err(|err| ApiError::NotFound(err.to_string()))?;

    let response = match dispatch {
        RetryDispatch::Restarted { job_id, reset } => RetryResponse {
            job_id,
            reset,
            message: "retry started".to_string(),
        },
        RetryDispatch::NothingToRetry { job_id } => RetryResponse {
            job_id,
            reset: 0,
            message: "no failed downloads to retry".to_string(),
        },
    };
    Ok((axum::http::StatusCode::OK, Json(response)))
}

/// Session status endpoint (GET /downloads/status/session)
///
/// Returns the full job snapshot for the session's bound job. A session
/// with no bound job (including a missing session header) receives the
/// empty-job shape `{"urls": []}` rather than an error, so a fresh client
/// can poll unconditionally.
pub async fn session_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(session) = session_from_headers(&headers) else {
        return Json(UnboundStatus::default()).into_response();
    };

    match state.dispatcher.status(&session) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => Json(UnboundStatus::default()).into_response(),
    }
}

/// Health check endpoint (GET /health)
pub async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("job_registry".to_string(), "healthy".to_string());
    components.insert("dispatcher".to_string(), "healthy".to_string());

    let response = HealthResponse {
        status: "healthy".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (axum::http::StatusCode::OK, Json(response))
}

fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn require_session(headers: &HeaderMap) -> Result<String, ApiError> {
    session_from_headers(headers).ok_or(ApiError::MissingSession)
}

/// Reads the request body and validates its size
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    super::utils::validate_body_size(&data, max_size)?;

    Ok(data)
}
