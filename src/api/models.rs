//! API models for Songbox download endpoints.
//!
//! The external contract:
//! - `POST /downloads/start` accepts a [`StartRequest`] and answers with a
//!   [`StartResponse`] once the batch is bound to the session's job
//! - `POST /downloads/retry` answers with a [`RetryResponse`]
//! - `GET /downloads/status/session` answers with the job snapshot, or the
//!   empty-job shape (`{"urls": []}`) for a session that never started
//!
//! The caller's session travels in the `X-Songbox-Session` header. A start
//! submission example (as JSON):
//!
//! ```json
//! {
//!   "urls_text": "https://media.example/watch?v=abc https://media.example/playlist?list=xyz",
//!   "quality_kbps": "192"
//! }
//! ```
//!
//! `urls_text` is split on whitespace; playlist URLs expand into one item
//! per entry, and URLs already present in the job are skipped, so
//! re-submitting the same batch is safe.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct StartRequest {
    pub urls_text: String,
    /// Target bitrate as sent by the client, e.g. `"192"`. Fixed at job
    /// creation; later submissions to the same job ignore it.
    #[serde(default)]
    pub quality_kbps: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StartResponse {
    pub job_id: Uuid,
    /// How many items the batch actually added after expansion and dedup.
    pub added: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryResponse {
    pub job_id: Uuid,
    pub reset: usize,
    pub message: String,
}

/// Status shape for a session with no bound job: zero items, not an error.
/// Bound sessions answer with the registry's job snapshot as-is.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UnboundStatus {
    pub urls: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
