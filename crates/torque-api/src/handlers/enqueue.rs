//! `POST /`: enqueue a new task.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use torque_core::TorqueError;
use uuid::Uuid;

use crate::error::HttpError;
use crate::state::AppState;

/// Request/connection headers that belong to this hop, not the hook's.
/// Everything else, including `Content-Type`, is forwarded verbatim.
const EXCLUDED_HEADERS: &[&str] = &[
    "host",
    "authorization",
    "content-length",
    "connection",
    "transfer-encoding",
];

#[derive(Debug, Deserialize)]
pub struct EnqueueQuery {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: Uuid,
}

pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EnqueueQuery>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<EnqueueResponse>, HttpError> {
    let parsed = reqwest::Url::parse(&query.url)
        .map_err(|e| TorqueError::Validation(format!("invalid url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TorqueError::Validation("url must be http or https".to_string()).into());
    }

    let forwarded_headers = headers
        .iter()
        .filter(|(name, _)| !EXCLUDED_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str()))
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();

    let id = state
        .dispatcher
        .enqueue(query.url, body.to_vec(), forwarded_headers)
        .await?;

    Ok(Json(EnqueueResponse { id }))
}
