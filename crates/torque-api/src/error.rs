//! Translates `torque_core::TorqueError` into HTTP responses.
//!
//! The domain crate classifies an error once (status code, log level,
//! recoverability); this wrapper is only the orphan-rule workaround that
//! lets `IntoResponse` be implemented for it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use torque_core::{LogLevel, TorqueError};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct HttpError(pub TorqueError);

impl From<TorqueError> for HttpError {
    fn from(err: TorqueError) -> Self {
        HttpError(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let err = &self.0;
        match err.log_level() {
            LogLevel::Debug => tracing::debug!(error = %err, "request failed"),
            LogLevel::Warn => tracing::warn!(error = %err, "request failed"),
            LogLevel::Error => tracing::error!(error = %err, "request failed"),
        }

        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody { error: err.to_string() })).into_response()
    }
}
