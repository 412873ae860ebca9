//! Convenience bearer-token check, not a contracted ingress auth surface. A
//! real deployment puts a proper ingress layer in front of this crate; this
//! middleware only covers the case where `torque-api` is run stand-alone
//! behind nothing at all.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::state::AppState;

fn secure_compare(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.shared_credential.as_deref() else {
        // No credential configured: assume a front-door layer owns auth.
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if secure_compare(token, expected) => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "missing or invalid credential").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_compare_rejects_different_lengths() {
        assert!(!secure_compare("short", "muchlonger"));
    }

    #[test]
    fn secure_compare_accepts_identical_strings() {
        assert!(secure_compare("matching-token", "matching-token"));
    }

    #[test]
    fn secure_compare_rejects_same_length_mismatch() {
        assert!(!secure_compare("aaaaaaaa", "bbbbbbbb"));
    }
}
