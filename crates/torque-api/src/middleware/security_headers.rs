//! HSTS advertisement, gated on `Config::enable_hsts`. This service doesn't
//! otherwise prescribe a broader security header policy, so HSTS is all
//! this middleware sets.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    response
}
