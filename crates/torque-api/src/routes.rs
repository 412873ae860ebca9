//! Route table: enqueue, purge, inspect, remove and aggregate stats, and
//! nothing more.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{auth_middleware, security_headers_middleware};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let authenticate = state.config.authenticate;
    let enable_hsts = state.config.enable_hsts;

    let mut router = Router::new()
        .route("/", post(handlers::enqueue))
        .route("/", delete(handlers::delete_all))
        .route("/tasks/{id}", get(handlers::get_task))
        .route("/tasks/{id}", delete(handlers::delete_task))
        .route("/stats", get(handlers::stats))
        .with_state(Arc::clone(&state));

    if authenticate {
        router = router.layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));
    }

    if enable_hsts {
        router = router.layer(axum::middleware::from_fn(security_headers_middleware));
    }

    router.layer(TraceLayer::new_for_http())
}
