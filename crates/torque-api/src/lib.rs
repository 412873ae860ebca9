//! Ingress-facing crate: the `Dispatcher`, the axum HTTP surface, and the
//! `torque` binary's wiring of every other crate in the workspace into one
//! running process.

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::Dispatcher;
pub use state::AppState;
