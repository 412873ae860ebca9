//! Shared application state handed to every axum handler.

use std::sync::Arc;

use torque_core::{Config, NotifyBus, TaskStore};

use crate::dispatcher::Dispatcher;

/// Everything a handler needs: the store and bus traits (so handlers never
/// know whether they're talking to Postgres or the in-memory test doubles),
/// the dispatcher built from them, and the config for anything that reads a
/// runtime flag (the auth middleware reads `authenticate`, the security
/// headers middleware reads `enable_hsts`).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub bus: Arc<dyn NotifyBus>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn TaskStore>, bus: Arc<dyn NotifyBus>, config: Arc<Config>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), Arc::clone(&bus), &config));
        Self {
            store,
            bus,
            dispatcher,
            config,
        }
    }
}
