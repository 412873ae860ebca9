//! Shared `AppState` fixture for handler unit tests, kept out of any one
//! handler module since `enqueue`, `tasks` and `stats` all need it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use torque_core::testing::{InMemoryNotifyBus, InMemoryTaskStore};
use torque_core::{BackoffPolicy, Config, NotifyBus, TaskStore};

use crate::state::AppState;

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        bind_addr: "0.0.0.0:8080".parse::<SocketAddr>().unwrap(),
        authenticate: false,
        shared_credential: None,
        enable_hsts: false,
        backoff_policy: BackoffPolicy::Exponential,
        backoff_base_delay: Duration::from_secs(1),
        backoff_max_delay: Duration::from_secs(60),
        backoff_max_attempts: Some(5),
        task_timeout: Duration::from_secs(10),
        claim_duration: Duration::from_secs(30),
        poll_interval: Duration::from_secs(1),
        gc_interval: Duration::from_secs(60),
        gc_retention: Duration::from_secs(86_400),
        workers_count: 10,
    }
}

pub(crate) fn test_state() -> Arc<AppState> {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let bus: Arc<dyn NotifyBus> = Arc::new(InMemoryNotifyBus::new());
    Arc::new(AppState::new(store, bus, Arc::new(test_config())))
}
