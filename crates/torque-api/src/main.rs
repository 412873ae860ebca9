//! `torque`: wires the store, bus, worker pool, poller and HTTP ingress
//! into one process and runs them until shutdown.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use torque_core::{Config, NotifyBus, TaskStore};
use torque_notify::PgNotifyBus;
use torque_store_postgres::PgTaskStore;
use torque_worker::{Poller, PollerConfig, WorkerConfig, WorkerPool};

use torque_api::{routes, telemetry, AppState};

const MAX_REDIRECTS: usize = 5;
const WORKER_IDLE_INTERVAL_MS: u64 = 500;
const RETRY_REPUBLISH_THRESHOLD_SECS: i64 = 1;
const POLLER_BATCH_SIZE: i64 = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(
        workers = config.workers_count,
        bind_addr = %config.bind_addr,
        "configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.workers_count as u32 + 10)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;
    torque_store_postgres::run_migrations(&pool)
        .await
        .context("running migrations")?;

    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool.clone()));
    let bus: Arc<dyn NotifyBus> = Arc::new(PgNotifyBus::new(pool));
    let config = Arc::new(config);

    let state = Arc::new(AppState::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&config),
    ));
    let router = routes::build_router(Arc::clone(&state));

    let client = torque_worker::build_client(MAX_REDIRECTS).context("building HTTP client")?;
    let worker_pool = WorkerPool::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        client,
        WorkerConfig {
            claim_duration: chrono::Duration::from_std(config.claim_duration).unwrap(),
            backoff_base_delay: chrono::Duration::from_std(config.backoff_base_delay).unwrap(),
            backoff_max_delay: chrono::Duration::from_std(config.backoff_max_delay).unwrap(),
            idle_interval: std::time::Duration::from_millis(WORKER_IDLE_INTERVAL_MS),
            small_threshold: chrono::Duration::seconds(RETRY_REPUBLISH_THRESHOLD_SECS),
            workers_count: config.workers_count,
        },
    );

    let poller = Poller::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        PollerConfig {
            poll_interval: config.poll_interval,
            gc_interval: config.gc_interval,
            gc_retention: config.gc_retention,
            batch_size: POLLER_BATCH_SIZE,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = tokio::spawn(worker_pool.run(shutdown_rx.clone()));
    let poller_handle = tokio::spawn(poller.run(shutdown_rx.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "torque listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("shutting down: draining workers and poller");
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = poller_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
