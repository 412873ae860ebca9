//! Poller: the liveness backstop when the notify bus is degraded.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use torque_core::{NotifyBus, TaskStore};

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub poll_interval: StdDuration,
    pub gc_interval: StdDuration,
    pub gc_retention: StdDuration,
    pub batch_size: i64,
}

/// Runs a periodic tick: republish due tasks to the notify bus, and, on
/// every `gc_interval`-th tick, sweep terminal rows past their retention
/// window. Never claims a task itself; that's the worker pool's exclusive
/// job.
pub struct Poller {
    store: Arc<dyn TaskStore>,
    bus: Arc<dyn NotifyBus>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(store: Arc<dyn TaskStore>, bus: Arc<dyn NotifyBus>, config: PollerConfig) -> Self {
        Self { store, bus, config }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let gc_every = (self.config.gc_interval.as_millis() / self.config.poll_interval.as_millis().max(1))
            .max(1) as u64;
        let mut tick_count: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    tick_count += 1;
                    self.tick(tick_count % gc_every == 0).await;
                }
            }
        }
    }

    async fn tick(&self, run_gc: bool) {
        let now = Utc::now();
        match self.store.select_due(now, self.config.batch_size).await {
            Ok(ids) => {
                for id in ids {
                    if let Err(err) = self.bus.publish(id).await {
                        tracing::debug!(error = %err, task_id = %id, "poller publish failed, next tick will retry");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "store unavailable during poll tick");
            }
        }

        if run_gc {
            let retention = chrono::Duration::from_std(self.config.gc_retention)
                .unwrap_or_else(|_| chrono::Duration::seconds(86_400));
            match self.store.sweep_terminal(now - retention).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "swept terminal tasks past retention");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "store unavailable during gc sweep"),
            }
        }
    }
}
