//! Worker pool: the endless claim -> dispatch -> commit cycle.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::watch;
use torque_core::{TaskStore, TorqueError};
use uuid::Uuid;

use crate::dispatch::{self, Outcome};

/// Everything a worker needs to know besides the store, bus and HTTP client.
/// Mirrors the subset of `torque_core::Config` the worker pool actually
/// consumes, converted to the duration types each call site wants.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub claim_duration: Duration,
    pub backoff_base_delay: Duration,
    pub backoff_max_delay: Duration,
    /// How long a worker waits on the notify bus before falling back to
    /// asking the store directly for a due batch (functionally the same
    /// query the poller runs; the worker just doesn't wait for the poller's
    /// own tick to do it).
    pub idle_interval: StdDuration,
    /// After scheduling a retry, republish the id immediately only if it's
    /// due this soon, otherwise let the poller pick it up on its own
    /// schedule, so a tight retry loop doesn't spin the bus.
    pub small_threshold: Duration,
    pub workers_count: usize,
}

pub struct WorkerPool {
    store: Arc<dyn TaskStore>,
    bus: Arc<dyn torque_core::NotifyBus>,
    client: reqwest::Client,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn TaskStore>,
        bus: Arc<dyn torque_core::NotifyBus>,
        client: reqwest::Client,
        config: WorkerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            client,
            config,
        })
    }

    /// Spawns `config.workers_count` worker loops and waits for all of them
    /// to finish draining. `shutdown` going `true` stops every worker from
    /// accepting new identifiers; each finishes any in-flight attempt first
    /// (bounded by the outbound timeout) before exiting.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::with_capacity(self.config.workers_count);
        for worker_idx in 0..self.config.workers_count {
            let pool = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                pool.worker_loop(worker_idx, &mut shutdown).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    #[tracing::instrument(skip(self, shutdown), fields(worker = worker_idx))]
    async fn worker_loop(&self, worker_idx: usize, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                id = self.next_identifier() => id,
            };

            if let Some(id) = next {
                self.attempt(id).await;
            }
        }
    }

    /// Waits on the notify bus up to `idle_interval`; on timeout, on a
    /// closed bus, or on a bus error, falls back to asking the store for one
    /// due task directly. Either source is just a hint: the caller must
    /// still `claim` before acting on it.
    async fn next_identifier(&self) -> Option<Uuid> {
        match tokio::time::timeout(self.config.idle_interval, self.bus.consume()).await {
            Ok(Ok(Some(id))) => return Some(id),
            Ok(Ok(None)) => {
                // Bus shut down; don't spin tight while it stays that way.
                tokio::time::sleep(self.config.idle_interval).await;
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "notify bus consume failed, falling back to polling");
            }
            Err(_elapsed) => {}
        }

        match self.store.select_due(Utc::now(), 1).await {
            Ok(ids) => ids.into_iter().next(),
            Err(err) => {
                tracing::warn!(error = %err, "store unavailable while polling for due tasks");
                None
            }
        }
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    async fn attempt(&self, id: Uuid) {
        let now = Utc::now();
        let claim = match self.store.claim(id, now, self.config.claim_duration).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                tracing::debug!("claim contention, discarding hint");
                return;
            }
            Err(TorqueError::NotFound(_)) => {
                tracing::debug!("hint referenced an unknown task, discarding");
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "store unavailable while claiming");
                return;
            }
        };

        let task = claim.task;
        let expected_attempts = claim.expected_attempts();
        let outcome = dispatch::dispatch_once(&self.client, &task).await;

        match outcome {
            Outcome::Completed { status_code } => {
                self.commit_complete(id, expected_attempts, status_code).await;
            }
            Outcome::Failed { status_code, error } => {
                self.commit_fail(id, expected_attempts, status_code, &error).await;
            }
            Outcome::Retry { status_code, error } => {
                let exhausted = task
                    .max_attempts
                    .map(|max| expected_attempts >= max)
                    .unwrap_or(false);

                if exhausted {
                    tracing::info!(attempts = expected_attempts, "max attempts reached, failing");
                    self.commit_fail(id, expected_attempts, status_code, &error).await;
                } else {
                    self.commit_retry(id, expected_attempts, status_code, &error, now, task.backoff_policy)
                        .await;
                }
            }
        }
    }

    async fn commit_complete(&self, id: Uuid, expected_attempts: i32, status_code: i32) {
        match self.store.complete(id, expected_attempts, status_code).await {
            Ok(true) => tracing::info!(status_code, "task completed"),
            Ok(false) => tracing::warn!("completion commit rejected by fencing, task owned by a later attempt"),
            Err(err) => tracing::warn!(error = %err, "store unavailable while completing"),
        }
    }

    async fn commit_fail(&self, id: Uuid, expected_attempts: i32, status_code: Option<i32>, error: &str) {
        match self.store.fail(id, expected_attempts, status_code, error).await {
            Ok(true) => tracing::info!(status_code, error, "task failed permanently"),
            Ok(false) => tracing::warn!("failure commit rejected by fencing, task owned by a later attempt"),
            Err(err) => tracing::warn!(error = %err, "store unavailable while failing"),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit_retry(
        &self,
        id: Uuid,
        expected_attempts: i32,
        status_code: Option<i32>,
        error: &str,
        now: chrono::DateTime<Utc>,
        backoff_policy: torque_core::BackoffPolicy,
    ) {
        let delay = torque_core::jitter(
            torque_core::compute_delay(
                backoff_policy,
                expected_attempts,
                self.config.backoff_base_delay,
                self.config.backoff_max_delay,
            ),
            self.config.backoff_max_delay,
        );
        let due_at = now + delay;

        match self
            .store
            .schedule_retry(id, expected_attempts, due_at, status_code, error)
            .await
        {
            Ok(true) => {
                tracing::info!(delay_ms = delay.num_milliseconds(), "task scheduled for retry");
                if delay <= self.config.small_threshold {
                    // Close enough that waiting for the poller's next tick
                    // would be a visible delay; nudge the bus instead.
                    if let Err(err) = self.bus.publish(id).await {
                        tracing::debug!(error = %err, "retry republish to bus failed, poller will still pick this up");
                    }
                }
            }
            Ok(false) => tracing::warn!("retry commit rejected by fencing, task owned by a later attempt"),
            Err(err) => tracing::warn!(error = %err, "store unavailable while scheduling retry"),
        }
    }
}
