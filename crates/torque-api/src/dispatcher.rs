//! The ingress-facing half of task creation: write durably, then publish as
//! an optimization. A transactional-outbox shape simple enough to inline
//! directly rather than factor into its own module: `insert` on the store
//! already commits before this function ever calls `publish`.

use std::sync::Arc;

use chrono::Utc;
use torque_core::{BackoffPolicy, Config, Header, NewTask, NotifyBus, Result, TaskStore};
use uuid::Uuid;

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    bus: Arc<dyn NotifyBus>,
    default_timeout_ms: i64,
    default_backoff_policy: BackoffPolicy,
    default_max_attempts: Option<i32>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn TaskStore>, bus: Arc<dyn NotifyBus>, config: &Config) -> Self {
        Self {
            store,
            bus,
            default_timeout_ms: config.task_timeout.as_millis() as i64,
            default_backoff_policy: config.backoff_policy,
            default_max_attempts: config.backoff_max_attempts.map(|n| n as i32),
        }
    }

    /// Enqueue a new task. The identifier is durably committed before
    /// publication is attempted; a lost publish is recovered by the poller,
    /// never by retrying the commit.
    pub async fn enqueue(&self, url: String, body: Vec<u8>, headers: Vec<Header>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let new_task = NewTask {
            url,
            body,
            headers,
            timeout_ms: self.default_timeout_ms,
            backoff_policy: self.default_backoff_policy,
            max_attempts: self.default_max_attempts,
        };

        self.store.insert(id, new_task, Utc::now()).await?;

        if let Err(err) = self.bus.publish(id).await {
            tracing::debug!(error = %err, task_id = %id, "enqueue publish failed, poller will pick this up");
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torque_core::testing::{InMemoryNotifyBus, InMemoryTaskStore};
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".to_string(),
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            authenticate: true,
            shared_credential: None,
            enable_hsts: true,
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

    #[tokio::test]
    async fn enqueue_persists_before_publishing() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let bus = Arc::new(InMemoryNotifyBus::new());
        let dispatcher = Dispatcher::new(Arc::clone(&store), bus.clone(), &test_config());

        let id = dispatcher
            .enqueue(
                "https://example.com/hook".to_string(),
                b"payload".to_vec(),
                vec![],
            )
            .await
            .unwrap();

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, torque_core::TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.url, "https://example.com/hook");

        assert_eq!(bus.consume().await.unwrap(), Some(id));
    }
}
