//! In-memory test doubles for `TaskStore` and `NotifyBus`, so worker, poller
//! and dispatcher logic can be exercised deterministically without a running
//! Postgres. Not intended for production use: no persistence, no
//! cross-process visibility.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::error::{Result, TorqueError};
use crate::notify::NotifyBus;
use crate::store::TaskStore;
use crate::task::{Claim, NewTask, Task, TaskStats, TaskStatus};

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: StdMutex<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, id: Uuid, new_task: NewTask, now: DateTime<Utc>) -> Result<Uuid> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&id) {
            return Err(TorqueError::Conflict(id));
        }
        tasks.insert(
            id,
            Task {
                id,
                url: new_task.url,
                body: new_task.body,
                headers: new_task.headers,
                status: TaskStatus::Pending,
                attempts: 0,
                due_at: now,
                claimed_until: None,
                last_status_code: None,
                last_error: None,
                created_at: now,
                updated_at: now,
                timeout_ms: new_task.timeout_ms,
                backoff_policy: new_task.backoff_policy,
                max_attempts: new_task.max_attempts,
            },
        );
        Ok(id)
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>, claim_duration: Duration) -> Result<Option<Claim>> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(&id).ok_or(TorqueError::NotFound(id))?;

        let claimable = task.status.is_claimable()
            && task.due_at <= now
            && task.claimed_until.map(|claimed| claimed <= now).unwrap_or(true);

        if !claimable {
            return Ok(None);
        }

        task.status = TaskStatus::Executing;
        task.claimed_until = Some(now + claim_duration);
        task.attempts += 1;
        task.updated_at = now;

        Ok(Some(Claim { task: task.clone() }))
    }

    async fn complete(&self, id: Uuid, expected_attempts: i32, status_code: i32) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(false);
        };
        if task.attempts != expected_attempts {
            return Ok(false);
        }
        task.status = TaskStatus::Completed;
        task.claimed_until = None;
        task.last_status_code = Some(status_code);
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn fail(
        &self,
        id: Uuid,
        expected_attempts: i32,
        status_code: Option<i32>,
        error: &str,
    ) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(false);
        };
        if task.attempts != expected_attempts {
            return Ok(false);
        }
        task.status = TaskStatus::Failed;
        task.claimed_until = None;
        task.last_status_code = status_code;
        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        expected_attempts: i32,
        due_at: DateTime<Utc>,
        status_code: Option<i32>,
        error: &str,
    ) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(false);
        };
        if task.attempts != expected_attempts {
            return Ok(false);
        }
        task.status = TaskStatus::Retry;
        task.claimed_until = None;
        task.due_at = due_at;
        task.last_status_code = status_code;
        task.last_error = Some(error.to_string());
        task.updated_at = Utc::now();
        Ok(true)
    }

    async fn select_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>> {
        let tasks = self.tasks.lock().unwrap();
        let mut due: Vec<Uuid> = tasks
            .values()
            .filter(|task| {
                task.status.is_claimable()
                    && task.due_at <= now
                    && task.claimed_until.map(|claimed| claimed <= now).unwrap_or(true)
            })
            .map(|task| task.id)
            .collect();
        due.sort();
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn sweep_terminal(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|_, task| !(task.status.is_terminal() && task.updated_at < older_than));
        Ok((before - tasks.len()) as u64)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.tasks.lock().unwrap().remove(&id).is_some())
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut tasks = self.tasks.lock().unwrap();
        let count = tasks.len() as u64;
        tasks.clear();
        Ok(count)
    }

    async fn stats(&self) -> Result<TaskStats> {
        let tasks = self.tasks.lock().unwrap();
        let mut stats = TaskStats::default();
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Executing => stats.executing += 1,
                TaskStatus::Retry => stats.retry += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

/// In-process notify bus backed by an unbounded mpsc channel, a stand-in for
/// `torque-notify`'s Postgres LISTEN/NOTIFY bus in tests, and the same
/// substrate `torque-notify::LocalNotifyBus` uses for single-process
/// deployments.
pub struct InMemoryNotifyBus {
    sender: UnboundedSender<Uuid>,
    receiver: Mutex<UnboundedReceiver<Uuid>>,
}

impl Default for InMemoryNotifyBus {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl InMemoryNotifyBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotifyBus for InMemoryNotifyBus {
    async fn publish(&self, id: Uuid) -> Result<()> {
        // An unbounded send only fails once every receiver has dropped, which
        // is exactly the "bus unavailable" case callers are meant to shrug
        // off. Loss here is acceptable, not an error.
        let _ = self.sender.send(id);
        Ok(())
    }

    async fn consume(&self) -> Result<Option<Uuid>> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task() -> NewTask {
        NewTask {
            url: "https://example.com/hook".to_string(),
            body: b"payload".to_vec(),
            headers: vec![],
            timeout_ms: 10_000,
            backoff_policy: crate::task::BackoffPolicy::Exponential,
            max_attempts: Some(5),
        }
    }

    #[tokio::test]
    async fn insert_then_get_yields_pending_with_zero_attempts() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.insert(id, new_task(), now).await.unwrap();

        let task = store.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.url, "https://example.com/hook");
    }

    #[tokio::test]
    async fn inserting_duplicate_id_conflicts() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.insert(id, new_task(), now).await.unwrap();
        let err = store.insert(id, new_task(), now).await.unwrap_err();
        assert!(matches!(err, TorqueError::Conflict(_)));
    }

    #[tokio::test]
    async fn claim_is_exclusive_among_concurrent_contenders() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.insert(id, new_task(), now).await.unwrap();

        let first = store.claim(id, now, Duration::seconds(30)).await.unwrap();
        let second = store.claim(id, now, Duration::seconds(30)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn claim_expects_due_at_in_the_past() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.insert(id, new_task(), now + Duration::seconds(60)).await.unwrap();

        let claim = store.claim(id, now, Duration::seconds(30)).await.unwrap();
        assert!(claim.is_none());
    }

    #[tokio::test]
    async fn fencing_rejects_a_commit_from_a_stale_attempt() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.insert(id, new_task(), now).await.unwrap();

        let claim = store.claim(id, now, Duration::seconds(30)).await.unwrap().unwrap();
        assert_eq!(claim.expected_attempts(), 1);

        // Simulate a crash: claimed_until has passed, a second worker reclaims.
        let later = now + Duration::seconds(31);
        let reclaim = store.claim(id, later, Duration::seconds(30)).await.unwrap().unwrap();
        assert_eq!(reclaim.expected_attempts(), 2);

        // The first, stale worker now tries to commit with its old fencing token.
        let committed = store
            .complete(id, claim.expected_attempts(), 200)
            .await
            .unwrap();
        assert!(!committed);

        let committed = store
            .complete(id, reclaim.expected_attempts(), 200)
            .await
            .unwrap();
        assert!(committed);
    }

    #[tokio::test]
    async fn terminal_tasks_are_excluded_from_select_due() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.insert(id, new_task(), now).await.unwrap();
        store.claim(id, now, Duration::seconds(30)).await.unwrap();
        store.complete(id, 1, 200).await.unwrap();

        let due = store.select_due(now, 10).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn sweep_terminal_only_removes_old_completed_or_failed_rows() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        let now = Utc::now();
        store.insert(id, new_task(), now).await.unwrap();
        store.claim(id, now, Duration::seconds(30)).await.unwrap();
        store.complete(id, 1, 200).await.unwrap();

        let removed = store.sweep_terminal(now - Duration::seconds(1)).await.unwrap();
        assert_eq!(removed, 0);

        let removed = store.sweep_terminal(now + Duration::seconds(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_unknown_id_is_a_no_op() {
        let store = InMemoryTaskStore::new();
        assert!(!store.delete(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn notify_bus_delivers_published_ids() {
        let bus = InMemoryNotifyBus::new();
        let id = Uuid::new_v4();
        bus.publish(id).await.unwrap();
        assert_eq!(bus.consume().await.unwrap(), Some(id));
    }
}
