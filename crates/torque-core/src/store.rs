use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::task::{Claim, NewTask, Task, TaskStats};

/// Durable, transactional record of every task. The single source of truth:
/// no other component in this workspace is allowed to hold state that
/// outlives a call into this trait.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task as `pending`, `due_at = now()`. Returns
    /// `TorqueError::Conflict` if `task.id` (set by the caller ahead of time,
    /// e.g. for idempotent retries at the ingress layer) already exists.
    async fn insert(&self, id: Uuid, task: NewTask, now: DateTime<Utc>) -> Result<Uuid>;

    /// Attempt to claim a task for dispatch. Must run as a single
    /// transaction: the row has to be in `{pending, retry}`, `due_at <= now`,
    /// and `claimed_until` either unset or already elapsed. On success the
    /// store sets `status = executing`, `claimed_until = now + claim_duration`,
    /// increments `attempts`, and returns the full post-claim snapshot.
    /// Returns `Ok(None)` (not an error) when the task exists but isn't
    /// claimable right now; `TorqueError::NotFound` when it doesn't exist.
    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        claim_duration: chrono::Duration,
    ) -> Result<Option<Claim>>;

    /// Transition a claimed task to `completed`. `expected_attempts` is the
    /// fencing token from the `Claim`; if the stored `attempts` has moved on,
    /// the commit is rejected (`Ok(false)`) rather than erroring: a later
    /// claimant already owns this task.
    async fn complete(&self, id: Uuid, expected_attempts: i32, status_code: i32) -> Result<bool>;

    /// Transition a claimed task to terminal `failed`. Same fencing rule as
    /// `complete`.
    async fn fail(
        &self,
        id: Uuid,
        expected_attempts: i32,
        status_code: Option<i32>,
        error: &str,
    ) -> Result<bool>;

    /// Transition a claimed task back to `retry` with a new `due_at`. Same
    /// fencing rule as `complete`.
    async fn schedule_retry(
        &self,
        id: Uuid,
        expected_attempts: i32,
        due_at: DateTime<Utc>,
        status_code: Option<i32>,
        error: &str,
    ) -> Result<bool>;

    /// Tasks in `{pending, retry}` with `due_at <= now` and no live claim, up
    /// to `limit`, used by the poller to republish onto the notify bus.
    /// Never takes a claim itself.
    async fn select_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>>;

    /// Delete terminal (`completed`/`failed`) rows last updated before
    /// `older_than`. Returns the number of rows removed.
    async fn sweep_terminal(&self, older_than: DateTime<Utc>) -> Result<u64>;

    async fn get(&self, id: Uuid) -> Result<Option<Task>>;

    /// Idempotent: deleting an id that doesn't exist is not an error.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn delete_all(&self) -> Result<u64>;

    async fn stats(&self) -> Result<TaskStats>;
}
