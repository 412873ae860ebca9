use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One name/value pair forwarded verbatim to the hook. Stored as a list, not a
/// map, since HTTP allows repeated header names and ingress hands us an
/// already-ordered, already-sanitized set.
pub type Header = (String, String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Executing,
    Retry,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Retry)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Executing => write!(f, "executing"),
            TaskStatus::Retry => write!(f, "retry"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "executing" => Ok(TaskStatus::Executing),
            "retry" => Ok(TaskStatus::Retry),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("invalid task status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "backoff_policy", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    Linear,
    Exponential,
}

impl Display for BackoffPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BackoffPolicy::Linear => write!(f, "linear"),
            BackoffPolicy::Exponential => write!(f, "exponential"),
        }
    }
}

impl FromStr for BackoffPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(BackoffPolicy::Linear),
            "exponential" => Ok(BackoffPolicy::Exponential),
            _ => Err(anyhow::anyhow!("invalid backoff policy: {s}")),
        }
    }
}

/// A durable task record. `id`, `url`, `body` and `headers` never change once
/// written; every other field advances as the dispatch state machine runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<Header>,
    pub status: TaskStatus,
    pub attempts: i32,
    pub due_at: DateTime<Utc>,
    pub claimed_until: Option<DateTime<Utc>>,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timeout_ms: i64,
    pub backoff_policy: BackoffPolicy,
    pub max_attempts: Option<i32>,
}

/// Fields supplied by the ingress layer when enqueueing a new task; the store
/// fills in id, status, attempts and due_at.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<Header>,
    pub timeout_ms: i64,
    pub backoff_policy: BackoffPolicy,
    pub max_attempts: Option<i32>,
}

/// The outcome of a successful `claim`: the worker's exclusive, time-bounded
/// right to dispatch this task. `attempts` is the fencing token the worker
/// must present back to the store on completion/fail/retry.
#[derive(Debug, Clone)]
pub struct Claim {
    pub task: Task,
}

impl Claim {
    pub fn expected_attempts(&self) -> i32 {
        self.task.attempts
    }
}

/// Aggregate counts behind `GET /stats`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub pending: i64,
    pub executing: i64,
    pub retry: i64,
    pub completed: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display_and_from_str() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Executing,
            TaskStatus::Retry,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            let parsed: TaskStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn terminal_states_are_completed_and_failed_only() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Executing.is_terminal());
        assert!(!TaskStatus::Retry.is_terminal());
    }

    #[test]
    fn claimable_states_are_pending_and_retry_only() {
        assert!(TaskStatus::Pending.is_claimable());
        assert!(TaskStatus::Retry.is_claimable());
        assert!(!TaskStatus::Executing.is_claimable());
        assert!(!TaskStatus::Completed.is_claimable());
        assert!(!TaskStatus::Failed.is_claimable());
    }

    #[test]
    fn backoff_policy_round_trips() {
        assert_eq!(
            "linear".parse::<BackoffPolicy>().unwrap(),
            BackoffPolicy::Linear
        );
        assert_eq!(
            "exponential".parse::<BackoffPolicy>().unwrap(),
            BackoffPolicy::Exponential
        );
        assert!("nonsense".parse::<BackoffPolicy>().is_err());
    }
}
