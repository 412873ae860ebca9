//! PostgreSQL implementation of Torque's `TaskStore`.
//!
//! # Database Schema
//!
//! See `migrations/0001_init.sql` for the authoritative schema. In short:
//!
//! ```sql
//! CREATE TYPE task_status AS ENUM ('pending', 'executing', 'retry', 'completed', 'failed');
//! CREATE TYPE backoff_policy AS ENUM ('linear', 'exponential');
//!
//! CREATE TABLE tasks (
//!     id UUID PRIMARY KEY,
//!     url TEXT NOT NULL,
//!     body BYTEA NOT NULL,
//!     headers JSONB NOT NULL DEFAULT '[]',
//!     status task_status NOT NULL DEFAULT 'pending',
//!     attempts INTEGER NOT NULL DEFAULT 0,
//!     due_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     claimed_until TIMESTAMPTZ,
//!     last_status_code INTEGER,
//!     last_error TEXT,
//!     timeout_ms BIGINT NOT NULL,
//!     backoff_policy backoff_policy NOT NULL,
//!     max_attempts INTEGER,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! `claim` is a single `UPDATE ... WHERE ... RETURNING` statement. Postgres's
//! MVCC already serializes two concurrent `UPDATE`s targeting the same row:
//! the second waits for the first's transaction to commit, then re-evaluates
//! its `WHERE` clause against the now-committed row and finds it no longer
//! matches. No advisory lock or explicit `FOR UPDATE` is needed for
//! correctness; `select_due` never takes a lock at all, since the poller is
//! not permitted to claim.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use torque_core::{
    Claim, Header, NewTask, Result, Task, TaskStats, TaskStatus, TaskStore, TorqueError,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> std::result::Result<Task, sqlx::Error> {
        let headers_json: serde_json::Value = row.try_get("headers")?;
        let headers: Vec<Header> = serde_json::from_value(headers_json).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "headers".to_string(),
                source: Box::new(e),
            }
        })?;
        // `TaskStatus`/`BackoffPolicy` derive `sqlx::Type` against the native
        // Postgres enums, so they decode directly without a String detour.
        let status: TaskStatus = row.try_get("status")?;
        let backoff_policy: torque_core::BackoffPolicy = row.try_get("backoff_policy")?;

        Ok(Task {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            body: row.try_get("body")?,
            headers,
            status,
            attempts: row.try_get("attempts")?,
            due_at: row.try_get("due_at")?,
            claimed_until: row.try_get("claimed_until")?,
            last_status_code: row.try_get("last_status_code")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            timeout_ms: row.try_get("timeout_ms")?,
            backoff_policy,
            max_attempts: row.try_get("max_attempts")?,
        })
    }

    fn store_unavailable(err: sqlx::Error) -> TorqueError {
        tracing::warn!(error = %err, "postgres task store query failed");
        TorqueError::StoreUnavailable(anyhow::Error::new(err))
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, id: Uuid, new_task: NewTask, now: DateTime<Utc>) -> Result<Uuid> {
        let headers_json = serde_json::to_value(&new_task.headers)
            .context("serializing task headers")
            .map_err(TorqueError::Internal)?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (
                id, url, body, headers, status, attempts, due_at,
                timeout_ms, backoff_policy, max_attempts, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6, $7, $8, $5, $5)
            "#,
        )
        .bind(id)
        .bind(&new_task.url)
        .bind(&new_task.body)
        .bind(&headers_json)
        .bind(now)
        .bind(new_task.timeout_ms)
        .bind(new_task.backoff_policy)
        .bind(new_task.max_attempts)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(TorqueError::Conflict(id))
            }
            Err(e) => Err(Self::store_unavailable(e)),
        }
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        claim_duration: Duration,
    ) -> Result<Option<Claim>> {
        let claimed_until = now + claim_duration;

        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'executing',
                claimed_until = $2,
                attempts = attempts + 1,
                updated_at = $3
            WHERE id = $1
              AND status IN ('pending', 'retry')
              AND due_at <= $3
              AND (claimed_until IS NULL OR claimed_until <= $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(claimed_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::store_unavailable)?;

        let Some(row) = row else {
            // Either the task doesn't exist, or it exists but isn't
            // claimable right now; distinguish the two so callers can tell
            // "discard this hint" from "this id is bogus".
            if self.get(id).await?.is_none() {
                return Err(TorqueError::NotFound(id));
            }
            return Ok(None);
        };

        let task = Self::row_to_task(&row).map_err(Self::store_unavailable)?;
        Ok(Some(Claim { task }))
    }

    async fn complete(&self, id: Uuid, expected_attempts: i32, status_code: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'completed',
                claimed_until = NULL,
                last_status_code = $3,
                updated_at = NOW()
            WHERE id = $1 AND attempts = $2
            "#,
        )
        .bind(id)
        .bind(expected_attempts)
        .bind(status_code)
        .execute(&self.pool)
        .await
        .map_err(Self::store_unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail(
        &self,
        id: Uuid,
        expected_attempts: i32,
        status_code: Option<i32>,
        error: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed',
                claimed_until = NULL,
                last_status_code = $3,
                last_error = $4,
                updated_at = NOW()
            WHERE id = $1 AND attempts = $2
            "#,
        )
        .bind(id)
        .bind(expected_attempts)
        .bind(status_code)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Self::store_unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        expected_attempts: i32,
        due_at: DateTime<Utc>,
        status_code: Option<i32>,
        error: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'retry',
                claimed_until = NULL,
                due_at = $3,
                last_status_code = $4,
                last_error = $5,
                updated_at = NOW()
            WHERE id = $1 AND attempts = $2
            "#,
        )
        .bind(id)
        .bind(expected_attempts)
        .bind(due_at)
        .bind(status_code)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Self::store_unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn select_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM tasks
            WHERE status IN ('pending', 'retry')
              AND due_at <= $1
              AND (claimed_until IS NULL OR claimed_until <= $1)
            ORDER BY due_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::store_unavailable)?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    async fn sweep_terminal(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tasks
            WHERE status IN ('completed', 'failed')
              AND updated_at < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(Self::store_unavailable)?;

        Ok(result.rows_affected())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::store_unavailable)?;

        row.as_ref()
            .map(Self::row_to_task)
            .transpose()
            .map_err(Self::store_unavailable)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::store_unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tasks")
            .execute(&self.pool)
            .await
            .map_err(Self::store_unavailable)?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<TaskStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'executing') AS executing,
                COUNT(*) FILTER (WHERE status = 'retry') AS retry,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Self::store_unavailable)?;

        Ok(TaskStats {
            pending: row.get("pending"),
            executing: row.get("executing"),
            retry: row.get("retry"),
            completed: row.get("completed"),
            failed: row.get("failed"),
        })
    }
}

/// Runs the embedded migrations. Called once at process start, before
/// anything reads or writes the `tasks` table.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    //! These exercise the query text against a live Postgres instance and
    //! are gated behind `TORQUE_TEST_DATABASE_URL` so they don't run as part
    //! of a normal `cargo test` without a database configured.
    use super::*;

    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TORQUE_TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.expect("connect to test database");
        run_migrations(&pool).await.expect("run migrations");
        Some(pool)
    }

    fn sample_task() -> NewTask {
        NewTask {
            url: "https://example.com/hook".to_string(),
            body: b"hello".to_vec(),
            headers: vec![("X-Test".to_string(), "1".to_string())],
            timeout_ms: 5_000,
            backoff_policy: torque_core::BackoffPolicy::Exponential,
            max_attempts: Some(5),
        }
    }

    #[tokio::test]
    async fn insert_and_claim_round_trip() {
        let Some(pool) = test_pool().await else {
            eprintln!("skipping: TORQUE_TEST_DATABASE_URL not set");
            return;
        };
        let store = PgTaskStore::new(pool);
        let id = Uuid::new_v4();
        let now = Utc::now();

        store.insert(id, sample_task(), now).await.unwrap();
        let claim = store
            .claim(id, now, Duration::seconds(30))
            .await
            .unwrap()
            .expect("task should be claimable");
        assert_eq!(claim.task.attempts, 1);
        assert_eq!(claim.task.status, TaskStatus::Executing);

        let second = store.claim(id, now, Duration::seconds(30)).await.unwrap();
        assert!(second.is_none(), "second claim must not succeed");

        store.delete_all().await.unwrap();
    }
}
