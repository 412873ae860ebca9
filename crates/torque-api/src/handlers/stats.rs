//! `GET /stats`: aggregate task counts by status.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use torque_core::TaskStats;

use crate::error::HttpError;
use crate::state::AppState;

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<TaskStats>, HttpError> {
    let stats = state.store.stats().await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use torque_core::NewTask;
    use uuid::Uuid;

    fn new_task() -> NewTask {
        NewTask {
            url: "https://example.com/hook".to_string(),
            body: b"payload".to_vec(),
            headers: vec![],
            timeout_ms: 10_000,
            backoff_policy: torque_core::BackoffPolicy::Exponential,
            max_attempts: Some(5),
        }
    }

    #[tokio::test]
    async fn stats_counts_tasks_by_status() {
        let state = test_state();
        let now = chrono::Utc::now();
        let pending_id = Uuid::new_v4();
        let completed_id = Uuid::new_v4();
        state.store.insert(pending_id, new_task(), now).await.unwrap();
        state.store.insert(completed_id, new_task(), now).await.unwrap();
        state.store.claim(completed_id, now, chrono::Duration::seconds(30)).await.unwrap();
        state.store.complete(completed_id, 1, 200).await.unwrap();

        let Json(result) = stats(State(state)).await.unwrap();
        assert_eq!(result.pending, 1);
        assert_eq!(result.completed, 1);
        assert_eq!(result.executing, 0);
    }
}
