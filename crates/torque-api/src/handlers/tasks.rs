//! `GET /tasks/:id`, `DELETE /tasks/:id`, `DELETE /`: inspect, remove, and
//! purge all.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use torque_core::{Task, TorqueError};
use uuid::Uuid;

use crate::error::HttpError;
use crate::state::AppState;

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, HttpError> {
    let task = state
        .store
        .get(id)
        .await?
        .ok_or(TorqueError::NotFound(id))?;
    Ok(Json(task))
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, HttpError> {
    let deleted = state.store.delete(id).await?;
    if !deleted {
        return Err(TorqueError::NotFound(id).into());
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

#[derive(Debug, Serialize)]
pub struct PurgedResponse {
    pub deleted: u64,
}

pub async fn delete_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PurgedResponse>, HttpError> {
    let deleted = state.store.delete_all().await?;
    Ok(Json(PurgedResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;
    use torque_core::NewTask;

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
    async fn get_task_returns_404_for_unknown_id() {
        let state = test_state();
        let err = get_task(State(state), Path(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err.0, TorqueError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_task_returns_the_task_once_inserted() {
        let state = test_state();
        let id = Uuid::new_v4();
        state.store.insert(id, new_task(), chrono::Utc::now()).await.unwrap();

        let Json(task) = get_task(State(Arc::clone(&state)), Path(id)).await.unwrap();
        assert_eq!(task.id, id);
    }

    #[tokio::test]
    async fn deleting_twice_yields_not_found_the_second_time() {
        let state = test_state();
        let id = Uuid::new_v4();
        state.store.insert(id, new_task(), chrono::Utc::now()).await.unwrap();

        let Json(first) = delete_task(State(Arc::clone(&state)), Path(id)).await.unwrap();
        assert!(first.deleted);

        let err = delete_task(State(state), Path(id)).await.unwrap_err();
        assert!(matches!(err.0, TorqueError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_all_reports_the_removed_count() {
        let state = test_state();
        state.store.insert(Uuid::new_v4(), new_task(), chrono::Utc::now()).await.unwrap();
        state.store.insert(Uuid::new_v4(), new_task(), chrono::Utc::now()).await.unwrap();

        let Json(purged) = delete_all(State(Arc::clone(&state))).await.unwrap();
        assert_eq!(purged.deleted, 2);

        let Json(purged) = delete_all(State(state)).await.unwrap();
        assert_eq!(purged.deleted, 0);
    }
}
