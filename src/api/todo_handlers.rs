use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::handlers::AppState;
use super::responses::not_found;
use crate::database::models::CompletedTask;
use crate::services::todoist::{TodoError, TodoTask};

/// Active tasks from the latest poll
#[utoipa::path(
    get,
    path = "/api/v1/todos",
    tag = "Todos",
    responses(
        (status = 200, description = "Mirrored active tasks", body = Vec<TodoTask>)
    )
)]
pub async fn get_tasks(State(state): State<AppState>) -> Json<Vec<TodoTask>> {
    Json(state.todoist.active_tasks())
}

/// Complete a task
#[utoipa::path(
    post,
    path = "/api/v1/todos/{id}/complete",
    tag = "Todos",
    params(
        ("id" = String, Path, description = "Todoist task id")
    ),
    responses(
        (status = 204, description = "Task closed and logged"),
        (status = 404, description = "Task not in the active mirror"),
        (status = 502, description = "Todoist rejected the request"),
        (status = 503, description = "Todoist unreachable")
    )
)]
pub async fn complete_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.todoist.complete_task(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(format!("task '{id}' is not active")),
        Err(error) => error.into_response(),
    }
}

/// Reopen a previously completed task
#[utoipa::path(
    post,
    path = "/api/v1/todos/{id}/reopen",
    tag = "Todos",
    params(
        ("id" = String, Path, description = "Todoist task id")
    ),
    responses(
        (status = 204, description = "Task reopened and dropped from the log"),
        (status = 502, description = "Todoist rejected the request"),
        (status = 503, description = "Todoist unreachable")
    )
)]
pub async fn reopen_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, TodoError> {
    state.todoist.reopen_task(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Recently completed tasks, newest first
#[utoipa::path(
    get,
    path = "/api/v1/todos/completed",
    tag = "Todos",
    responses(
        (status = 200, description = "Capped completion log", body = Vec<CompletedTask>)
    )
)]
pub async fn get_completed(
    State(state): State<AppState>,
) -> Result<Json<Vec<CompletedTask>>, TodoError> {
    Ok(Json(state.todoist.completed_log().await?))
}
