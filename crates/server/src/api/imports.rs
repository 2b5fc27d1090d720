//! Import session API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use webimport_core::{ImportSession, ImportTask, SessionHandle, TaskId, TaskSummary};
use webimport_core::session::SessionStatus;

use super::error::{api_error, session_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting an import
#[derive(Debug, Deserialize)]
pub struct StartImportBody {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct StartImportResponse {
    pub session: SessionHandle,
}

#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskSummary>,
    pub total: usize,
}

/// A registered task with its id.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: TaskId,
    #[serde(flatten)]
    pub task: ImportTask,
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn find_session(state: &AppState, handle: &str) -> Result<ImportSession, ApiError> {
    state.sessions().session(handle).map_err(session_error)
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a new import session, superseding the current one
pub async fn start_import(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartImportBody>,
) -> Result<(StatusCode, Json<StartImportResponse>), ApiError> {
    if body.paths.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "paths must not be empty"));
    }

    let session = state
        .sessions()
        .start_import(body.paths)
        .map_err(session_error)?;
    info!(session = %session, "Import started over HTTP");
    Ok((
        StatusCode::ACCEPTED,
        Json(StartImportResponse { session }),
    ))
}

/// Status of the current session, if any
pub async fn current_import(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionStatus>, ApiError> {
    state
        .sessions()
        .current()
        .map(|session| Json(session.status()))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No import session"))
}

pub async fn get_import(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    let session = find_session(&state, &handle)?;
    Ok(Json(session.status()))
}

/// List tasks waiting for a decision
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Path(handle): Path<String>,
) -> Result<Json<ListTasksResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let tasks = session.list_pending(state.include_paths());
    Ok(Json(ListTasksResponse {
        total: tasks.len(),
        tasks,
    }))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): Path<(String, String)>,
) -> Result<Json<TaskResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let task = session.get_task(&id).map_err(session_error)?;
    Ok(Json(TaskResponse { id, task }))
}
