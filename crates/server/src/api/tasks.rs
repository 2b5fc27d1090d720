//! Operator commands on registered tasks.
//!
//! Every route is `PUT /imports/{session}/tasks/{id}/<command>`. Commands that
//! only edit the task answer with the updated task; commands that may take it
//! out of the registry answer with its [`Disposition`].

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use webimport_core::{Disposition, DuplicateAction, TaskId};

use super::error::{session_error, ApiError};
use super::imports::{find_session, TaskResponse};
use crate::state::AppState;

type TaskPath = Path<(String, String)>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChooseCandidateBody {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchIdBody {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchNameBody {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDuplicatesBody {
    pub action: DuplicateAction,
}

#[derive(Debug, Serialize)]
pub struct DispositionResponse {
    pub id: TaskId,
    pub disposition: Disposition,
}

#[derive(Debug, Serialize)]
pub struct DuplicateCheckResponse {
    pub id: TaskId,
    /// True when the task may be finalized without a duplicate decision.
    pub resolved: bool,
    pub task: Option<TaskResponse>,
}

fn disposition(id: TaskId, disposition: Disposition) -> Json<DispositionResponse> {
    Json(DispositionResponse { id, disposition })
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn choose_candidate(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
    Json(body): Json<ChooseCandidateBody>,
) -> Result<Json<TaskResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    session
        .choose_candidate(&id, body.index)
        .map_err(session_error)?;
    let task = session.get_task(&id).map_err(session_error)?;
    Ok(Json(TaskResponse { id, task }))
}

pub async fn search_id(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
    Json(body): Json<SearchIdBody>,
) -> Result<Json<TaskResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let task = session
        .search_by_id(&id, body.ids)
        .await
        .map_err(session_error)?;
    Ok(Json(TaskResponse { id, task }))
}

pub async fn search_name(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
    Json(body): Json<SearchNameBody>,
) -> Result<Json<TaskResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let task = session
        .search_by_name(&id, body.artist, body.title)
        .await
        .map_err(session_error)?;
    Ok(Json(TaskResponse { id, task }))
}

pub async fn skip(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
) -> Result<Json<DispositionResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    session.skip_task(&id).map_err(session_error)?;
    Ok(disposition(id, Disposition::Skipped))
}

pub async fn as_is(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
) -> Result<Json<DispositionResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let outcome = session.accept_as_is(&id).await.map_err(session_error)?;
    Ok(disposition(id, outcome))
}

pub async fn as_tracks(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
) -> Result<Json<DispositionResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let outcome = session
        .split_into_tracks(&id)
        .await
        .map_err(session_error)?;
    Ok(disposition(id, outcome))
}

/// Run duplicate detection without deciding anything.
pub async fn check_duplicates(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
) -> Result<Json<DuplicateCheckResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let resolved = session.resolve_duplicates(&id).map_err(session_error)?;
    let task = session.get_task(&id).ok().map(|task| TaskResponse {
        id: id.clone(),
        task,
    });
    Ok(Json(DuplicateCheckResponse { id, resolved, task }))
}

pub async fn resolve_duplicates(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
    Json(body): Json<ResolveDuplicatesBody>,
) -> Result<Json<DispositionResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let outcome = session
        .resolve_duplicate_action(&id, body.action)
        .await
        .map_err(session_error)?;
    Ok(disposition(id, outcome))
}

pub async fn apply(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
) -> Result<Json<DispositionResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let outcome = session.apply(&id).await.map_err(session_error)?;
    Ok(disposition(id, outcome))
}

pub async fn finalize(
    State(state): State<Arc<AppState>>,
    Path((handle, id)): TaskPath,
) -> Result<Json<DispositionResponse>, ApiError> {
    let session = find_session(&state, &handle)?;
    let id = TaskId::new(id);
    let outcome = session.finalize_task(&id).await.map_err(session_error)?;
    Ok(disposition(id, outcome))
}
