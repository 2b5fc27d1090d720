use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use webimport_core::{EventFilter, EventRecord};

use super::error::{api_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for event queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for event queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the events endpoint
#[derive(Debug, Deserialize)]
pub struct EventQueryParams {
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub event_type: Option<String>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventQueryResponse {
    /// Newest first
    pub events: Vec<EventRecord>,
    /// Total number of matching events
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query the import event log
pub async fn query_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventQueryParams>,
) -> Result<Json<EventQueryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = EventFilter::new().with_limit(limit).with_offset(offset);
    if let Some(session_id) = params.session_id {
        filter = filter.with_session_id(session_id);
    }
    if let Some(task_id) = params.task_id {
        filter = filter.with_task_id(task_id);
    }
    if let Some(event_type) = params.event_type {
        filter = filter.with_event_type(event_type);
    }

    let store = state.event_store();
    let events = store
        .query(&filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let total = store
        .count(&filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(EventQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}
