use thiserror::Error;

use super::EventRecord;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying events
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for event storage
pub trait EventStore: Send + Sync {
    /// Insert a record, returns the assigned ID
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError>;

    /// Query records, newest first
    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventError>;

    /// Count matching records (ignores limit and offset)
    fn count(&self, filter: &EventFilter) -> Result<i64, EventError>;
}
