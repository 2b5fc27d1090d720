use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something that happened during an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportEvent {
    ServiceStarted {
        version: String,
    },
    ServiceStopped {
        reason: String,
    },

    SessionStarted {
        session_id: String,
        paths: Vec<String>,
    },
    SessionFinished {
        session_id: String,
        tasks_read: usize,
        tasks_completed: usize,
    },
    PipelineAborted {
        session_id: String,
        stage: String,
        reason: String,
    },

    TaskRegistered {
        session_id: String,
        task_id: String,
        kind: String,
        recommendation: String,
        candidates: usize,
    },
    CandidatesReplaced {
        session_id: String,
        task_id: String,
        candidates: usize,
        recommendation: String,
    },
    /// `task_id` is absent for tasks that were auto-applied.
    TaskCommitted {
        session_id: String,
        task_id: Option<String>,
        kind: String,
        items: usize,
        choice: String,
        removed_duplicates: usize,
    },
    TaskSkipped {
        session_id: String,
        task_id: Option<String>,
        reason: String,
    },
    TasksMerged {
        session_id: String,
        task_id: String,
        duplicate_items: usize,
    },
    TaskSplit {
        session_id: String,
        task_id: String,
        tracks: usize,
    },
}

impl ImportEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionFinished { .. } => "session_finished",
            Self::PipelineAborted { .. } => "pipeline_aborted",
            Self::TaskRegistered { .. } => "task_registered",
            Self::CandidatesReplaced { .. } => "candidates_replaced",
            Self::TaskCommitted { .. } => "task_committed",
            Self::TaskSkipped { .. } => "task_skipped",
            Self::TasksMerged { .. } => "tasks_merged",
            Self::TaskSplit { .. } => "task_split",
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
            Self::SessionStarted { session_id, .. }
            | Self::SessionFinished { session_id, .. }
            | Self::PipelineAborted { session_id, .. }
            | Self::TaskRegistered { session_id, .. }
            | Self::CandidatesReplaced { session_id, .. }
            | Self::TaskCommitted { session_id, .. }
            | Self::TaskSkipped { session_id, .. }
            | Self::TasksMerged { session_id, .. }
            | Self::TaskSplit { session_id, .. } => Some(session_id),
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskRegistered { task_id, .. }
            | Self::CandidatesReplaced { task_id, .. }
            | Self::TasksMerged { task_id, .. }
            | Self::TaskSplit { task_id, .. } => Some(task_id),
            Self::TaskCommitted { task_id, .. } | Self::TaskSkipped { task_id, .. } => {
                task_id.as_deref()
            }
            _ => None,
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub data: ImportEvent,
}
