//! Import sessions.
//!
//! An [`ImportSession`] runs the import pipeline over a set of source paths
//! and parks every task that needs an operator decision in its registry.
//! Operator commands address parked tasks by [`TaskId`] and re-enter the
//! pipeline at the stage the decision calls for:
//!
//! - finalizing a task commits it and feeds it through the downstream
//!   stages (plugins, then file placement);
//! - merging or splitting a task builds new tasks and feeds them through the
//!   full pipeline, lookup onward.
//!
//! [`SessionManager`] owns the one authoritative session and hands out
//! [`SessionHandle`]s.

mod apply;
mod import;
mod manager;
mod options;
mod plugin;
mod registry;
mod stages;
mod summary;

pub use apply::apply_metadata;
pub use import::{Disposition, DuplicateAction, ImportServices, ImportSession};
pub use manager::{SessionHandle, SessionManager};
pub use options::SessionOptions;
pub use plugin::{ImportPlugin, TaskHook};
pub use stages::{FilesStage, JudgeStage, LookupStage, PluginStage};
pub use summary::{CandidateSummary, RunState, SessionStatus, TaskSummary};

use thiserror::Error;

use crate::library::LibraryError;
use crate::lookup::LookupError;
use crate::pipeline::PipelineError;
use crate::placer::PlacerError;
use crate::task::TaskId;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid choice for task {id}: {reason}")]
    InvalidChoice { id: TaskId, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Placement failed: {0}")]
    Placer(#[from] PlacerError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl SessionError {
    /// Not-found errors are expected when commands race; callers log them
    /// at warn level instead of treating them as failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::TaskNotFound(_) | SessionError::SessionNotFound(_)
        )
    }

    pub(crate) fn invalid_choice(id: &TaskId, reason: impl Into<String>) -> Self {
        SessionError::InvalidChoice {
            id: id.clone(),
            reason: reason.into(),
        }
    }
}
