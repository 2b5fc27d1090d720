use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::pipeline::RunSummary;
use crate::task::{Choice, ImportTask, Recommendation, TaskId, TaskKind};

/// Compact view of a candidate list.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_distance: Option<f64>,
}

/// Listing entry for a registered task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub kind: TaskKind,
    pub cur_artist: Option<String>,
    pub cur_album: Option<String>,
    pub item_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<PathBuf>>,
    pub candidates: CandidateSummary,
    pub recommendation: Recommendation,
    pub choice: Choice,
    pub has_duplicates: bool,
}

impl TaskSummary {
    pub fn new(id: &TaskId, task: &ImportTask, include_paths: bool) -> Self {
        let media = task.media();
        let best = media.and_then(|m| m.candidates.first());
        Self {
            id: id.clone(),
            kind: task.kind(),
            cur_artist: media.and_then(|m| m.cur_artist()),
            cur_album: media.and_then(|m| m.cur_album()),
            item_count: media.map_or(0, |m| m.items.len()),
            paths: include_paths.then(|| task.paths().cloned().collect()),
            candidates: CandidateSummary {
                count: media.map_or(0, |m| m.candidates.len()),
                best: best.map(|c| c.label()),
                best_distance: best.map(|c| c.distance().distance),
            },
            recommendation: media.map(|m| m.recommendation).unwrap_or_default(),
            choice: media.map(|m| m.choice).unwrap_or_default(),
            has_duplicates: media.map_or(false, |m| m.duplicates.is_some()),
        }
    }
}

/// Where the initial run of a session stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Finished { summary: RunSummary },
    Aborted { stage: String, reason: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finished { .. } | RunState::Aborted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub paths: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: RunState,
    pub pending_tasks: usize,
    pub merged_paths: usize,
}
