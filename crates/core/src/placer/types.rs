//! Types for the placer module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a file reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Copy,
    Move,
}

/// A single file to place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePlacement {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// A set of files placed together; usually one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementJob {
    pub job_id: String,
    pub files: Vec<FilePlacement>,
    pub mode: TransferMode,
    /// Undo this job's placements if one file fails.
    pub enable_rollback: bool,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementOutcome {
    Copied,
    Moved,
    /// Destination already held this file.
    Unchanged,
}

impl PlacementOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementOutcome::Copied => "copied",
            PlacementOutcome::Moved => "moved",
            PlacementOutcome::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub size_bytes: u64,
    pub outcome: PlacementOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementResult {
    pub job_id: String,
    pub files_placed: Vec<PlacedFile>,
    pub total_bytes: u64,
    pub duration_ms: u64,
}

/// Changes made by a job, recorded so they can be undone.
#[derive(Debug, Clone, Default)]
pub struct RollbackPlan {
    pub job_id: String,
    pub placed_files: Vec<PlacedFile>,
    pub created_directories: Vec<PathBuf>,
}

impl RollbackPlan {
    pub fn new(job_id: String) -> Self {
        Self {
            job_id,
            ..Default::default()
        }
    }

    pub fn record_placement(&mut self, placed: PlacedFile) {
        if placed.outcome != PlacementOutcome::Unchanged {
            self.placed_files.push(placed);
        }
    }

    pub fn record_directory(&mut self, path: PathBuf) {
        self.created_directories.push(path);
    }

    pub fn has_changes(&self) -> bool {
        !self.placed_files.is_empty() || !self.created_directories.is_empty()
    }
}
