//! Staged task pipeline.
//!
//! A [`Pipeline`] pulls [`ImportTask`]s from a finite source and pushes each
//! one through an ordered list of [`Stage`]s. Stages may drop, pass through,
//! or fan out tasks. Two execution modes are supported:
//!
//! - **Concurrent**: one tokio worker per stage, connected by bounded
//!   channels so a slow stage applies backpressure upstream.
//! - **Sequential**: every task is carried through all stages inline before
//!   the next one is pulled, in source order.
//!
//! A stage returning [`StageError`] aborts the whole run. Tasks still in
//! flight are discarded and the error is returned to the caller.
//!
//! [`ImportTask`]: crate::task::ImportTask

mod engine;
mod stage;

pub use engine::{ExecutionMode, Pipeline, RunSummary, TaskSource, DEFAULT_QUEUE_SIZE};
pub use stage::{FnStage, Stage, StageError};

use thiserror::Error;

/// Fatal pipeline outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline aborted in stage '{stage}': {source}")]
    Aborted {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("stage '{stage}' panicked")]
    StagePanicked { stage: String },
}

impl PipelineError {
    /// Name of the stage that stopped the run.
    pub fn stage(&self) -> &str {
        match self {
            PipelineError::Aborted { stage, .. } | PipelineError::StagePanicked { stage } => stage,
        }
    }
}
