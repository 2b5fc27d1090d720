use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::task::ImportTask;

/// Error that stops the whole pipeline run.
///
/// Per-task problems (a failed lookup, a file that will not copy) are
/// handled inside the stage and must not surface here.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Fatal(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    pub fn fatal(reason: impl Into<String>) -> Self {
        StageError::Fatal(reason.into())
    }
}

/// One step of the import pipeline.
///
/// Sentinels must be forwarded unchanged unless the stage has a reason to
/// act on end-of-group.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logging and errors.
    fn name(&self) -> &str;

    /// Consume one task and produce zero or more tasks for the next stage.
    async fn process(&self, task: ImportTask) -> Result<Vec<ImportTask>, StageError>;
}

type StageFn =
    dyn Fn(ImportTask) -> BoxFuture<'static, Result<Vec<ImportTask>, StageError>> + Send + Sync;

/// Stage built from a closure.
///
/// ```ignore
/// let stage = FnStage::new("tag", |task| Box::pin(async move { Ok(vec![task]) }));
/// ```
pub struct FnStage {
    name: String,
    f: Box<StageFn>,
}

impl FnStage {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ImportTask) -> BoxFuture<'static, Result<Vec<ImportTask>, StageError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: ImportTask) -> Result<Vec<ImportTask>, StageError> {
        (self.f)(task).await
    }
}
