//! Mock placer for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::placer::{
    PlacedFile, PlacementJob, PlacementOutcome, PlacementResult, Placer, PlacerError,
    TransferMode,
};

/// A recorded placement job for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedPlacement {
    /// The job that was submitted.
    pub job: PlacementJob,
    /// Whether the placement succeeded.
    pub success: bool,
}

/// Mock implementation of the Placer trait.
///
/// Touches no files: every placement succeeds (unless an error is queued)
/// and is recorded, as is every prune request.
///
/// # Example
///
/// ```rust,ignore
/// use webimport_core::testing::MockPlacer;
///
/// let placer = MockPlacer::new();
/// let result = placer.place(job).await?;
///
/// let placements = placer.recorded_placements().await;
/// assert_eq!(placements.len(), 1);
/// assert!(placements[0].success);
/// ```
#[derive(Debug, Default)]
pub struct MockPlacer {
    placements: Arc<RwLock<Vec<RecordedPlacement>>>,
    prunes: Arc<RwLock<Vec<PathBuf>>>,
    /// If set, the next placement will fail with this error.
    next_error: Arc<RwLock<Option<PlacerError>>>,
}

impl MockPlacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recorded_placements(&self) -> Vec<RecordedPlacement> {
        self.placements.read().await.clone()
    }

    pub async fn placement_count(&self) -> usize {
        self.placements.read().await.len()
    }

    /// Roots passed to `prune_empty_dirs`, in call order.
    pub async fn recorded_prunes(&self) -> Vec<PathBuf> {
        self.prunes.read().await.clone()
    }

    /// Configure the next placement to fail with the given error.
    pub async fn set_next_error(&self, error: PlacerError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl Placer for MockPlacer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn place(&self, job: PlacementJob) -> Result<PlacementResult, PlacerError> {
        if let Some(err) = self.next_error.write().await.take() {
            self.placements.write().await.push(RecordedPlacement {
                job,
                success: false,
            });
            return Err(err);
        }

        let outcome = match job.mode {
            TransferMode::Copy => PlacementOutcome::Copied,
            TransferMode::Move => PlacementOutcome::Moved,
        };
        let files_placed: Vec<PlacedFile> = job
            .files
            .iter()
            .map(|f| PlacedFile {
                source: f.source.clone(),
                destination: f.destination.clone(),
                size_bytes: 4 * 1024 * 1024,
                outcome,
            })
            .collect();

        self.placements.write().await.push(RecordedPlacement {
            job: job.clone(),
            success: true,
        });

        Ok(PlacementResult {
            job_id: job.job_id,
            total_bytes: files_placed.iter().map(|f| f.size_bytes).sum(),
            files_placed,
            duration_ms: 0,
        })
    }

    async fn prune_empty_dirs(&self, root: &Path) -> Result<usize, PlacerError> {
        self.prunes.write().await.push(root.to_path_buf());
        Ok(0)
    }
}
