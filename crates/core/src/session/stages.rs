//! Session-bound pipeline stages.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::ImportMode;
use crate::lookup::LookupQuery;
use crate::metrics::JUDGMENTS;
use crate::pipeline::{Stage, StageError};
use crate::placer::{destination_for, FilePlacement, PlacementJob, TransferMode};
use crate::task::{Choice, ImportTask, Recommendation};

use super::ImportSession;

// ============================================================================
// Lookup
// ============================================================================

/// Attaches candidates and a recommendation to each task.
///
/// Tasks whose paths were all absorbed by an earlier merge are dropped. A
/// failed lookup leaves the task without candidates rather than failing the
/// run.
pub struct LookupStage {
    session: ImportSession,
}

impl LookupStage {
    pub fn new(session: ImportSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Stage for LookupStage {
    fn name(&self) -> &str {
        "lookup"
    }

    async fn process(&self, mut task: ImportTask) -> Result<Vec<ImportTask>, StageError> {
        if task.is_sentinel() {
            return Ok(vec![task]);
        }
        if self.session.already_merged(&task) {
            debug!(toppath = ?task.toppath(), "Task already merged, dropping");
            return Ok(Vec::new());
        }

        let proposal = match self.session.lookup(&task, &LookupQuery::default()).await {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(toppath = ?task.toppath(), error = %e, "Candidate lookup failed");
                Default::default()
            }
        };
        if let Some(media) = task.media_mut() {
            debug!(
                candidates = proposal.candidates.len(),
                recommendation = proposal.recommendation.as_str(),
                "Lookup finished"
            );
            media.set_candidates(proposal.candidates, proposal.recommendation);
        }
        Ok(vec![task])
    }
}

// ============================================================================
// Judgment
// ============================================================================

/// Auto-applies strong matches and parks everything else.
///
/// A parked task is registered with a provisional `Skip` and the same task
/// continues downstream, where skipped tasks are ignored.
pub struct JudgeStage {
    session: ImportSession,
}

impl JudgeStage {
    pub fn new(session: ImportSession) -> Self {
        Self { session }
    }

    fn auto_apply(&self, task: &mut ImportTask) -> Result<(), StageError> {
        let library = &self.session.services().library;
        let Some(media) = task.media_mut() else {
            return Ok(());
        };
        media.choice = Choice::UseCandidate(0);

        let snapshot = ImportTask::clone(task);
        let found = match library.find_duplicates(&snapshot) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Duplicate detection failed");
                Default::default()
            }
        };
        let Some(media) = task.media_mut() else {
            return Ok(());
        };
        self.session.apply_duplicate_policy(media, found);
        if media.is_skipped() {
            JUDGMENTS.with_label_values(&["quiet_skipped"]).inc();
            self.session.record_skip(None, "duplicates");
            return Ok(());
        }

        JUDGMENTS.with_label_values(&["auto_applied"]).inc();
        if let Err(e) = self.session.commit(task, None) {
            error!(toppath = ?task.toppath(), error = %e, "Auto-apply commit failed");
            if let Some(media) = task.media_mut() {
                media.choice = Choice::Skip;
            }
            self.session.record_skip(None, "commit failed");
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for JudgeStage {
    fn name(&self) -> &str {
        "judge"
    }

    async fn process(&self, mut task: ImportTask) -> Result<Vec<ImportTask>, StageError> {
        let Some(media) = task.media_mut() else {
            return Ok(vec![task]);
        };

        if media.recommendation == Recommendation::Strong && !media.candidates.is_empty() {
            self.auto_apply(&mut task)?;
            return Ok(vec![task]);
        }

        media.choice = Choice::Skip;
        JUDGMENTS.with_label_values(&["pending"]).inc();
        if let Err(e) = self.session.register_task(task.clone()) {
            warn!(error = %e, "Could not register task");
        }
        Ok(vec![task])
    }
}

// ============================================================================
// Plugins
// ============================================================================

/// Runs a plugin-contributed stage on real, accepted tasks only.
pub struct PluginStage {
    inner: Arc<dyn Stage>,
}

impl PluginStage {
    pub fn new(inner: Arc<dyn Stage>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Stage for PluginStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn process(&self, task: ImportTask) -> Result<Vec<ImportTask>, StageError> {
        match task.media() {
            Some(media) if !media.is_skipped() => self.inner.process(task).await,
            _ => Ok(vec![task]),
        }
    }
}

// ============================================================================
// Files
// ============================================================================

/// Copies or moves accepted files into the library directory and records
/// their new locations.
///
/// In move mode, a sentinel prunes the empty directories its group left
/// behind.
pub struct FilesStage {
    session: ImportSession,
}

impl FilesStage {
    pub fn new(session: ImportSession) -> Self {
        Self { session }
    }

    fn transfer_mode(&self) -> Option<TransferMode> {
        match self.session.options().mode {
            ImportMode::Copy => Some(TransferMode::Copy),
            ImportMode::Move => Some(TransferMode::Move),
            ImportMode::None => None,
        }
    }

    async fn prune(&self, task: &ImportTask) {
        let Some(root) = task.toppath() else {
            return;
        };
        match self.session.services().placer.prune_empty_dirs(root).await {
            Ok(removed) if removed > 0 => debug!(?root, removed, "Pruned empty directories"),
            Ok(_) => {}
            Err(e) => warn!(?root, error = %e, "Failed to prune source directories"),
        }
    }

    async fn place(&self, task: &mut ImportTask, mode: TransferMode) {
        let options = self.session.options();
        let template = if task.is_album() {
            &options.templates.album
        } else {
            &options.templates.singleton
        };
        let Some(media) = task.media_mut() else {
            return;
        };

        let files: Vec<FilePlacement> = media
            .items
            .iter()
            .map(|item| FilePlacement {
                source: item.path.clone(),
                destination: destination_for(&options.library_dir, template, item),
            })
            .collect();
        let job = PlacementJob {
            job_id: format!("{}-{}", self.session.id(), uuid::Uuid::new_v4()),
            files,
            mode,
            enable_rollback: true,
        };

        let services = self.session.services();
        let result = match services.placer.place(job).await {
            Ok(result) => result,
            Err(e) => {
                error!(toppath = ?media.toppath, error = %e, "File placement failed");
                return;
            }
        };

        for placed in result.files_placed {
            let Some(item) = media.items.iter_mut().find(|i| i.path == placed.source) else {
                continue;
            };
            if let Some(item_ref) = item.item_ref() {
                if let Err(e) = services.library.relocate(item_ref, &placed.destination) {
                    warn!(item = %item_ref, error = %e, "Failed to record new location");
                }
            }
            item.path = placed.destination;
        }
        media.paths = media.items.iter().map(|i| i.path.clone()).collect();
    }
}

#[async_trait]
impl Stage for FilesStage {
    fn name(&self) -> &str {
        "files"
    }

    async fn process(&self, mut task: ImportTask) -> Result<Vec<ImportTask>, StageError> {
        let Some(mode) = self.transfer_mode() else {
            return Ok(vec![task]);
        };

        match task.media() {
            None => {
                if mode == TransferMode::Move {
                    self.prune(&task).await;
                }
            }
            Some(media) if media.is_skipped() || !media.choice.is_set() => {}
            Some(_) => self.place(&mut task, mode).await,
        }
        Ok(vec![task])
    }
}
