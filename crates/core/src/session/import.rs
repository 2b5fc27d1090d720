use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::events::{EventHandle, ImportEvent};
use crate::library::{CommitReceipt, Library, LibraryError};
use crate::lookup::{CandidateLookup, LookupError, LookupQuery, Proposal};
use crate::metrics::{MERGES, SPLITS, TASKS_COMMITTED, TASKS_SKIPPED};
use crate::pipeline::{Pipeline, PipelineError, RunSummary, Stage, TaskSource};
use crate::placer::Placer;
use crate::reader::{read_tasks, ReadOptions};
use crate::task::{Choice, ImportTask, Item, ItemRef, MediaTask, TaskId};

use super::apply::apply_metadata;
use super::options::SessionOptions;
use super::plugin::{ImportPlugin, TaskHook};
use super::registry::Registry;
use super::stages::{FilesStage, JudgeStage, LookupStage, PluginStage};
use super::summary::{RunState, SessionStatus, TaskSummary};
use super::SessionError;

/// Collaborators a session drives.
#[derive(Clone)]
pub struct ImportServices {
    pub lookup: Arc<dyn CandidateLookup>,
    pub library: Arc<dyn Library>,
    pub placer: Arc<dyn Placer>,
    pub plugins: Vec<Arc<dyn ImportPlugin>>,
    pub hooks: Vec<Arc<dyn TaskHook>>,
    pub events: Option<EventHandle>,
}

impl ImportServices {
    pub fn new(
        lookup: Arc<dyn CandidateLookup>,
        library: Arc<dyn Library>,
        placer: Arc<dyn Placer>,
    ) -> Self {
        Self {
            lookup,
            library,
            placer,
            plugins: Vec::new(),
            hooks: Vec::new(),
            events: None,
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn ImportPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn TaskHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }
}

/// Operator answer to "this task duplicates items already in the library".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    /// Import anyway and keep the existing items.
    Keep,
    /// Import and delete the existing items.
    Remove,
    /// Combine the task with the existing items and look the result up again.
    Merge,
}

/// Where a task ended up after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Still registered, waiting for another decision.
    Pending,
    Committed,
    Skipped,
    Merged,
    Split,
}

struct SessionInner {
    id: String,
    paths: Vec<PathBuf>,
    started_at: DateTime<Utc>,
    options: SessionOptions,
    services: ImportServices,
    registry: Mutex<Registry>,
    state: watch::Sender<RunState>,
}

/// One import run and the tasks it parked for operator attention.
///
/// Cheap to clone; clones share the registry. The registry lock is never
/// held across an await: commands that call out to the lookup service work
/// on a snapshot and write back only if the task is still registered.
#[derive(Clone)]
pub struct ImportSession {
    inner: Arc<SessionInner>,
}

impl ImportSession {
    pub fn new(
        id: impl Into<String>,
        paths: Vec<PathBuf>,
        options: SessionOptions,
        services: ImportServices,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Pending);
        Self {
            inner: Arc::new(SessionInner {
                id: id.into(),
                paths,
                started_at: Utc::now(),
                options,
                services,
                registry: Mutex::new(Registry::default()),
                state,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.inner.paths
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    pub(crate) fn services(&self) -> &ImportServices {
        &self.inner.services
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn state(&self) -> RunState {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        let registry = self.registry();
        SessionStatus {
            session_id: self.inner.id.clone(),
            paths: self.inner.paths.clone(),
            started_at: self.inner.started_at,
            state: self.state(),
            pending_tasks: registry.len(),
            merged_paths: registry.merged_paths().len(),
        }
    }

    /// Wait until the initial run has finished or aborted.
    pub async fn wait(&self) -> RunState {
        let mut rx = self.inner.state.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    fn set_state(&self, state: RunState) {
        self.inner.state.send_replace(state);
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    /// Stages that follow a decision: plugin stages, then file placement.
    pub fn downstream_stages(&self) -> Vec<Arc<dyn Stage>> {
        let plugins = &self.inner.services.plugins;
        let mut stages: Vec<Arc<dyn Stage>> = Vec::new();
        for stage in plugins.iter().flat_map(|p| p.early_stages()) {
            stages.push(Arc::new(PluginStage::new(stage)));
        }
        for stage in plugins.iter().flat_map(|p| p.stages()) {
            stages.push(Arc::new(PluginStage::new(stage)));
        }
        stages.push(Arc::new(FilesStage::new(self.clone())));
        stages
    }

    /// The full chain: lookup, judgment, then the downstream stages.
    pub fn lookup_stages(&self) -> Vec<Arc<dyn Stage>> {
        let mut stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(LookupStage::new(self.clone())),
            Arc::new(JudgeStage::new(self.clone())),
        ];
        stages.extend(self.downstream_stages());
        stages
    }

    async fn new_pipeline(
        &self,
        source: TaskSource,
        stages: Vec<Arc<dyn Stage>>,
    ) -> Result<RunSummary, PipelineError> {
        for hook in &self.inner.services.hooks {
            hook.import_begin(&self.inner.id).await;
        }
        Pipeline::new(stages)
            .with_mode(self.inner.options.execution)
            .with_queue_size(self.inner.options.queue_size)
            .run(source)
            .await
    }

    /// Read the session's paths from disk and run the full pipeline.
    pub async fn run(&self) -> Result<RunSummary, SessionError> {
        let source = read_tasks(
            self.inner.paths.clone(),
            ReadOptions {
                singletons: self.inner.options.singletons,
            },
        );
        self.run_with_source(source).await
    }

    /// Run the full pipeline over an arbitrary task source.
    pub async fn run_with_source(&self, source: TaskSource) -> Result<RunSummary, SessionError> {
        info!(session = %self.inner.id, paths = ?self.inner.paths, "Import session started");
        self.set_state(RunState::Running);
        self.emit(ImportEvent::SessionStarted {
            session_id: self.inner.id.clone(),
            paths: self
                .inner
                .paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        });

        match self.new_pipeline(source, self.lookup_stages()).await {
            Ok(summary) => {
                info!(
                    session = %self.inner.id,
                    tasks_read = summary.tasks_read,
                    pending = self.pending_count(),
                    "Import session finished"
                );
                self.set_state(RunState::Finished { summary });
                self.emit(ImportEvent::SessionFinished {
                    session_id: self.inner.id.clone(),
                    tasks_read: summary.tasks_read,
                    tasks_completed: summary.tasks_completed,
                });
                for hook in &self.inner.services.hooks {
                    hook.import(&self.inner.id, &self.inner.paths).await;
                }
                Ok(summary)
            }
            Err(e) => {
                error!(session = %self.inner.id, error = %e, "Import session aborted");
                self.set_state(RunState::Aborted {
                    stage: e.stage().to_string(),
                    reason: e.to_string(),
                });
                self.emit(ImportEvent::PipelineAborted {
                    session_id: self.inner.id.clone(),
                    stage: e.stage().to_string(),
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Registry access
    // ========================================================================

    /// Park a task for operator attention. Sentinels cannot be registered.
    pub fn register_task(&self, task: ImportTask) -> Result<TaskId, SessionError> {
        let Some(media) = task.media() else {
            return Err(SessionError::InvalidInput(
                "sentinel tasks cannot be registered".to_string(),
            ));
        };
        let event = |task_id: &TaskId| ImportEvent::TaskRegistered {
            session_id: self.inner.id.clone(),
            task_id: task_id.to_string(),
            kind: task.kind().as_str().to_string(),
            recommendation: media.recommendation.as_str().to_string(),
            candidates: media.candidates.len(),
        };
        let id = self.registry().insert(task.clone());
        debug!(session = %self.inner.id, task_id = %id, "Task registered");
        self.emit(event(&id));
        Ok(id)
    }

    pub fn get_task(&self, id: &TaskId) -> Result<ImportTask, SessionError> {
        self.registry()
            .get(id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    pub fn list_pending(&self, include_paths: bool) -> Vec<TaskSummary> {
        self.registry()
            .iter()
            .map(|(id, task)| TaskSummary::new(&id, task, include_paths))
            .collect()
    }

    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.registry().iter().map(|(id, _)| id).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.registry().len()
    }

    pub fn merged_paths(&self) -> BTreeSet<PathBuf> {
        self.registry().merged_paths().clone()
    }

    pub(crate) fn already_merged(&self, task: &ImportTask) -> bool {
        self.registry().already_merged(task.paths())
    }

    fn not_found(&self, id: &TaskId) -> SessionError {
        warn!(session = %self.inner.id, task_id = %id, "Task not found");
        SessionError::TaskNotFound(id.clone())
    }

    /// Run `f` on the registered task's payload under the registry lock.
    fn with_media<T>(
        &self,
        id: &TaskId,
        f: impl FnOnce(&mut MediaTask) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut registry = self.registry();
        let task = registry.get_mut(id).ok_or_else(|| self.not_found(id))?;
        let media = task
            .media_mut()
            .ok_or_else(|| SessionError::invalid_choice(id, "task carries no items"))?;
        f(media)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Select candidate `index`. The task stays registered.
    pub fn choose_candidate(&self, id: &TaskId, index: usize) -> Result<(), SessionError> {
        self.with_media(id, |media| {
            if index >= media.candidates.len() {
                return Err(SessionError::InvalidInput(format!(
                    "candidate index {} out of range ({} candidates)",
                    index,
                    media.candidates.len()
                )));
            }
            media.choice = Choice::UseCandidate(index);
            Ok(())
        })
    }

    /// Look the task up again by service ids. Whitespace-separated ids
    /// within one entry are split.
    pub async fn search_by_id(
        &self,
        id: &TaskId,
        ids: Vec<String>,
    ) -> Result<ImportTask, SessionError> {
        let ids: Vec<String> = ids
            .iter()
            .flat_map(|s| s.split_whitespace())
            .map(String::from)
            .collect();
        if ids.is_empty() {
            return Err(SessionError::InvalidInput("no search ids given".to_string()));
        }
        self.research(id, LookupQuery::by_ids(ids)).await
    }

    /// Look the task up again with an explicit artist and title.
    pub async fn search_by_name(
        &self,
        id: &TaskId,
        artist: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<ImportTask, SessionError> {
        let (artist, title) = (artist.into(), title.into());
        if artist.trim().is_empty() && title.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "artist and title are both empty".to_string(),
            ));
        }
        self.research(id, LookupQuery::by_name(artist, title)).await
    }

    async fn research(&self, id: &TaskId, query: LookupQuery) -> Result<ImportTask, SessionError> {
        let snapshot = self.get_task(id)?;
        let proposal = self.lookup(&snapshot, &query).await?;

        let mut registry = self.registry();
        let task = registry.get_mut(id).ok_or_else(|| self.not_found(id))?;
        if proposal.is_empty() {
            debug!(task_id = %id, "Search returned no candidates, keeping existing ones");
            return Ok(task.clone());
        }

        let count = proposal.candidates.len();
        let recommendation = proposal.recommendation;
        if let Some(media) = task.media_mut() {
            media.set_candidates(proposal.candidates, proposal.recommendation);
        }
        let task = task.clone();
        drop(registry);

        self.emit(ImportEvent::CandidatesReplaced {
            session_id: self.inner.id.clone(),
            task_id: id.to_string(),
            candidates: count,
            recommendation: recommendation.as_str().to_string(),
        });
        Ok(task)
    }

    pub(crate) async fn lookup(
        &self,
        task: &ImportTask,
        query: &LookupQuery,
    ) -> Result<Proposal, LookupError> {
        let lookup = &self.inner.services.lookup;
        match task {
            ImportTask::Album(media) => lookup.match_album(&media.items, query).await,
            ImportTask::Singleton(media) => match media.items.first() {
                Some(item) => lookup.match_item(item, query).await,
                None => Ok(Proposal::empty()),
            },
            ImportTask::Sentinel { .. } => Ok(Proposal::empty()),
        }
    }

    /// Check the library for items the task duplicates.
    ///
    /// Returns true when the task may go ahead: either nothing overlaps, or
    /// quiet mode turned the task into a skip. Otherwise the duplicates are
    /// recorded on the task and false is returned.
    pub fn resolve_duplicates(&self, id: &TaskId) -> Result<bool, SessionError> {
        let snapshot = self.get_task(id)?;
        let found = self.inner.services.library.find_duplicates(&snapshot)?;
        self.with_media(id, |media| Ok(self.apply_duplicate_policy(media, found)))
    }

    pub(crate) fn apply_duplicate_policy(
        &self,
        media: &mut MediaTask,
        found: BTreeSet<ItemRef>,
    ) -> bool {
        if found.is_empty() {
            media.duplicates = None;
            return true;
        }
        if self.inner.options.quiet {
            debug!(duplicates = found.len(), "Quiet mode: skipping task with duplicates");
            media.duplicates = None;
            media.choice = Choice::Skip;
            return true;
        }
        media.duplicates = Some(found);
        false
    }

    /// Remove the task and import it with its current choice.
    ///
    /// The task is committed first and then fed through the downstream
    /// stages. On a failed commit it is put back under the same id.
    pub async fn finalize_task(&self, id: &TaskId) -> Result<Disposition, SessionError> {
        let task = self.registry().remove(id).ok_or_else(|| self.not_found(id))?;
        let media = task.media();
        let choice = media.map(|m| m.choice).unwrap_or_default();

        let invalid = match choice {
            Choice::Unset => Some("no choice has been made".to_string()),
            Choice::Tracks => Some("split the task into tracks instead".to_string()),
            Choice::UseCandidate(k) if media.map_or(true, |m| m.candidates.get(k).is_none()) => {
                Some(format!("candidate {} does not exist", k))
            }
            _ => None,
        };
        if let Some(reason) = invalid {
            self.registry().restore(id, task);
            return Err(SessionError::invalid_choice(id, reason));
        }

        if choice == Choice::Skip {
            self.record_skip(Some(id), "operator");
            return Ok(Disposition::Skipped);
        }

        let mut accepted = task.clone();
        if let Err(e) = self.refresh_duplicates_to_remove(&mut accepted) {
            self.registry().restore(id, task);
            return Err(e);
        }
        if let Err(e) = self.commit(&mut accepted, Some(id)) {
            error!(task_id = %id, error = %e, "Commit failed, task kept");
            self.registry().restore(id, task);
            return Err(e.into());
        }

        self.new_pipeline(stream::iter(vec![accepted]).boxed(), self.downstream_stages())
            .await?;
        Ok(Disposition::Committed)
    }

    /// Re-detect duplicates against the task's current choice when they are
    /// to be removed on commit, so a stale or missing detection does not
    /// leave both copies in the library.
    fn refresh_duplicates_to_remove(&self, task: &mut ImportTask) -> Result<(), SessionError> {
        let Some(media) = task.media() else {
            return Ok(());
        };
        if !media.should_remove_duplicates {
            return Ok(());
        }
        let found = self.inner.services.library.find_duplicates(task)?;
        debug!(duplicates = found.len(), "Duplicates to remove on commit");
        if let Some(media) = task.media_mut() {
            media.duplicates = (!found.is_empty()).then_some(found);
        }
        Ok(())
    }

    /// Apply the chosen metadata and store the task in the library.
    pub(crate) fn commit(
        &self,
        task: &mut ImportTask,
        id: Option<&TaskId>,
    ) -> Result<CommitReceipt, LibraryError> {
        apply_metadata(task);
        let receipt = self.inner.services.library.commit(task)?;

        let choice = task.media().map(|m| m.choice).unwrap_or_default();
        if let Some(media) = task.media_mut() {
            for (item, item_ref) in media.items.iter_mut().zip(&receipt.items) {
                item.id = Some(item_ref.0);
            }
        }

        TASKS_COMMITTED
            .with_label_values(&[task.kind().as_str()])
            .inc();
        info!(
            session = %self.inner.id,
            task_id = id.map(TaskId::as_str).unwrap_or("-"),
            kind = task.kind().as_str(),
            items = receipt.items.len(),
            removed = receipt.removed,
            "Task committed"
        );
        self.emit(ImportEvent::TaskCommitted {
            session_id: self.inner.id.clone(),
            task_id: id.map(TaskId::to_string),
            kind: task.kind().as_str().to_string(),
            items: receipt.items.len(),
            choice: choice.as_str().to_string(),
            removed_duplicates: receipt.removed,
        });
        Ok(receipt)
    }

    pub(crate) fn record_skip(&self, id: Option<&TaskId>, reason: &str) {
        TASKS_SKIPPED.inc();
        info!(
            session = %self.inner.id,
            task_id = id.map(TaskId::as_str).unwrap_or("-"),
            reason,
            "Task skipped"
        );
        self.emit(ImportEvent::TaskSkipped {
            session_id: self.inner.id.clone(),
            task_id: id.map(TaskId::to_string),
            reason: reason.to_string(),
        });
    }

    /// Drop a registered task without importing it.
    pub fn skip_task(&self, id: &TaskId) -> Result<ImportTask, SessionError> {
        let task = self.registry().remove(id).ok_or_else(|| self.not_found(id))?;
        self.record_skip(Some(id), "operator");
        Ok(task)
    }

    /// Import the task with its own tags.
    pub async fn accept_as_is(&self, id: &TaskId) -> Result<Disposition, SessionError> {
        self.with_media(id, |media| {
            media.choice = Choice::AsIs;
            Ok(())
        })?;
        self.finalize_if_resolved(id).await
    }

    /// Import the task with its chosen candidate, defaulting to the best one.
    pub async fn apply(&self, id: &TaskId) -> Result<Disposition, SessionError> {
        self.default_to_first_candidate(id, false)?;
        self.finalize_if_resolved(id).await
    }

    /// Settle a duplicate conflict reported by [`resolve_duplicates`].
    ///
    /// [`resolve_duplicates`]: Self::resolve_duplicates
    pub async fn resolve_duplicate_action(
        &self,
        id: &TaskId,
        action: DuplicateAction,
    ) -> Result<Disposition, SessionError> {
        self.default_to_first_candidate(id, true)?;
        match action {
            DuplicateAction::Keep => {}
            DuplicateAction::Remove => self.with_media(id, |media| {
                media.should_remove_duplicates = true;
                Ok(())
            })?,
            DuplicateAction::Merge => return self.merge_duplicates(id).await,
        }
        self.finalize_task(id).await
    }

    async fn finalize_if_resolved(&self, id: &TaskId) -> Result<Disposition, SessionError> {
        if self.resolve_duplicates(id)? {
            self.finalize_task(id).await
        } else {
            Ok(Disposition::Pending)
        }
    }

    fn default_to_first_candidate(&self, id: &TaskId, keep_as_is: bool) -> Result<(), SessionError> {
        self.with_media(id, |media| {
            match media.choice {
                Choice::UseCandidate(_) => return Ok(()),
                Choice::AsIs if keep_as_is => return Ok(()),
                _ => {}
            }
            if media.candidates.is_empty() {
                return Err(SessionError::invalid_choice(id, "task has no candidates"));
            }
            media.choice = Choice::UseCandidate(0);
            Ok(())
        })
    }

    /// Combine the task with the library items it duplicates and run the
    /// result through the full pipeline. The absorbed items' paths are
    /// remembered so later passes do not import them again.
    pub async fn merge_duplicates(&self, id: &TaskId) -> Result<Disposition, SessionError> {
        let task = self.registry().remove(id).ok_or_else(|| self.not_found(id))?;
        let duplicates = match self.duplicate_items(&task) {
            Ok(items) => items,
            Err(e) => {
                self.registry().restore(id, task);
                return Err(e);
            }
        };

        let duplicate_count = duplicates.len();
        self.registry()
            .mark_merged(duplicates.iter().map(|item| item.path.clone()));

        let mut items = task.media().map(|m| m.items.clone()).unwrap_or_default();
        items.extend(duplicates);
        let merged = ImportTask::album(None, items);

        MERGES.inc();
        info!(
            session = %self.inner.id,
            task_id = %id,
            duplicates = duplicate_count,
            "Merging task with library duplicates"
        );
        self.emit(ImportEvent::TasksMerged {
            session_id: self.inner.id.clone(),
            task_id: id.to_string(),
            duplicate_items: duplicate_count,
        });

        self.new_pipeline(stream::iter(vec![merged]).boxed(), self.lookup_stages())
            .await?;
        Ok(Disposition::Merged)
    }

    fn duplicate_items(&self, task: &ImportTask) -> Result<Vec<Item>, SessionError> {
        let library = &self.inner.services.library;
        let refs = match task.media().and_then(|m| m.duplicates.clone()) {
            Some(refs) => refs,
            None => library.find_duplicates(task)?,
        };
        Ok(library.items_for(&refs)?)
    }

    /// Replace an album task with one singleton per item followed by a
    /// sentinel, and run them through the full pipeline.
    pub async fn split_into_tracks(&self, id: &TaskId) -> Result<Disposition, SessionError> {
        let task = self.registry().remove(id).ok_or_else(|| self.not_found(id))?;
        let media = match task {
            ImportTask::Album(media) => media,
            other => {
                self.registry().restore(id, other);
                return Err(SessionError::invalid_choice(id, "only album tasks can be split"));
            }
        };

        let toppath = media.toppath.clone();
        let tracks = media.items.len();
        let tasks: Vec<ImportTask> = media
            .items
            .into_iter()
            .map(|item| ImportTask::singleton(toppath.clone(), item))
            .chain(std::iter::once(ImportTask::sentinel(toppath.clone())))
            .collect();

        SPLITS.inc();
        info!(session = %self.inner.id, task_id = %id, tracks, "Splitting album into tracks");
        self.emit(ImportEvent::TaskSplit {
            session_id: self.inner.id.clone(),
            task_id: id.to_string(),
            tracks,
        });

        self.new_pipeline(stream::iter(tasks).boxed(), self.lookup_stages())
            .await?;
        Ok(Disposition::Split)
    }

    pub(crate) fn emit(&self, event: ImportEvent) {
        if let Some(events) = &self.inner.services.events {
            events.try_emit(event);
        }
    }
}
