use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::stage::Stage;
use super::PipelineError;
use crate::metrics;
use crate::task::ImportTask;

/// Lazy, finite, non-restartable source of tasks.
pub type TaskSource = BoxStream<'static, ImportTask>;

/// Capacity of each inter-stage queue unless configured otherwise.
pub const DEFAULT_QUEUE_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Concurrent,
    Sequential,
}

impl ExecutionMode {
    pub fn from_concurrent(concurrent: bool) -> Self {
        if concurrent {
            ExecutionMode::Concurrent
        } else {
            ExecutionMode::Sequential
        }
    }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tasks pulled from the source.
    pub tasks_read: usize,
    /// Tasks (sentinels included) that left the last stage.
    pub tasks_completed: usize,
}

/// An ordered chain of stages.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    mode: ExecutionMode,
    queue_size: usize,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages,
            mode: ExecutionMode::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Drive every task from `source` through all stages.
    ///
    /// Returns once the source is exhausted and every stage is idle, or as
    /// soon as a stage aborts.
    pub async fn run(&self, source: TaskSource) -> Result<RunSummary, PipelineError> {
        debug!(
            mode = ?self.mode,
            stages = ?self.stage_names(),
            "Starting pipeline run"
        );
        let result = match self.mode {
            ExecutionMode::Sequential => self.run_sequential(source).await,
            ExecutionMode::Concurrent => self.run_concurrent(source).await,
        };
        match &result {
            Ok(summary) => debug!(
                read = summary.tasks_read,
                completed = summary.tasks_completed,
                "Pipeline run finished"
            ),
            Err(e) => {
                error!(stage = e.stage(), error = %e, "Pipeline run aborted");
                metrics::PIPELINE_ABORTS.inc();
            }
        }
        result
    }

    async fn run_sequential(&self, mut source: TaskSource) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        // (next stage index, task); popped depth-first so fan-out keeps its order.
        let mut stack: Vec<(usize, ImportTask)> = Vec::new();

        while let Some(task) = source.next().await {
            summary.tasks_read += 1;
            stack.push((0, task));

            while let Some((idx, task)) = stack.pop() {
                let Some(stage) = self.stages.get(idx) else {
                    summary.tasks_completed += 1;
                    continue;
                };
                let produced = call_stage(stage.as_ref(), task).await?;
                stack.extend(produced.into_iter().rev().map(|t| (idx + 1, t)));
            }
        }

        Ok(summary)
    }

    async fn run_concurrent(&self, mut source: TaskSource) -> Result<RunSummary, PipelineError> {
        let state = Arc::new(AbortState::default());
        let (feed_tx, mut rx) = mpsc::channel::<ImportTask>(self.queue_size);

        let feeder_state = Arc::clone(&state);
        let feeder = tokio::spawn(async move {
            let mut read = 0;
            while let Some(task) = source.next().await {
                if feeder_state.is_aborted() || feed_tx.send(task).await.is_err() {
                    break;
                }
                read += 1;
            }
            read
        });

        let mut workers = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let (tx, next_rx) = mpsc::channel(self.queue_size);
            let name = stage.name().to_string();
            let handle = tokio::spawn(stage_worker(
                Arc::clone(stage),
                rx,
                tx,
                Arc::clone(&state),
            ));
            workers.push((name, handle));
            rx = next_rx;
        }

        let mut tasks_completed = 0;
        while let Some(_task) = rx.recv().await {
            if !state.is_aborted() {
                tasks_completed += 1;
            }
        }

        let tasks_read = match feeder.await {
            Ok(read) => read,
            Err(_) => {
                state.abort(PipelineError::StagePanicked {
                    stage: "source".to_string(),
                });
                0
            }
        };
        for (stage, handle) in workers {
            if handle.await.is_err() {
                state.abort(PipelineError::StagePanicked { stage });
            }
        }

        match state.take_error() {
            Some(err) => Err(err),
            None => Ok(RunSummary {
                tasks_read,
                tasks_completed,
            }),
        }
    }
}

/// Abort flag plus the first error that raised it.
#[derive(Default)]
struct AbortState {
    aborted: AtomicBool,
    error: Mutex<Option<PipelineError>>,
}

impl AbortState {
    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn abort(&self, err: PipelineError) {
        if let Ok(mut slot) = self.error.lock() {
            slot.get_or_insert(err);
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn take_error(&self) -> Option<PipelineError> {
        self.error.lock().ok().and_then(|mut slot| slot.take())
    }
}

async fn stage_worker(
    stage: Arc<dyn Stage>,
    mut rx: mpsc::Receiver<ImportTask>,
    tx: mpsc::Sender<ImportTask>,
    state: Arc<AbortState>,
) {
    while let Some(task) = rx.recv().await {
        if state.is_aborted() {
            continue;
        }
        match call_stage(stage.as_ref(), task).await {
            Ok(produced) => {
                for out in produced {
                    if state.is_aborted() {
                        break;
                    }
                    if tx.send(out).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                state.abort(err);
                return;
            }
        }
    }
}

async fn call_stage(stage: &dyn Stage, task: ImportTask) -> Result<Vec<ImportTask>, PipelineError> {
    let started = Instant::now();
    let result = AssertUnwindSafe(stage.process(task)).catch_unwind().await;
    metrics::STAGE_DURATION
        .with_label_values(&[stage.name()])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(Ok(produced)) => Ok(produced),
        Ok(Err(source)) => Err(PipelineError::Aborted {
            stage: stage.name().to_string(),
            source,
        }),
        Err(_) => Err(PipelineError::StagePanicked {
            stage: stage.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FnStage, StageError};
    use crate::task::Item;
    use futures::stream;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;

    fn singleton(name: &str) -> ImportTask {
        ImportTask::singleton(None, Item::new(format!("/in/{}.mp3", name)).with_title(name))
    }

    fn title(task: &ImportTask) -> String {
        match task.media() {
            Some(m) => m.items[0].title.clone(),
            None => "<sentinel>".to_string(),
        }
    }

    fn source(tasks: Vec<ImportTask>) -> TaskSource {
        stream::iter(tasks).boxed()
    }

    /// Terminal stage that records the titles it sees.
    fn recorder(seen: Arc<Mutex<Vec<String>>>) -> Arc<dyn Stage> {
        Arc::new(FnStage::new("record", move |task| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                seen.lock().unwrap().push(title(&task));
                Ok(vec![task])
            })
        }))
    }

    fn doubler() -> Arc<dyn Stage> {
        Arc::new(FnStage::new("double", |task| {
            Box::pin(async move {
                if task.is_sentinel() {
                    return Ok(vec![task]);
                }
                let mut copy = task.clone();
                if let Some(m) = copy.media_mut() {
                    m.items[0].title.push_str("-b");
                }
                Ok(vec![task, copy])
            })
        }))
    }

    #[tokio::test]
    async fn test_sequential_preserves_source_and_fanout_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![doubler(), recorder(Arc::clone(&seen))])
            .with_mode(ExecutionMode::Sequential);

        let summary = pipeline
            .run(source(vec![singleton("a"), singleton("b")]))
            .await
            .unwrap();

        assert_eq!(summary.tasks_read, 2);
        assert_eq!(summary.tasks_completed, 4);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "a-b", "b", "b-b"]);
    }

    #[tokio::test]
    async fn test_concurrent_same_membership_as_sequential() {
        let tasks: Vec<_> = (0..40).map(|i| singleton(&format!("t{}", i))).collect();

        let seq_seen = Arc::new(Mutex::new(Vec::new()));
        Pipeline::new(vec![doubler(), recorder(Arc::clone(&seq_seen))])
            .with_mode(ExecutionMode::Sequential)
            .run(source(tasks.clone()))
            .await
            .unwrap();

        let con_seen = Arc::new(Mutex::new(Vec::new()));
        let summary = Pipeline::new(vec![doubler(), recorder(Arc::clone(&con_seen))])
            .with_queue_size(2)
            .run(source(tasks))
            .await
            .unwrap();

        assert_eq!(summary.tasks_completed, 80);
        let seq: BTreeSet<_> = seq_seen.lock().unwrap().iter().cloned().collect();
        let con: BTreeSet<_> = con_seen.lock().unwrap().iter().cloned().collect();
        assert_eq!(seq, con);
    }

    #[tokio::test]
    async fn test_filtering_stage_drops_tasks() {
        let drop_b: Arc<dyn Stage> = Arc::new(FnStage::new("filter", |task| {
            Box::pin(async move {
                if title(&task) == "b" {
                    Ok(vec![])
                } else {
                    Ok(vec![task])
                }
            })
        }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let summary = Pipeline::new(vec![drop_b, recorder(Arc::clone(&seen))])
            .run(source(vec![singleton("a"), singleton("b"), singleton("c")]))
            .await
            .unwrap();

        assert_eq!(summary.tasks_read, 3);
        assert_eq!(summary.tasks_completed, 2);
        assert!(!seen.lock().unwrap().contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_sentinel_passes_through() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        Pipeline::new(vec![doubler(), recorder(Arc::clone(&seen))])
            .with_mode(ExecutionMode::Sequential)
            .run(source(vec![singleton("a"), ImportTask::sentinel(None)]))
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().last().unwrap(), "<sentinel>");
    }

    fn failing_on(name: &'static str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new("explode", move |task| {
            Box::pin(async move {
                if title(&task) == name {
                    Err(StageError::fatal("disk on fire"))
                } else {
                    Ok(vec![task])
                }
            })
        }))
    }

    #[tokio::test]
    async fn test_abort_sequential_stops_downstream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let err = Pipeline::new(vec![failing_on("b"), recorder(Arc::clone(&seen))])
            .with_mode(ExecutionMode::Sequential)
            .run(source(vec![singleton("a"), singleton("b"), singleton("c")]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Aborted { ref stage, .. } if stage == "explode"));
        assert_eq!(*seen.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_abort_concurrent_propagates_and_never_reaches_downstream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tasks: Vec<_> = (0..20).map(|i| singleton(&format!("t{}", i))).collect();
        let err = Pipeline::new(vec![failing_on("t5"), recorder(Arc::clone(&seen))])
            .with_queue_size(1)
            .run(source(tasks))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "explode");
        assert!(!seen.lock().unwrap().contains(&"t5".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_stage_is_reported() {
        let boom: Arc<dyn Stage> = Arc::new(FnStage::new("boom", |_task| {
            Box::pin(async move { panic!("stage bug") })
        }));
        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent] {
            let err = Pipeline::new(vec![Arc::clone(&boom)])
                .with_mode(mode)
                .run(source(vec![singleton("a")]))
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::StagePanicked { ref stage } if stage == "boom"));
        }
    }

    #[tokio::test]
    async fn test_backpressure_with_slow_stage() {
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&processed);
        let slow: Arc<dyn Stage> = Arc::new(FnStage::new("slow", move |task| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![task])
            })
        }));
        let tasks: Vec<_> = (0..10).map(|i| singleton(&format!("t{}", i))).collect();
        let summary = Pipeline::new(vec![doubler(), slow])
            .with_queue_size(1)
            .run(source(tasks))
            .await
            .unwrap();

        assert_eq!(summary.tasks_completed, 20);
        assert_eq!(processed.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_empty_pipeline_counts_source() {
        let summary = Pipeline::new(vec![])
            .run(source(vec![singleton("a"), singleton("b")]))
            .await
            .unwrap();
        assert_eq!(summary.tasks_read, 2);
        assert_eq!(summary.tasks_completed, 2);
    }
}
