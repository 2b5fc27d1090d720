//! Turns source paths into a stream of import tasks.
//!
//! Each top-level path is walked on a blocking thread. Audio files are
//! grouped by directory into album tasks, or emitted one by one as
//! singletons followed by a sentinel for the top-level path.

mod tags;

pub use tags::{is_audio_file, read_item};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::metrics;
use crate::pipeline::TaskSource;
use crate::task::{ImportTask, Item};

/// Buffer between the walking thread and the pipeline.
const READ_BUFFER: usize = 8;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to read tags from {path}: {message}")]
    Tags { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Emit every file as a singleton task.
    pub singletons: bool,
}

/// Lazily read tasks from `paths`.
///
/// Unreadable paths and files are logged and skipped; the stream simply
/// ends once every path has been walked.
pub fn read_tasks(paths: Vec<PathBuf>, options: ReadOptions) -> TaskSource {
    let (tx, rx) = mpsc::channel(READ_BUFFER);

    tokio::task::spawn_blocking(move || {
        for toppath in paths {
            for task in read_toppath(&toppath, options) {
                metrics::TASKS_READ
                    .with_label_values(&[task.kind().as_str()])
                    .inc();
                if tx.blocking_send(task).is_err() {
                    debug!("Task consumer went away, stopping read");
                    return;
                }
            }
        }
    });

    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|task| (task, rx)) }).boxed()
}

fn read_toppath(toppath: &Path, options: ReadOptions) -> Vec<ImportTask> {
    if !toppath.exists() {
        warn!(path = %toppath.display(), "Source path does not exist, skipping");
        return Vec::new();
    }

    let groups = collect_groups(toppath);
    let mut read = Vec::with_capacity(groups.len());
    for (dir, files) in groups {
        let items: Vec<Item> = files
            .iter()
            .filter_map(|path| match read_item(path) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable file");
                    None
                }
            })
            .collect();
        if !items.is_empty() {
            read.push((dir, items));
        }
    }

    let tasks = build_tasks(toppath, read, options);
    info!(
        path = %toppath.display(),
        tasks = tasks.len(),
        "Read source path"
    );
    tasks
}

/// Audio files under `toppath`, grouped by containing directory.
fn collect_groups(toppath: &Path) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut groups: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();

    for entry in WalkDir::new(toppath).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Error walking source path");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }
        let dir = entry
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| toppath.to_path_buf());
        groups.entry(dir).or_default().push(entry.into_path());
    }

    groups
}

/// Shape grouped items into tasks.
fn build_tasks(
    toppath: &Path,
    groups: Vec<(PathBuf, Vec<Item>)>,
    options: ReadOptions,
) -> Vec<ImportTask> {
    let toppath = Some(toppath.to_path_buf());
    let mut tasks = Vec::new();

    if options.singletons {
        for (_, items) in groups {
            tasks.extend(
                items
                    .into_iter()
                    .map(|item| ImportTask::singleton(toppath.clone(), item)),
            );
        }
        tasks.push(ImportTask::sentinel(toppath));
        return tasks;
    }

    for (_, mut items) in groups {
        items.sort_by(|a, b| (a.disc, a.track, &a.path).cmp(&(b.disc, b.track, &b.path)));
        tasks.push(ImportTask::album(toppath.clone(), items));
    }
    tasks
}
