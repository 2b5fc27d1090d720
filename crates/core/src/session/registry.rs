use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::metrics::PENDING_TASKS;
use crate::task::{ImportTask, TaskId};

/// Tasks parked for operator attention, keyed by their session-scoped id.
#[derive(Default)]
pub(crate) struct Registry {
    tasks: BTreeMap<u64, ImportTask>,
    next_id: u64,
    merged_paths: BTreeSet<PathBuf>,
}

/// Registry key for `id`. Only the exact form handed out by `insert`
/// addresses a task, so `"01"` or `"+1"` never alias task `"1"`.
fn key(id: &TaskId) -> Option<u64> {
    let k: u64 = id.as_str().parse().ok()?;
    (k.to_string() == id.as_str()).then_some(k)
}

impl Registry {
    /// Park a task under a fresh id. Ids are never reused.
    pub fn insert(&mut self, task: ImportTask) -> TaskId {
        self.next_id += 1;
        self.tasks.insert(self.next_id, task);
        PENDING_TASKS.inc();
        TaskId::from(self.next_id)
    }

    /// Put a popped task back under the id it had.
    pub fn restore(&mut self, id: &TaskId, task: ImportTask) {
        if let Some(k) = key(id) {
            if self.tasks.insert(k, task).is_none() {
                PENDING_TASKS.inc();
            }
        }
    }

    pub fn get(&self, id: &TaskId) -> Option<&ImportTask> {
        key(id).and_then(|k| self.tasks.get(&k))
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut ImportTask> {
        key(id).and_then(|k| self.tasks.get_mut(&k))
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<ImportTask> {
        let task = key(id).and_then(|k| self.tasks.remove(&k));
        if task.is_some() {
            PENDING_TASKS.dec();
        }
        task
    }

    /// Registered tasks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &ImportTask)> {
        self.tasks.iter().map(|(k, t)| (TaskId::from(*k), t))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn mark_merged(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.merged_paths.extend(paths);
    }

    /// True when every path was absorbed by an earlier merge.
    pub fn already_merged<'a>(&self, mut paths: impl Iterator<Item = &'a PathBuf>) -> bool {
        let mut any = false;
        let all = paths.all(|p| {
            any = true;
            self.merged_paths.contains(p)
        });
        any && all
    }

    pub fn merged_paths(&self) -> &BTreeSet<PathBuf> {
        &self.merged_paths
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        PENDING_TASKS.sub(self.tasks.len() as i64);
    }
}
