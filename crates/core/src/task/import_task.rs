use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

use super::candidate::Candidate;
use super::item::{Item, ItemRef};

/// Session-scoped task identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for TaskId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coarse verdict on how trustworthy the best candidate is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    #[default]
    None,
    Ambiguous,
    Strong,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::None => "none",
            Recommendation::Ambiguous => "ambiguous",
            Recommendation::Strong => "strong",
        }
    }
}

/// What the operator (or the judge stage) decided to do with a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "index", rename_all = "snake_case")]
pub enum Choice {
    #[default]
    Unset,
    UseCandidate(usize),
    AsIs,
    Skip,
    Tracks,
}

impl Choice {
    pub fn is_set(&self) -> bool {
        !matches!(self, Choice::Unset)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::Unset => "unset",
            Choice::UseCandidate(_) => "use_candidate",
            Choice::AsIs => "as_is",
            Choice::Skip => "skip",
            Choice::Tracks => "tracks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Album,
    Singleton,
    Sentinel,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Album => "album",
            TaskKind::Singleton => "singleton",
            TaskKind::Sentinel => "sentinel",
        }
    }
}

/// Shared payload of album and singleton tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTask {
    /// Top-level source path this task was read from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toppath: Option<PathBuf>,
    pub paths: BTreeSet<PathBuf>,
    pub items: Vec<Item>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub recommendation: Recommendation,
    #[serde(default)]
    pub choice: Choice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<BTreeSet<ItemRef>>,
    #[serde(default)]
    pub should_remove_duplicates: bool,
}

impl MediaTask {
    /// Build a task over `items`; `paths` is derived from the items.
    pub fn new(toppath: Option<PathBuf>, items: Vec<Item>) -> Self {
        let paths = items.iter().map(|i| i.path.clone()).collect();
        Self {
            toppath,
            paths,
            items,
            ..Default::default()
        }
    }

    /// The candidate selected by `choice`, if it points at one that exists.
    pub fn chosen_candidate(&self) -> Option<&Candidate> {
        match self.choice {
            Choice::UseCandidate(idx) => self.candidates.get(idx),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.choice == Choice::Skip
    }

    /// Replace candidates and recommendation together.
    pub fn set_candidates(&mut self, candidates: Vec<Candidate>, recommendation: Recommendation) {
        self.candidates = candidates;
        self.recommendation = recommendation;
    }

    /// Most common album artist across the items.
    pub fn cur_artist(&self) -> Option<String> {
        plurality(self.items.iter().map(|i| i.effective_albumartist()))
    }

    /// Most common album title across the items.
    pub fn cur_album(&self) -> Option<String> {
        plurality(self.items.iter().map(|i| i.album.as_str()))
    }
}

/// Most common non-empty value. Ties go to the value seen first.
pub(crate) fn plurality<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, value) in values.enumerate().filter(|(_, v)| !v.is_empty()) {
        counts.entry(value).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(value, _)| value.to_string())
}

/// A unit of work flowing through the import pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportTask {
    Album(MediaTask),
    Singleton(MediaTask),
    /// End of a group of singletons read from `toppath`.
    Sentinel { toppath: Option<PathBuf> },
}

impl ImportTask {
    pub fn album(toppath: Option<PathBuf>, items: Vec<Item>) -> Self {
        ImportTask::Album(MediaTask::new(toppath, items))
    }

    pub fn singleton(toppath: Option<PathBuf>, item: Item) -> Self {
        ImportTask::Singleton(MediaTask::new(toppath, vec![item]))
    }

    pub fn sentinel(toppath: Option<PathBuf>) -> Self {
        ImportTask::Sentinel { toppath }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            ImportTask::Album(_) => TaskKind::Album,
            ImportTask::Singleton(_) => TaskKind::Singleton,
            ImportTask::Sentinel { .. } => TaskKind::Sentinel,
        }
    }

    pub fn is_album(&self) -> bool {
        matches!(self, ImportTask::Album(_))
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, ImportTask::Sentinel { .. })
    }

    pub fn media(&self) -> Option<&MediaTask> {
        match self {
            ImportTask::Album(m) | ImportTask::Singleton(m) => Some(m),
            ImportTask::Sentinel { .. } => None,
        }
    }

    pub fn media_mut(&mut self) -> Option<&mut MediaTask> {
        match self {
            ImportTask::Album(m) | ImportTask::Singleton(m) => Some(m),
            ImportTask::Sentinel { .. } => None,
        }
    }

    pub fn toppath(&self) -> Option<&PathBuf> {
        match self {
            ImportTask::Album(m) | ImportTask::Singleton(m) => m.toppath.as_ref(),
            ImportTask::Sentinel { toppath } => toppath.as_ref(),
        }
    }

    /// Source paths of this task; empty for sentinels.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.media().into_iter().flat_map(|m| m.paths.iter())
    }
}
