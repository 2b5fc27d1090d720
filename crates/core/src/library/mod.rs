//! The library: catalog of items that have already been imported.
//!
//! The session reads it to detect duplicates and writes to it when a task
//! is committed. Policy (keep, remove, merge) lives in the session; the
//! library only answers what overlaps and stores what it is given.

mod sqlite;

pub use sqlite::SqliteLibrary;

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use crate::task::{Candidate, ImportTask, Item, ItemRef};

/// Errors that can occur in library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Item not found: {0}")]
    ItemNotFound(ItemRef),

    #[error("Task cannot be stored: {0}")]
    InvalidTask(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Ids assigned by a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub album_id: Option<i64>,
    /// One entry per committed item, in task order.
    pub items: Vec<ItemRef>,
    /// Duplicate items deleted as part of the commit.
    pub removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub albums: u64,
    pub items: u64,
}

/// What a task would collide with in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateKey {
    Album {
        artist: String,
        album: String,
        mb_albumid: Option<String>,
    },
    Item {
        artist: String,
        title: String,
        mb_trackid: Option<String>,
    },
}

impl DuplicateKey {
    /// Key for a task, taken from its chosen candidate when there is one and
    /// from its own tags otherwise. `None` for sentinels and untagged tasks.
    pub fn for_task(task: &ImportTask) -> Option<Self> {
        match task {
            ImportTask::Album(media) => {
                let (artist, album, mb_albumid) = match media.chosen_candidate() {
                    Some(Candidate::Album(m)) => {
                        (m.info.artist.clone(), m.info.album.clone(), m.info.album_id.clone())
                    }
                    _ => (
                        media.cur_artist().unwrap_or_default(),
                        media.cur_album().unwrap_or_default(),
                        None,
                    ),
                };
                if album.is_empty() && mb_albumid.is_none() {
                    return None;
                }
                Some(DuplicateKey::Album {
                    artist,
                    album,
                    mb_albumid,
                })
            }
            ImportTask::Singleton(media) => {
                let item = media.items.first()?;
                let (artist, title, mb_trackid) = match media.chosen_candidate() {
                    Some(Candidate::Track(m)) => {
                        (m.info.artist.clone(), m.info.title.clone(), m.info.track_id.clone())
                    }
                    _ => (item.artist.clone(), item.title.clone(), item.mb_trackid.clone()),
                };
                if title.is_empty() && mb_trackid.is_none() {
                    return None;
                }
                Some(DuplicateKey::Item {
                    artist,
                    title,
                    mb_trackid,
                })
            }
            ImportTask::Sentinel { .. } => None,
        }
    }
}

/// Ids of library items that are part of the task itself (after a merge)
/// and therefore never count as duplicates of it.
pub fn own_refs(task: &ImportTask) -> BTreeSet<ItemRef> {
    task.media()
        .map(|m| m.items.iter().filter_map(Item::item_ref).collect())
        .unwrap_or_default()
}

/// Catalog store consumed by the session.
pub trait Library: Send + Sync {
    /// Library items that overlap with the task's content.
    fn find_duplicates(&self, task: &ImportTask) -> Result<BTreeSet<ItemRef>, LibraryError>;

    /// Load items by reference, ordered by album, disc and track.
    fn items_for(&self, refs: &BTreeSet<ItemRef>) -> Result<Vec<Item>, LibraryError>;

    /// Store an accepted task in a single transaction.
    ///
    /// Items that already carry an id are updated in place. When the task
    /// has `should_remove_duplicates` set, its duplicates are deleted in the
    /// same transaction.
    fn commit(&self, task: &ImportTask) -> Result<CommitReceipt, LibraryError>;

    /// Record a new location for an item after its file was placed.
    fn relocate(&self, item: ItemRef, path: &Path) -> Result<(), LibraryError>;

    fn stats(&self) -> Result<LibraryStats, LibraryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{AlbumInfo, AlbumMatch, Choice, Distance};

    #[test]
    fn test_key_from_tags() {
        let task = ImportTask::album(
            None,
            vec![Item::new("/a/1.mp3").with_artist("Low").with_album("C'mon")],
        );
        assert_eq!(
            DuplicateKey::for_task(&task),
            Some(DuplicateKey::Album {
                artist: "Low".into(),
                album: "C'mon".into(),
                mb_albumid: None
            })
        );
    }

    #[test]
    fn test_key_prefers_chosen_candidate() {
        let mut task = ImportTask::album(None, vec![Item::new("/a/1.mp3").with_album("cmon")]);
        let media = task.media_mut().unwrap();
        media.candidates = vec![Candidate::Album(AlbumMatch {
            distance: Distance::default(),
            info: AlbumInfo {
                album: "C'mon".into(),
                artist: "Low".into(),
                album_id: Some("mb-1".into()),
                ..Default::default()
            },
            mapping: vec![],
            extra_items: vec![],
            extra_tracks: vec![],
        })];
        media.choice = Choice::UseCandidate(0);

        match DuplicateKey::for_task(&task) {
            Some(DuplicateKey::Album { mb_albumid, .. }) => {
                assert_eq!(mb_albumid.as_deref(), Some("mb-1"))
            }
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_no_key_for_sentinel_or_untagged() {
        assert!(DuplicateKey::for_task(&ImportTask::sentinel(None)).is_none());
        assert!(DuplicateKey::for_task(&ImportTask::singleton(None, Item::new("/x.mp3"))).is_none());
    }
}
