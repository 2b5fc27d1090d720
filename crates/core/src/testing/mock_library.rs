//! In-memory library for testing.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::RwLock;

use crate::library::{
    own_refs, CommitReceipt, DuplicateKey, Library, LibraryError, LibraryStats,
};
use crate::task::{ImportTask, Item, ItemRef};

fn same(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[derive(Default)]
struct State {
    items: Vec<Item>,
    next_id: i64,
    commits: Vec<ImportTask>,
    next_error: Option<LibraryError>,
}

/// Mock implementation of the Library trait.
///
/// Keeps items in memory and detects duplicates with the same keys as the
/// SQLite library. Every successful commit is recorded.
#[derive(Default)]
pub struct MockLibrary {
    state: RwLock<State>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add items as if imported earlier. Returns their ids.
    pub fn seed(&self, items: Vec<Item>) -> Vec<ItemRef> {
        let mut state = self.state.write().unwrap();
        items
            .into_iter()
            .map(|mut item| {
                state.next_id += 1;
                item.id = Some(state.next_id);
                state.items.push(item);
                ItemRef(state.next_id)
            })
            .collect()
    }

    /// Configure the next commit to fail with the given error.
    pub fn set_next_error(&self, error: LibraryError) {
        self.state.write().unwrap().next_error = Some(error);
    }

    pub fn commits(&self) -> Vec<ImportTask> {
        self.state.read().unwrap().commits.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.state.read().unwrap().commits.len()
    }

    pub fn items(&self) -> Vec<Item> {
        self.state.read().unwrap().items.clone()
    }
}

impl Library for MockLibrary {
    fn find_duplicates(&self, task: &ImportTask) -> Result<BTreeSet<ItemRef>, LibraryError> {
        let Some(key) = DuplicateKey::for_task(task) else {
            return Ok(BTreeSet::new());
        };
        let own = own_refs(task);
        let state = self.state.read().unwrap();

        Ok(state
            .items
            .iter()
            .filter(|item| match &key {
                DuplicateKey::Album {
                    artist,
                    album,
                    mb_albumid,
                } => {
                    (same(item.effective_albumartist(), artist) && same(&item.album, album))
                        || (mb_albumid.is_some() && item.mb_albumid == *mb_albumid)
                }
                DuplicateKey::Item {
                    artist,
                    title,
                    mb_trackid,
                } => {
                    (same(&item.artist, artist) && same(&item.title, title))
                        || (mb_trackid.is_some() && item.mb_trackid == *mb_trackid)
                }
            })
            .filter_map(Item::item_ref)
            .filter(|r| !own.contains(r))
            .collect())
    }

    fn items_for(&self, refs: &BTreeSet<ItemRef>) -> Result<Vec<Item>, LibraryError> {
        let state = self.state.read().unwrap();
        Ok(state
            .items
            .iter()
            .filter(|item| item.item_ref().map_or(false, |r| refs.contains(&r)))
            .cloned()
            .collect())
    }

    fn commit(&self, task: &ImportTask) -> Result<CommitReceipt, LibraryError> {
        let media = task
            .media()
            .ok_or_else(|| LibraryError::InvalidTask("sentinel".to_string()))?;
        let mut state = self.state.write().unwrap();
        if let Some(err) = state.next_error.take() {
            return Err(err);
        }

        let mut removed = 0;
        if media.should_remove_duplicates {
            if let Some(duplicates) = &media.duplicates {
                let before = state.items.len();
                state
                    .items
                    .retain(|i| !i.item_ref().map_or(false, |r| duplicates.contains(&r)));
                removed = before - state.items.len();
            }
        }

        let mut refs = Vec::with_capacity(media.items.len());
        for item in &media.items {
            let existing = item
                .id
                .and_then(|id| state.items.iter().position(|i| i.id == Some(id)));
            match existing {
                Some(pos) => {
                    state.items[pos] = item.clone();
                    refs.push(ItemRef(item.id.unwrap_or_default()));
                }
                None => {
                    state.next_id += 1;
                    let mut stored = item.clone();
                    stored.id = Some(state.next_id);
                    state.items.push(stored);
                    refs.push(ItemRef(state.next_id));
                }
            }
        }

        state.commits.push(task.clone());
        Ok(CommitReceipt {
            album_id: task.is_album().then_some(state.commits.len() as i64),
            items: refs,
            removed,
        })
    }

    fn relocate(&self, item: ItemRef, path: &Path) -> Result<(), LibraryError> {
        let mut state = self.state.write().unwrap();
        let stored = state
            .items
            .iter_mut()
            .find(|i| i.id == Some(item.0))
            .ok_or(LibraryError::ItemNotFound(item))?;
        stored.path = path.to_path_buf();
        Ok(())
    }

    fn stats(&self) -> Result<LibraryStats, LibraryError> {
        let state = self.state.read().unwrap();
        let albums: BTreeSet<&str> = state
            .items
            .iter()
            .filter(|i| !i.album.is_empty())
            .map(|i| i.album.as_str())
            .collect();
        Ok(LibraryStats {
            albums: albums.len() as u64,
            items: state.items.len() as u64,
        })
    }
}
