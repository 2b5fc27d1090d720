use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Reference to an item already stored in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemRef(pub i64);

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One audio file and the metadata read from its tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Library id, set once the item has been committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub path: PathBuf,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub albumartist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub track: u32,
    #[serde(default)]
    pub disc: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Duration in seconds.
    #[serde(default)]
    pub length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_trackid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mb_albumid: Option<String>,
}

impl Item {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_track(mut self, track: u32) -> Self {
        self.track = track;
        self
    }

    /// Album artist, falling back to the track artist when untagged.
    pub fn effective_albumartist(&self) -> &str {
        if self.albumartist.is_empty() {
            &self.artist
        } else {
            &self.albumartist
        }
    }

    pub fn item_ref(&self) -> Option<ItemRef> {
        self.id.map(ItemRef)
    }
}
