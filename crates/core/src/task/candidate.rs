use serde::{Deserialize, Serialize};

/// Weighted distance between source metadata and a candidate.
///
/// `0.0` is a perfect match, `1.0` is as far apart as it gets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub distance: f64,
    /// Names of the components that contributed a penalty.
    #[serde(default)]
    pub penalties: Vec<String>,
}

impl Distance {
    pub fn new(distance: f64) -> Self {
        Self {
            distance,
            penalties: Vec::new(),
        }
    }
}

/// Metadata for a single track as known to the lookup service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    /// 1-based position on the medium.
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<u32>,
    /// Duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
}

/// Metadata for a release as known to the lookup service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumInfo {
    pub album: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub tracks: Vec<TrackInfo>,
    #[serde(default)]
    pub data_source: String,
}

/// Source item at `item` is matched to the candidate track at `track`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMapping {
    pub item: usize,
    pub track: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumMatch {
    pub distance: Distance,
    pub info: AlbumInfo,
    pub mapping: Vec<TrackMapping>,
    /// Indices of source items that matched no track.
    #[serde(default)]
    pub extra_items: Vec<usize>,
    /// Candidate tracks with no source item.
    #[serde(default)]
    pub extra_tracks: Vec<TrackInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMatch {
    pub distance: Distance,
    pub info: TrackInfo,
}

/// A proposed catalog match for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Candidate {
    Album(AlbumMatch),
    Track(TrackMatch),
}

impl Candidate {
    pub fn distance(&self) -> &Distance {
        match self {
            Candidate::Album(m) => &m.distance,
            Candidate::Track(m) => &m.distance,
        }
    }

    /// Artist and title of the proposed match, for display and logging.
    pub fn label(&self) -> String {
        match self {
            Candidate::Album(m) => format!("{} - {}", m.info.artist, m.info.album),
            Candidate::Track(m) => format!("{} - {}", m.info.artist, m.info.title),
        }
    }
}
