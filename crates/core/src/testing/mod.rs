//! Testing utilities and mock implementations.
//!
//! Mocks for every collaborator a session drives, so the pipeline and the
//! command surface can be exercised without MusicBrainz, a database or a
//! filesystem.
//!
//! # Example
//!
//! ```rust,ignore
//! use webimport_core::testing::{fixtures, MockLibrary, MockLookup, MockPlacer};
//!
//! let lookup = MockLookup::new();
//! lookup.set_default(fixtures::proposal(vec![], Recommendation::None)).await;
//!
//! let services = ImportServices::new(
//!     Arc::new(lookup),
//!     Arc::new(MockLibrary::new()),
//!     Arc::new(MockPlacer::new()),
//! );
//! ```

mod mock_library;
mod mock_lookup;
mod mock_placer;

pub use mock_library::MockLibrary;
pub use mock_lookup::{MockLookup, RecordedLookup};
pub use mock_placer::{MockPlacer, RecordedPlacement};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use crate::lookup::Proposal;
    use crate::task::{
        AlbumInfo, AlbumMatch, Candidate, Distance, ImportTask, Item, Recommendation, TrackInfo,
        TrackMapping, TrackMatch,
    };

    /// Create a tagged item.
    pub fn item(path: &str, artist: &str, album: &str, title: &str, track: u32) -> Item {
        Item {
            albumartist: artist.to_string(),
            length: 180.0 + track as f64,
            format: "FLAC".to_string(),
            ..Item::new(path)
                .with_artist(artist)
                .with_album(album)
                .with_title(title)
                .with_track(track)
        }
    }

    /// Create `tracks` items under `dir`, titled "Track 1", "Track 2", ...
    pub fn album_items(dir: &str, artist: &str, album: &str, tracks: u32) -> Vec<Item> {
        (1..=tracks)
            .map(|i| {
                item(
                    &format!("{}/{:02}.flac", dir, i),
                    artist,
                    album,
                    &format!("Track {}", i),
                    i,
                )
            })
            .collect()
    }

    /// Create an album task read from `dir`.
    pub fn album_task(dir: &str, artist: &str, album: &str, tracks: u32) -> ImportTask {
        ImportTask::album(
            Some(PathBuf::from(dir)),
            album_items(dir, artist, album, tracks),
        )
    }

    /// Create an album candidate whose tracks map one-to-one onto
    /// `album_items` of the same size.
    pub fn album_candidate(artist: &str, album: &str, tracks: u32, distance: f64) -> Candidate {
        let info = AlbumInfo {
            album: album.to_string(),
            artist: artist.to_string(),
            album_id: Some(format!("mb-{}", album.to_lowercase().replace(' ', "-"))),
            year: Some(2024),
            tracks: (1..=tracks)
                .map(|i| TrackInfo {
                    title: format!("Track {}", i),
                    artist: artist.to_string(),
                    track_id: Some(format!("mb-track-{}", i)),
                    index: i,
                    medium: Some(1),
                    length: Some(180.0 + i as f64),
                })
                .collect(),
            data_source: "mock".to_string(),
        };
        Candidate::Album(AlbumMatch {
            distance: Distance::new(distance),
            mapping: (0..tracks as usize)
                .map(|i| TrackMapping { item: i, track: i })
                .collect(),
            info,
            extra_items: Vec::new(),
            extra_tracks: Vec::new(),
        })
    }

    /// Create a track candidate.
    pub fn track_candidate(artist: &str, title: &str, distance: f64) -> Candidate {
        Candidate::Track(TrackMatch {
            distance: Distance::new(distance),
            info: TrackInfo {
                title: title.to_string(),
                artist: artist.to_string(),
                track_id: Some(format!("mb-rec-{}", title.to_lowercase().replace(' ', "-"))),
                ..Default::default()
            },
        })
    }

    pub fn proposal(candidates: Vec<Candidate>, recommendation: Recommendation) -> Proposal {
        Proposal {
            candidates,
            recommendation,
        }
    }
}
