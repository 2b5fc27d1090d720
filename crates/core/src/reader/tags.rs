use std::path::Path;

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};

use super::ReaderError;
use crate::task::Item;

const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "aif", "aiff", "ape", "flac", "m4a", "mp3", "mp4", "mpc", "oga", "ogg", "opus", "spx",
    "wav", "wv",
];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read an item's metadata from its tags and audio properties.
pub fn read_item(path: &Path) -> Result<Item, ReaderError> {
    let tags_err = |e: lofty::error::LoftyError| ReaderError::Tags {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let tagged_file = Probe::open(path).map_err(tags_err)?.read().map_err(tags_err)?;

    let properties = tagged_file.properties();
    let mut item = Item {
        length: properties.duration().as_secs_f64(),
        bitrate: properties.audio_bitrate(),
        format: format!("{:?}", tagged_file.file_type()),
        ..Item::new(path)
    };

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        let text = |key: &ItemKey| tag.get_string(key).map(str::to_string);

        item.artist = tag.artist().map(|s| s.to_string()).unwrap_or_default();
        item.album = tag.album().map(|s| s.to_string()).unwrap_or_default();
        item.title = tag.title().map(|s| s.to_string()).unwrap_or_default();
        item.albumartist = text(&ItemKey::AlbumArtist).unwrap_or_default();
        item.track = tag.track().unwrap_or(0);
        item.disc = tag.disk().unwrap_or(0);
        item.year = tag.year().and_then(|y| i32::try_from(y).ok());
        item.mb_trackid = text(&ItemKey::MusicBrainzRecordingId);
        item.mb_albumid = text(&ItemKey::MusicBrainzReleaseId);
    }

    // Untagged files still need something to match on.
    if item.title.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            item.title = stem.to_string();
        }
    }

    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("/a/b.FLAC")));
        assert!(is_audio_file(Path::new("b.mp3")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("README")));
    }

    #[test]
    fn test_read_item_garbage_is_error() {
        let temp = tempfile::NamedTempFile::with_suffix(".flac").unwrap();
        std::fs::write(temp.path(), b"garbage").unwrap();
        assert!(matches!(read_item(temp.path()), Err(ReaderError::Tags { .. })));
    }
}
