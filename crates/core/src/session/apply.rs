use crate::task::{Candidate, ImportTask};

/// Copy the chosen candidate's metadata onto the task's items.
///
/// Album matches rewrite every mapped item from its matched track and stamp
/// album-level fields on all items, mapped or not. Tasks without a chosen
/// candidate (as-is, skip) are left untouched.
pub fn apply_metadata(task: &mut ImportTask) {
    let Some(media) = task.media_mut() else {
        return;
    };
    let Some(candidate) = media.chosen_candidate().cloned() else {
        return;
    };

    match candidate {
        Candidate::Album(m) => {
            for item in media.items.iter_mut() {
                item.album = m.info.album.clone();
                item.albumartist = m.info.artist.clone();
                item.mb_albumid = m.info.album_id.clone();
                if m.info.year.is_some() {
                    item.year = m.info.year;
                }
            }
            for mapping in &m.mapping {
                let (Some(item), Some(track)) = (
                    media.items.get_mut(mapping.item),
                    m.info.tracks.get(mapping.track),
                ) else {
                    continue;
                };
                item.title = track.title.clone();
                item.artist = if track.artist.is_empty() {
                    m.info.artist.clone()
                } else {
                    track.artist.clone()
                };
                item.track = track.index;
                if let Some(medium) = track.medium {
                    item.disc = medium;
                }
                item.mb_trackid = track.track_id.clone();
            }
        }
        Candidate::Track(m) => {
            if let Some(item) = media.items.first_mut() {
                item.title = m.info.title.clone();
                if !m.info.artist.is_empty() {
                    item.artist = m.info.artist.clone();
                }
                item.mb_trackid = m.info.track_id.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{
        AlbumInfo, AlbumMatch, Choice, Distance, Item, TrackInfo, TrackMapping, TrackMatch,
    };

    fn release() -> AlbumInfo {
        AlbumInfo {
            album: "Things We Lost in the Fire".to_string(),
            artist: "Low".to_string(),
            album_id: Some("mb-album".to_string()),
            year: Some(2001),
            tracks: vec![
                TrackInfo {
                    title: "Sunflower".to_string(),
                    index: 1,
                    medium: Some(1),
                    track_id: Some("mb-t1".to_string()),
                    ..Default::default()
                },
                TrackInfo {
                    title: "Whore".to_string(),
                    artist: "Low feat. Someone".to_string(),
                    index: 2,
                    medium: Some(1),
                    track_id: Some("mb-t2".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_album_match() {
        let mut task = ImportTask::album(
            None,
            vec![
                Item::new("/in/a.mp3").with_title("sunflowr"),
                Item::new("/in/b.mp3").with_title("whore"),
                Item::new("/in/c.mp3").with_title("bonus"),
            ],
        );
        let media = task.media_mut().unwrap();
        media.candidates = vec![Candidate::Album(AlbumMatch {
            distance: Distance::new(0.1),
            info: release(),
            mapping: vec![
                TrackMapping { item: 0, track: 0 },
                TrackMapping { item: 1, track: 1 },
            ],
            extra_items: vec![2],
            extra_tracks: vec![],
        })];
        media.choice = Choice::UseCandidate(0);

        apply_metadata(&mut task);
        let items = &task.media().unwrap().items;
        assert_eq!(items[0].title, "Sunflower");
        assert_eq!(items[0].artist, "Low");
        assert_eq!(items[0].track, 1);
        assert_eq!(items[0].mb_trackid.as_deref(), Some("mb-t1"));
        assert_eq!(items[1].artist, "Low feat. Someone");
        assert_eq!(items[2].title, "bonus");
        assert!(items
            .iter()
            .all(|i| i.album == "Things We Lost in the Fire" && i.year == Some(2001)));
    }

    #[test]
    fn test_apply_track_match() {
        let mut task = ImportTask::singleton(None, Item::new("/in/x.mp3").with_artist("low"));
        let media = task.media_mut().unwrap();
        media.candidates = vec![Candidate::Track(TrackMatch {
            distance: Distance::new(0.0),
            info: TrackInfo {
                title: "Monkey".to_string(),
                artist: "Low".to_string(),
                track_id: Some("mb-rec".to_string()),
                ..Default::default()
            },
        })];
        media.choice = Choice::UseCandidate(0);

        apply_metadata(&mut task);
        let item = &task.media().unwrap().items[0];
        assert_eq!(item.title, "Monkey");
        assert_eq!(item.artist, "Low");
        assert_eq!(item.mb_trackid.as_deref(), Some("mb-rec"));
    }

    #[test]
    fn test_as_is_leaves_items_alone() {
        let mut task = ImportTask::singleton(None, Item::new("/in/x.mp3").with_title("orig"));
        task.media_mut().unwrap().choice = Choice::AsIs;
        let before = task.clone();
        apply_metadata(&mut task);
        assert_eq!(task, before);
    }
}
