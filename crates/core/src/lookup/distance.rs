//! Scoring of lookup results against source items.
//!
//! Each comparison yields a value in `[0, 1]`; components are combined as a
//! weighted mean. Names of components that contributed are kept as
//! penalties so an operator can see why a candidate scored badly.

use crate::config::MatchConfig;
use crate::task::{
    plurality, AlbumInfo, AlbumMatch, Candidate, Distance, Item, Recommendation, TrackInfo,
    TrackMapping, TrackMatch,
};

const ARTIST_WEIGHT: f64 = 3.0;
const ALBUM_WEIGHT: f64 = 3.0;
const YEAR_WEIGHT: f64 = 1.0;
const TRACK_WEIGHT: f64 = 1.0;
const MISSING_TRACK_WEIGHT: f64 = 0.9;
const UNMATCHED_ITEM_WEIGHT: f64 = 0.6;

const TITLE_WEIGHT: f64 = 3.0;
const TRACK_ARTIST_WEIGHT: f64 = 2.0;
const LENGTH_WEIGHT: f64 = 2.0;
const INDEX_WEIGHT: f64 = 1.0;

/// Seconds of length difference that count as a full mismatch.
const LENGTH_GRACE: f64 = 30.0;

#[derive(Default)]
struct Accumulator {
    weighted: f64,
    total: f64,
    penalties: Vec<String>,
}

impl Accumulator {
    fn add(&mut self, name: &str, weight: f64, dist: f64) {
        self.weighted += weight * dist;
        self.total += weight;
        if dist > 0.0 && !self.penalties.iter().any(|p| p == name) {
            self.penalties.push(name.to_string());
        }
    }

    fn finish(self) -> Distance {
        let distance = if self.total > 0.0 {
            (self.weighted / self.total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Distance {
            distance,
            penalties: self.penalties,
        }
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Edit distance between two strings after case and punctuation folding.
pub fn string_distance(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize(a), normalize(b));
    if a == b {
        return 0.0;
    }
    1.0 - strsim::normalized_levenshtein(&a, &b)
}

fn track_components(acc: &mut Accumulator, item: &Item, track: &TrackInfo) {
    acc.add("title", TITLE_WEIGHT, string_distance(&item.title, &track.title));
    if !track.artist.is_empty() && !item.artist.is_empty() {
        acc.add(
            "artist",
            TRACK_ARTIST_WEIGHT,
            string_distance(&item.artist, &track.artist),
        );
    }
    if let Some(length) = track.length {
        if item.length > 0.0 {
            let diff = (item.length - length).abs();
            acc.add("length", LENGTH_WEIGHT, (diff / LENGTH_GRACE).min(1.0));
        }
    }
    if item.track != 0 && track.index != 0 {
        acc.add(
            "track_index",
            INDEX_WEIGHT,
            if item.track == track.index { 0.0 } else { 1.0 },
        );
    }
}

/// Distance between one item and one track.
pub fn track_distance(item: &Item, track: &TrackInfo) -> Distance {
    let mut acc = Accumulator::default();
    track_components(&mut acc, item, track);
    acc.finish()
}

/// Score a singleton item against a recording.
pub fn track_match(item: &Item, info: TrackInfo) -> TrackMatch {
    TrackMatch {
        distance: track_distance(item, &info),
        info,
    }
}

/// Pair items with tracks, cheapest pairs first.
fn assign_tracks(items: &[Item], tracks: &[TrackInfo]) -> Vec<TrackMapping> {
    let mut pairs: Vec<(f64, usize, usize)> = Vec::with_capacity(items.len() * tracks.len());
    for (i, item) in items.iter().enumerate() {
        for (t, track) in tracks.iter().enumerate() {
            pairs.push((track_distance(item, track).distance, i, t));
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut item_used = vec![false; items.len()];
    let mut track_used = vec![false; tracks.len()];
    let mut mapping = Vec::new();
    for (_, i, t) in pairs {
        if !item_used[i] && !track_used[t] {
            item_used[i] = true;
            track_used[t] = true;
            mapping.push(TrackMapping { item: i, track: t });
        }
    }
    mapping.sort_by_key(|m| m.item);
    mapping
}

/// Score a group of items against a release.
pub fn album_match(items: &[Item], info: AlbumInfo) -> AlbumMatch {
    let mapping = assign_tracks(items, &info.tracks);
    let mut acc = Accumulator::default();

    let cur_artist =
        plurality(items.iter().map(|i| i.effective_albumartist())).unwrap_or_default();
    let cur_album = plurality(items.iter().map(|i| i.album.as_str())).unwrap_or_default();
    acc.add("artist", ARTIST_WEIGHT, string_distance(&cur_artist, &info.artist));
    acc.add("album", ALBUM_WEIGHT, string_distance(&cur_album, &info.album));

    let cur_year = items.iter().find_map(|i| i.year);
    if let (Some(have), Some(want)) = (cur_year, info.year) {
        acc.add("year", YEAR_WEIGHT, if have == want { 0.0 } else { 1.0 });
    }

    for m in &mapping {
        let d = track_distance(&items[m.item], &info.tracks[m.track]).distance;
        acc.add("tracks", TRACK_WEIGHT, d);
    }

    let extra_items: Vec<usize> = (0..items.len())
        .filter(|i| !mapping.iter().any(|m| m.item == *i))
        .collect();
    let extra_tracks: Vec<TrackInfo> = info
        .tracks
        .iter()
        .enumerate()
        .filter(|(t, _)| !mapping.iter().any(|m| m.track == *t))
        .map(|(_, track)| track.clone())
        .collect();

    for _ in &extra_tracks {
        acc.add("missing_tracks", MISSING_TRACK_WEIGHT, 1.0);
    }
    for _ in &extra_items {
        acc.add("unmatched_items", UNMATCHED_ITEM_WEIGHT, 1.0);
    }

    AlbumMatch {
        distance: acc.finish(),
        info,
        mapping,
        extra_items,
        extra_tracks,
    }
}

/// Sort best first and keep at most `max` candidates.
pub fn rank(mut candidates: Vec<Candidate>, max: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| a.distance().distance.total_cmp(&b.distance().distance));
    candidates.truncate(max);
    candidates
}

/// Turn ranked candidates into a recommendation.
///
/// Strong requires the best candidate to be within the strong threshold and
/// clearly ahead of the runner-up.
pub fn recommend(candidates: &[Candidate], config: &MatchConfig) -> Recommendation {
    let Some(best) = candidates.first() else {
        return Recommendation::None;
    };
    let best = best.distance().distance;

    if best <= config.strong_rec_thresh {
        let clear_lead = candidates
            .get(1)
            .map_or(true, |second| second.distance().distance - best >= config.strong_rec_thresh);
        if clear_lead {
            return Recommendation::Strong;
        }
        return Recommendation::Ambiguous;
    }
    if best <= config.medium_rec_thresh {
        return Recommendation::Ambiguous;
    }
    Recommendation::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(index: u32, title: &str, length: f64) -> TrackInfo {
        TrackInfo {
            title: title.to_string(),
            index,
            length: Some(length),
            ..Default::default()
        }
    }

    fn item(track: u32, title: &str, length: f64) -> Item {
        Item {
            artist: "Low".into(),
            album: "Secret Name".into(),
            title: title.into(),
            track,
            length,
            ..Item::new(format!("/in/{:02}.flac", track))
        }
    }

    fn release(tracks: Vec<TrackInfo>) -> AlbumInfo {
        AlbumInfo {
            album: "Secret Name".into(),
            artist: "Low".into(),
            tracks,
            ..Default::default()
        }
    }

    #[test]
    fn test_string_distance_folds_case_and_punctuation() {
        assert_eq!(string_distance("The Beatles!", "the beatles"), 0.0);
        assert!(string_distance("Low", "High") > 0.5);
    }

    #[test]
    fn test_perfect_album_match() {
        let items = vec![item(1, "Starfire", 240.0), item(2, "Weight of Water", 300.0)];
        let m = album_match(
            &items,
            release(vec![track(1, "Starfire", 241.0), track(2, "Weight of Water", 300.0)]),
        );
        assert!(m.distance.distance < 0.01, "{:?}", m.distance);
        assert_eq!(m.mapping.len(), 2);
        assert!(m.extra_items.is_empty());
        assert!(m.extra_tracks.is_empty());
    }

    #[test]
    fn test_missing_tracks_penalized() {
        let items = vec![item(1, "Starfire", 240.0)];
        let m = album_match(
            &items,
            release(vec![track(1, "Starfire", 240.0), track(2, "Soon", 200.0)]),
        );
        assert_eq!(m.extra_tracks.len(), 1);
        assert!(m.distance.penalties.contains(&"missing_tracks".to_string()));
        assert!(m.distance.distance > 0.0);
    }

    #[test]
    fn test_assignment_ignores_file_order() {
        let items = vec![item(2, "Weight of Water", 300.0), item(1, "Starfire", 240.0)];
        let m = album_match(
            &items,
            release(vec![track(1, "Starfire", 240.0), track(2, "Weight of Water", 300.0)]),
        );
        assert_eq!(m.mapping[0], TrackMapping { item: 0, track: 1 });
        assert_eq!(m.mapping[1], TrackMapping { item: 1, track: 0 });
    }

    fn cand(d: f64) -> Candidate {
        Candidate::Track(TrackMatch {
            distance: Distance::new(d),
            info: TrackInfo::default(),
        })
    }

    #[test]
    fn test_recommendation_levels() {
        let cfg = MatchConfig::default();
        assert_eq!(recommend(&[], &cfg), Recommendation::None);
        assert_eq!(recommend(&[cand(0.01)], &cfg), Recommendation::Strong);
        assert_eq!(recommend(&[cand(0.01), cand(0.2)], &cfg), Recommendation::Strong);
        assert_eq!(recommend(&[cand(0.01), cand(0.02)], &cfg), Recommendation::Ambiguous);
        assert_eq!(recommend(&[cand(0.2)], &cfg), Recommendation::Ambiguous);
        assert_eq!(recommend(&[cand(0.6)], &cfg), Recommendation::None);
    }

    #[test]
    fn test_rank_sorts_and_truncates() {
        let ranked = rank(vec![cand(0.5), cand(0.1), cand(0.3)], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].distance().distance, 0.1);
        assert_eq!(ranked[1].distance().distance, 0.3);
    }
}
