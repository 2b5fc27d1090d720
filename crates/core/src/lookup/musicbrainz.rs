//! MusicBrainz-backed candidate lookup.
//!
//! MusicBrainz requires:
//! - User-Agent header with application name/version and contact info
//! - Rate limiting: 1 request per second

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::distance::{album_match, rank, recommend, track_match};
use super::{CandidateLookup, LookupError, LookupQuery, Proposal};
use crate::config::MatchConfig;
use crate::metrics;
use crate::task::{AlbumInfo, Candidate, Item, MediaTask, TrackInfo};

const SERVICE: &str = "musicbrainz";

/// MusicBrainz client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicBrainzConfig {
    /// Base URL of the web service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Contact appended to the User-Agent, e.g. "ops@example.com".
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Minimum delay between requests in milliseconds.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://musicbrainz.org/ws/2".to_string()
}

fn default_rate_limit() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: None,
            rate_limit_ms: default_rate_limit(),
            timeout_secs: default_timeout(),
        }
    }
}

impl MusicBrainzConfig {
    fn user_agent_header(&self) -> String {
        let contact = self
            .user_agent
            .as_deref()
            .unwrap_or("https://github.com/webimport/webimport");
        format!("webimport/{} ( {} )", env!("CARGO_PKG_VERSION"), contact)
    }
}

/// Candidate lookup backed by the MusicBrainz web service.
pub struct MusicBrainzLookup {
    client: Client,
    base_url: String,
    last_request: Arc<Mutex<Option<Instant>>>,
    rate_limit: Duration,
    matching: MatchConfig,
}

impl MusicBrainzLookup {
    pub fn new(config: &MusicBrainzConfig, matching: MatchConfig) -> Result<Self, LookupError> {
        let client = Client::builder()
            .user_agent(config.user_agent_header())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            last_request: Arc::new(Mutex::new(None)),
            rate_limit: Duration::from_millis(config.rate_limit_ms),
            matching,
        })
    }

    /// Wait for rate limit if needed.
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.rate_limit {
                let wait_time = self.rate_limit - elapsed;
                debug!("MusicBrainz rate limit: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, LookupError> {
        self.wait_for_rate_limit().await;

        let started = std::time::Instant::now();
        let result = self.send(path, query).await;
        metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&[SERVICE, operation])
            .observe(started.elapsed().as_secs_f64());
        metrics::EXTERNAL_SERVICE_REQUESTS
            .with_label_values(&[
                SERVICE,
                operation,
                if result.is_ok() { "success" } else { "error" },
            ])
            .inc();
        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, LookupError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("fmt", "json")])
            .send()
            .await?;

        let status = response.status();
        if status == 429 || status == 503 {
            warn!("MusicBrainz rate limit exceeded");
            return Err(LookupError::RateLimited);
        }
        if status == 404 {
            return Err(LookupError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("{}: {}", path, e)))
    }

    async fn get_release(&self, mbid: &str) -> Result<AlbumInfo, LookupError> {
        debug!("MusicBrainz get release: mbid={}", mbid);
        let release: MbRelease = self
            .get_json(
                "get_release",
                &format!("release/{}", mbid),
                &[("inc", "recordings+artist-credits")],
            )
            .await?;
        Ok(release.into())
    }

    async fn search_release_ids(&self, artist: &str, album: &str) -> Result<Vec<String>, LookupError> {
        let mut clauses = Vec::new();
        if !album.is_empty() {
            clauses.push(format!("release:\"{}\"", escape(album)));
        }
        if !artist.is_empty() {
            clauses.push(format!("artist:\"{}\"", escape(artist)));
        }
        let query = clauses.join(" AND ");
        let limit = self.matching.max_candidates.clamp(1, 100).to_string();

        debug!("MusicBrainz release search: query='{}'", query);
        let result: MbReleaseSearch = self
            .get_json(
                "search_releases",
                "release",
                &[("query", query.as_str()), ("limit", limit.as_str())],
            )
            .await?;
        Ok(result.releases.into_iter().map(|r| r.id).collect())
    }

    async fn get_recording(&self, mbid: &str) -> Result<TrackInfo, LookupError> {
        let recording: MbRecording = self
            .get_json(
                "get_recording",
                &format!("recording/{}", mbid),
                &[("inc", "artist-credits")],
            )
            .await?;
        Ok(recording.into())
    }

    async fn search_recordings(&self, artist: &str, title: &str) -> Result<Vec<TrackInfo>, LookupError> {
        let mut clauses = vec![format!("recording:\"{}\"", escape(title))];
        if !artist.is_empty() {
            clauses.push(format!("artist:\"{}\"", escape(artist)));
        }
        let query = clauses.join(" AND ");
        let limit = self.matching.max_candidates.clamp(1, 100).to_string();

        debug!("MusicBrainz recording search: query='{}'", query);
        let result: MbRecordingSearch = self
            .get_json(
                "search_recordings",
                "recording",
                &[("query", query.as_str()), ("limit", limit.as_str())],
            )
            .await?;
        Ok(result.recordings.into_iter().map(Into::into).collect())
    }

    fn propose(&self, candidates: Vec<Candidate>) -> Proposal {
        let candidates = rank(candidates, self.matching.max_candidates);
        let recommendation = recommend(&candidates, &self.matching);
        Proposal {
            candidates,
            recommendation,
        }
    }
}

#[async_trait]
impl CandidateLookup for MusicBrainzLookup {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn match_album(
        &self,
        items: &[Item],
        query: &LookupQuery,
    ) -> Result<Proposal, LookupError> {
        let release_ids = if query.search_ids.is_empty() {
            let current = MediaTask::new(None, items.to_vec());
            let artist = query.artist.clone().or(current.cur_artist()).unwrap_or_default();
            let album = query.title.clone().or(current.cur_album()).unwrap_or_default();
            if artist.is_empty() && album.is_empty() {
                debug!("No album metadata to search with");
                return Ok(Proposal::empty());
            }
            self.search_release_ids(&artist, &album).await?
        } else {
            query.search_ids.clone()
        };

        let mut candidates = Vec::with_capacity(release_ids.len());
        for id in release_ids {
            match self.get_release(&id).await {
                Ok(info) => candidates.push(Candidate::Album(album_match(items, info))),
                Err(LookupError::NotFound(_)) => debug!("Release {} not found, ignoring", id),
                Err(e) => return Err(e),
            }
        }
        Ok(self.propose(candidates))
    }

    async fn match_item(&self, item: &Item, query: &LookupQuery) -> Result<Proposal, LookupError> {
        let tracks = if query.search_ids.is_empty() {
            let artist = query.artist.clone().unwrap_or_else(|| item.artist.clone());
            let title = query.title.clone().unwrap_or_else(|| item.title.clone());
            if title.is_empty() {
                debug!(path = %item.path.display(), "No title to search with");
                return Ok(Proposal::empty());
            }
            self.search_recordings(&artist, &title).await?
        } else {
            let mut tracks = Vec::new();
            for id in &query.search_ids {
                match self.get_recording(id).await {
                    Ok(track) => tracks.push(track),
                    Err(LookupError::NotFound(_)) => debug!("Recording {} not found, ignoring", id),
                    Err(e) => return Err(e),
                }
            }
            tracks
        };

        let candidates = tracks
            .into_iter()
            .map(|t| Candidate::Track(track_match(item, t)))
            .collect();
        Ok(self.propose(candidates))
    }
}

/// Escape a phrase for use inside a quoted Lucene term.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ============================================================================
// MusicBrainz API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct MbReleaseSearch {
    #[serde(default)]
    releases: Vec<MbReleaseRef>,
}

#[derive(Debug, Deserialize)]
struct MbReleaseRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MbRecordingSearch {
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

#[derive(Debug, Deserialize)]
struct MbRelease {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    media: Vec<MbMedium>,
}

#[derive(Debug, Deserialize)]
struct MbArtistCredit {
    #[serde(default)]
    name: Option<String>,
    artist: MbArtist,
    #[serde(default)]
    joinphrase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MbArtist {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct MbMedium {
    #[serde(default)]
    position: u32,
    #[serde(default)]
    tracks: Vec<MbTrack>,
}

#[derive(Debug, Deserialize)]
struct MbTrack {
    #[serde(default)]
    position: u32,
    title: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    recording: Option<MbRecordingRef>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct MbRecordingRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MbRecording {
    id: String,
    title: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

fn credit_string(credits: &[MbArtistCredit]) -> String {
    credits
        .iter()
        .map(|ac| {
            let name = ac.name.clone().unwrap_or_else(|| ac.artist.name.clone());
            let join = ac.joinphrase.clone().unwrap_or_default();
            format!("{}{}", name, join)
        })
        .collect()
}

fn ms_to_secs(ms: Option<u64>) -> Option<f64> {
    ms.map(|ms| ms as f64 / 1000.0)
}

impl From<MbRelease> for AlbumInfo {
    fn from(mb: MbRelease) -> Self {
        let artist = credit_string(&mb.artist_credit);
        let year = mb
            .date
            .as_deref()
            .and_then(|d| d.split('-').next())
            .and_then(|y| y.parse().ok());

        let mut tracks = Vec::new();
        for medium in mb.media {
            let medium_pos = (medium.position > 0).then_some(medium.position);
            for track in medium.tracks {
                let track_artist = if track.artist_credit.is_empty() {
                    artist.clone()
                } else {
                    credit_string(&track.artist_credit)
                };
                tracks.push(TrackInfo {
                    title: track.title,
                    artist: track_artist,
                    track_id: track.recording.map(|r| r.id),
                    index: track.position,
                    medium: medium_pos,
                    length: ms_to_secs(track.length),
                });
            }
        }

        AlbumInfo {
            album: mb.title,
            artist,
            album_id: Some(mb.id),
            year,
            tracks,
            data_source: "MusicBrainz".to_string(),
        }
    }
}

impl From<MbRecording> for TrackInfo {
    fn from(mb: MbRecording) -> Self {
        TrackInfo {
            title: mb.title,
            artist: credit_string(&mb.artist_credit),
            track_id: Some(mb.id),
            index: 0,
            medium: None,
            length: ms_to_secs(mb.length),
        }
    }
}
