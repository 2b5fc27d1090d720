use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::lookup::MusicBrainzConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default, rename = "match")]
    pub matching: MatchConfig,
    #[serde(default)]
    pub musicbrainz: MusicBrainzConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed to make cross-origin requests. Empty disables CORS,
    /// `"*"` allows any origin. A single string may list origins separated
    /// by commas.
    #[serde(default, deserialize_with = "origins")]
    pub cors: Vec<String>,
    /// Let cross-origin requests carry credentials.
    #[serde(default)]
    pub cors_supports_credentials: bool,
    /// Honour the `X-Script-Name` header set by a fronting proxy.
    #[serde(default)]
    pub reverse_proxy: bool,
    /// Include source paths in task summaries.
    #[serde(default)]
    pub include_paths: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: Vec::new(),
            cors_supports_credentials: false,
            reverse_proxy: false,
            include_paths: false,
        }
    }
}

fn origins<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Origins {
        One(String),
        Many(Vec<String>),
    }

    let list = match Origins::deserialize(deserializer)? {
        Origins::One(s) => s.split(',').map(str::to_string).collect(),
        Origins::Many(list) => list,
    };
    Ok(list
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect())
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8337
}

/// Library (catalog + destination directory) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// SQLite database holding the catalog.
    #[serde(default = "default_library_db")]
    pub database: PathBuf,
    /// Root directory placed files land in.
    #[serde(default = "default_library_dir")]
    pub directory: PathBuf,
    #[serde(default)]
    pub paths: PathTemplates,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            database: default_library_db(),
            directory: default_library_dir(),
            paths: PathTemplates::default(),
        }
    }
}

fn default_library_db() -> PathBuf {
    PathBuf::from("library.db")
}

fn default_library_dir() -> PathBuf {
    PathBuf::from("music")
}

/// Destination path templates, relative to the library directory.
///
/// Supported fields: `$albumartist`, `$artist`, `$album`, `$title`,
/// `$track`, `$disc`, `$year`. The file extension is appended.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathTemplates {
    #[serde(default = "default_album_template")]
    pub album: String,
    #[serde(default = "default_singleton_template")]
    pub singleton: String,
}

impl Default for PathTemplates {
    fn default() -> Self {
        Self {
            album: default_album_template(),
            singleton: default_singleton_template(),
        }
    }
}

fn default_album_template() -> String {
    "$albumartist/$album/$track $title".to_string()
}

fn default_singleton_template() -> String {
    "Non-Album/$artist/$title".to_string()
}

/// How accepted files are written into the library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    #[default]
    Copy,
    Move,
    /// Leave files where they are; only the catalog is updated.
    None,
}

/// Import run configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Fully automated: never wait for an operator.
    #[serde(default)]
    pub quiet: bool,
    /// Run one worker per stage. When false, stages run inline.
    #[serde(default = "default_true")]
    pub concurrent: bool,
    /// Capacity of each inter-stage queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default)]
    pub mode: ImportMode,
    /// Import every file as a singleton instead of grouping albums.
    #[serde(default)]
    pub singletons: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            concurrent: true,
            queue_size: default_queue_size(),
            mode: ImportMode::default(),
            singletons: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_queue_size() -> usize {
    16
}

/// Thresholds that turn candidate distances into a recommendation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchConfig {
    #[serde(default = "default_strong_thresh")]
    pub strong_rec_thresh: f64,
    #[serde(default = "default_medium_thresh")]
    pub medium_rec_thresh: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            strong_rec_thresh: default_strong_thresh(),
            medium_rec_thresh: default_medium_thresh(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_strong_thresh() -> f64 {
    0.04
}

fn default_medium_thresh() -> f64 {
    0.25
}

fn default_max_candidates() -> usize {
    5
}

/// Event log configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// SQLite file for the event log; in-memory when unset.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default = "default_event_buffer")]
    pub buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            database: None,
            buffer_size: default_event_buffer(),
        }
    }
}

fn default_event_buffer() -> usize {
    1000
}

/// Config as exposed over the API (user agent contact details hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub import: ImportConfig,
    #[serde(rename = "match")]
    pub matching: MatchConfig,
    pub musicbrainz: SanitizedMusicBrainzConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMusicBrainzConfig {
    pub base_url: String,
    pub rate_limit_ms: u64,
    pub user_agent_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            library: config.library.clone(),
            import: config.import.clone(),
            matching: config.matching.clone(),
            musicbrainz: SanitizedMusicBrainzConfig {
                base_url: config.musicbrainz.base_url.clone(),
                rate_limit_ms: config.musicbrainz.rate_limit_ms,
                user_agent_configured: config.musicbrainz.user_agent.is_some(),
            },
        }
    }
}
