//! Candidate lookup against an external metadata service.
//!
//! The session only depends on the [`CandidateLookup`] trait. The bundled
//! implementation talks to MusicBrainz and scores results with the helpers
//! in [`distance`].

pub mod distance;
mod musicbrainz;

pub use musicbrainz::{MusicBrainzConfig, MusicBrainzLookup};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{Candidate, Item, Recommendation};

/// Errors that can occur when querying the lookup service.
#[derive(Debug, Error)]
pub enum LookupError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimited,

    /// Resource not found (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Service cannot be reached or is not configured.
    #[error("Lookup service unavailable: {0}")]
    Unavailable(String),
}

impl LookupError {
    /// Whether repeating the same query later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Http(_) | LookupError::RateLimited | LookupError::Unavailable(_) => true,
            LookupError::Api { status, .. } => *status >= 500,
            LookupError::NotFound(_) | LookupError::Parse(_) => false,
        }
    }
}

/// Overrides for a lookup. Empty fields fall back to the task's own tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupQuery {
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Service-specific ids (MusicBrainz release or recording ids).
    #[serde(default)]
    pub search_ids: Vec<String>,
}

impl LookupQuery {
    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            search_ids: ids,
            ..Default::default()
        }
    }

    pub fn by_name(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: Some(artist.into()),
            title: Some(title.into()),
            search_ids: Vec::new(),
        }
    }
}

/// Ranked candidates plus the verdict on the best one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub candidates: Vec<Candidate>,
    pub recommendation: Recommendation,
}

impl Proposal {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Source of ranked match candidates.
#[async_trait]
pub trait CandidateLookup: Send + Sync {
    /// Service name for logging and metrics.
    fn name(&self) -> &str;

    /// Find releases matching a group of items.
    async fn match_album(&self, items: &[Item], query: &LookupQuery)
        -> Result<Proposal, LookupError>;

    /// Find recordings matching a single item.
    async fn match_item(&self, item: &Item, query: &LookupQuery) -> Result<Proposal, LookupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(LookupError::RateLimited.is_retryable());
        assert!(LookupError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!LookupError::Api {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!LookupError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_query_constructors() {
        let q = LookupQuery::by_name("Low", "Words");
        assert_eq!(q.artist.as_deref(), Some("Low"));
        assert!(q.search_ids.is_empty());

        let q = LookupQuery::by_ids(vec!["abc".into()]);
        assert!(q.artist.is_none());
        assert_eq!(q.search_ids, vec!["abc"]);
    }
}
