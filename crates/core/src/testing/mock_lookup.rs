//! Mock candidate lookup for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::lookup::{CandidateLookup, LookupError, LookupQuery, Proposal};
use crate::task::Item;

/// A recorded lookup for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedLookup {
    /// `"album"` or `"item"`.
    pub kind: &'static str,
    /// Album name for album lookups, title for item lookups.
    pub key: String,
    pub query: LookupQuery,
}

/// Mock implementation of the CandidateLookup trait.
///
/// Proposals are picked, in order, by the first search id of the query, by
/// album name (album lookups) or title (item lookups), and finally the
/// default proposal, which starts out empty.
///
/// # Example
///
/// ```rust,ignore
/// use webimport_core::testing::{fixtures, MockLookup};
///
/// let lookup = MockLookup::new();
/// lookup
///     .set_album_proposal("Secret Name", fixtures::proposal(vec![/* ... */], Recommendation::Strong))
///     .await;
/// ```
#[derive(Default)]
pub struct MockLookup {
    by_id: Arc<RwLock<HashMap<String, Proposal>>>,
    by_album: Arc<RwLock<HashMap<String, Proposal>>>,
    by_title: Arc<RwLock<HashMap<String, Proposal>>>,
    default: Arc<RwLock<Proposal>>,
    lookups: Arc<RwLock<Vec<RecordedLookup>>>,
    /// If set, the next lookup will fail with this error.
    next_error: Arc<RwLock<Option<LookupError>>>,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_default(&self, proposal: Proposal) {
        *self.default.write().await = proposal;
    }

    pub async fn set_id_proposal(&self, id: &str, proposal: Proposal) {
        self.by_id.write().await.insert(id.to_string(), proposal);
    }

    pub async fn set_album_proposal(&self, album: &str, proposal: Proposal) {
        self.by_album.write().await.insert(album.to_string(), proposal);
    }

    pub async fn set_item_proposal(&self, title: &str, proposal: Proposal) {
        self.by_title.write().await.insert(title.to_string(), proposal);
    }

    /// Configure the next lookup to fail with the given error.
    pub async fn set_next_error(&self, error: LookupError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn recorded_lookups(&self) -> Vec<RecordedLookup> {
        self.lookups.read().await.clone()
    }

    pub async fn lookup_count(&self) -> usize {
        self.lookups.read().await.len()
    }

    async fn respond(
        &self,
        kind: &'static str,
        key: String,
        query: &LookupQuery,
        table: &RwLock<HashMap<String, Proposal>>,
    ) -> Result<Proposal, LookupError> {
        self.lookups.write().await.push(RecordedLookup {
            kind,
            key: key.clone(),
            query: query.clone(),
        });

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        if let Some(id) = query.search_ids.first() {
            return Ok(self.by_id.read().await.get(id).cloned().unwrap_or_default());
        }
        let key = query.title.clone().unwrap_or(key);
        if let Some(proposal) = table.read().await.get(&key) {
            return Ok(proposal.clone());
        }
        Ok(self.default.read().await.clone())
    }
}

#[async_trait]
impl CandidateLookup for MockLookup {
    fn name(&self) -> &str {
        "mock"
    }

    async fn match_album(
        &self,
        items: &[Item],
        query: &LookupQuery,
    ) -> Result<Proposal, LookupError> {
        let album = items.first().map(|i| i.album.clone()).unwrap_or_default();
        self.respond("album", album, query, &self.by_album).await
    }

    async fn match_item(&self, item: &Item, query: &LookupQuery) -> Result<Proposal, LookupError> {
        self.respond("item", item.title.clone(), query, &self.by_title)
            .await
    }
}
