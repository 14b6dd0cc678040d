//! Remote document store capability consumed by the fetchers.

use crate::error::Result;
use crate::types::{Cursor, Document, DocumentRef, Event, IndexEntry, Page};
use async_trait::async_trait;

/// Paginated read access to a remote document store.
///
/// Every `*_page` method issues exactly one request. Timestamps passed as
/// `from_ts` are inclusive lower bounds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One page of every document of `collection`, fully resolved.
    async fn documents_page(&self, collection: &str, cursor: Option<Cursor>)
        -> Result<Page<Document>>;

    /// One page of the change feed of `collection`, events with `timestamp >= from_ts`.
    async fn change_feed_page(
        &self,
        collection: &str,
        from_ts: i64,
        cursor: Option<Cursor>,
    ) -> Result<Page<Event>>;

    /// One page of `index`, entries with `timestamp >= from_ts` in ascending order.
    ///
    /// `collection` is the collection `index` lists, used to attribute failures.
    async fn index_range_page(
        &self,
        collection: &str,
        index: &str,
        from_ts: i64,
        cursor: Option<Cursor>,
    ) -> Result<Page<IndexEntry>>;

    /// Fetches a full document, `None` if it no longer exists.
    async fn resolve(&self, reference: &DocumentRef) -> Result<Option<Document>>;
}
