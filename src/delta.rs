//! Delta fetch since a prior watermark.

use crate::error::{Result, SyncError};
use crate::merge::merge;
use crate::paginate::drain_all;
use crate::store::DocumentStore;
use crate::types::{Action, CollectionDescriptor, Document, Page, Snapshot};
use futures_util::future::try_join_all;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Result of a delta fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaFetch {
    /// New watermark, never lower than the prior one.
    pub watermark: i64,
    /// Identifiers removed since the prior watermark.
    pub deleted: BTreeSet<String>,
    /// Documents created or updated since the prior watermark, ascending by timestamp.
    pub upserted: Vec<Document>,
    /// Prior snapshot with `deleted` and `upserted` applied.
    pub snapshot: Snapshot,
}

impl DeltaFetch {
    /// Whether nothing changed since the prior watermark.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.upserted.is_empty()
    }
}

/// Scans the change feed for removals after `since`.
async fn fetch_deleted<S>(
    store: &S,
    collection: &CollectionDescriptor,
    since: i64,
) -> Result<(Option<i64>, BTreeSet<String>)>
where
    S: DocumentStore + ?Sized,
{
    let name = collection.name.as_str();
    let from_ts = since.saturating_add(1);
    let events = drain_all(|cursor| store.change_feed_page(name, from_ts, cursor), None).await?;

    let mut latest = None;
    let mut deleted = BTreeSet::new();
    for event in events {
        if event.action != Action::Remove || event.timestamp <= since {
            continue;
        }
        latest = latest.max(Some(event.timestamp));
        deleted.insert(event.identifier);
    }
    debug!(
        "Collection '{}': {} removals since {}",
        collection.name,
        deleted.len(),
        since
    );
    Ok((latest, deleted))
}

/// Scans the timestamp index after `since` and resolves each entry.
///
/// Entries of one page are resolved concurrently; pages are requested one
/// after another as part of the same drain.
async fn fetch_upserted<S>(
    store: &S,
    collection: &CollectionDescriptor,
    since: i64,
) -> Result<(Option<i64>, Vec<Document>)>
where
    S: DocumentStore + ?Sized,
{
    let name = collection.name.as_str();
    let index = collection.change_feed_index.as_str();
    let from_ts = since.saturating_add(1);
    let pages = drain_all(
        move |cursor| async move {
            let page = store.index_range_page(name, index, from_ts, cursor).await?;
            let resolved = try_join_all(page.data.iter().map(move |entry| async move {
                let document = store.resolve(&entry.reference).await?;
                Ok::<_, SyncError>((entry.timestamp, entry.reference.id.clone(), document))
            }))
            .await?;
            Ok(Page {
                data: resolved,
                after: page.after,
            })
        },
        None,
    )
    .await?;

    let mut latest = None;
    let mut upserted = Vec::with_capacity(pages.len());
    for (entry_ts, identifier, document) in pages {
        if entry_ts <= since {
            continue;
        }
        latest = latest.max(Some(entry_ts));
        match document {
            Some(document) => {
                latest = latest.max(Some(document.timestamp));
                if document.is_tombstone() {
                    let malformed = SyncError::MalformedDocument {
                        collection: collection.name.clone(),
                        identifier: document.identifier.clone(),
                    };
                    warn!("Dropping document from snapshot: {}", malformed);
                }
                upserted.push(document);
            }
            None => {
                warn!(
                    "Document '{}' of collection '{}' vanished before it could be resolved",
                    identifier, collection.name
                );
            }
        }
    }
    debug!(
        "Collection '{}': {} upserts since {}",
        collection.name,
        upserted.len(),
        since
    );
    Ok((latest, upserted))
}

/// Fetches what changed in `collection` after `prior_watermark` and merges it into `prior`.
///
/// The removal scan and the upsert scan run concurrently; a failure of
/// either aborts the whole fetch.
///
/// # Arguments
///
/// * `store` - Remote document store
/// * `collection` - Collection to fetch
/// * `prior_watermark` - Watermark of the stored checkpoint
/// * `prior` - Snapshot of the stored checkpoint
///
/// # Returns
///
/// The delta, the merged snapshot and the new watermark.
pub async fn fetch_delta<S>(
    store: &S,
    collection: &CollectionDescriptor,
    prior_watermark: i64,
    prior: &Snapshot,
) -> Result<DeltaFetch>
where
    S: DocumentStore + ?Sized,
{
    info!(
        "Fetching changes since {} for collection '{}'",
        prior_watermark, collection.name
    );

    let ((deleted_ts, deleted), (upserted_ts, upserted)) = tokio::try_join!(
        fetch_deleted(store, collection, prior_watermark),
        fetch_upserted(store, collection, prior_watermark),
    )?;

    let watermark = [Some(prior_watermark), deleted_ts, upserted_ts]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(prior_watermark);

    let snapshot = merge(prior, &deleted, &upserted);
    info!(
        "Collection '{}': {} deleted, {} upserted, watermark {} -> {}",
        collection.name,
        deleted.len(),
        upserted.len(),
        prior_watermark,
        watermark
    );

    Ok(DeltaFetch {
        watermark,
        deleted,
        upserted,
        snapshot,
    })
}
