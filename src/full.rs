//! Full fetch of a collection that has never been synced.

use crate::error::{Result, SyncError};
use crate::paginate::drain_all;
use crate::store::DocumentStore;
use crate::types::{CollectionDescriptor, Snapshot};
use tracing::{info, warn};

/// Result of a full fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FullFetch {
    /// Highest timestamp observed, `None` for an empty collection.
    pub watermark: Option<i64>,
    pub snapshot: Snapshot,
    /// Identifiers returned without payload and left out of the snapshot.
    pub skipped: Vec<String>,
}

/// Retrieves every document of `collection`.
///
/// Documents without payload are skipped one by one and logged; the rest of
/// the page is still processed. Their timestamps still count towards the
/// watermark.
pub async fn fetch_all<S>(store: &S, collection: &CollectionDescriptor) -> Result<FullFetch>
where
    S: DocumentStore + ?Sized,
{
    info!(
        "No checkpoint for collection '{}', fetching all documents",
        collection.name
    );
    let name = collection.name.as_str();
    let documents = drain_all(|cursor| store.documents_page(name, cursor), None).await?;

    let mut watermark: Option<i64> = None;
    let mut snapshot = Snapshot::new();
    let mut skipped = Vec::new();

    for document in documents {
        watermark = Some(watermark.map_or(document.timestamp, |w| w.max(document.timestamp)));

        if document.is_tombstone() {
            let malformed = SyncError::MalformedDocument {
                collection: collection.name.clone(),
                identifier: document.identifier.clone(),
            };
            warn!("Skipping document: {}", malformed);
            skipped.push(document.identifier);
            continue;
        }

        snapshot.insert(document.identifier.clone(), document);
    }

    info!(
        "Fetched {} documents for collection '{}' (watermark: {:?})",
        snapshot.len(),
        collection.name,
        watermark
    );
    Ok(FullFetch {
        watermark,
        snapshot,
        skipped,
    })
}
