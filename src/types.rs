//! Data structures shared by the fetchers, the merger and the checkpoint store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque continuation token returned by a paginated query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Cursor(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a paginated query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items of this page, in server order.
    pub data: Vec<T>,
    /// Cursor of the next page, absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Cursor>,
}

/// Reference to a document in some collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DocumentRef {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// A payload field: either a plain value or a reference into another collection.
///
/// The store adapter decides which one a field is when it resolves the
/// document; nothing downstream inspects values to guess.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Scalar(serde_json::Value),
    Reference(DocumentRef),
}

/// Document payload keyed by field name.
pub type Payload = BTreeMap<String, FieldValue>;

/// A document of a remote collection.
///
/// A document without payload is a tombstone and never appears in a merged
/// snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    /// Identifier, unique within its collection.
    pub identifier: String,
    /// Logical timestamp of the last write.
    pub timestamp: i64,
    /// Field values, `None` for a tombstone.
    pub payload: Option<Payload>,
}

impl Document {
    pub fn new(identifier: impl Into<String>, timestamp: i64, payload: Payload) -> Self {
        Document {
            identifier: identifier.into(),
            timestamp,
            payload: Some(payload),
        }
    }

    pub fn tombstone(identifier: impl Into<String>, timestamp: i64) -> Self {
        Document {
            identifier: identifier.into(),
            timestamp,
            payload: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    /// Cross-collection references held by the payload, in field order.
    pub fn references(&self) -> Vec<CrossReference> {
        let Some(payload) = &self.payload else {
            return Vec::new();
        };
        payload
            .iter()
            .filter_map(|(field, value)| match value {
                FieldValue::Reference(target) => Some(CrossReference {
                    field: field.clone(),
                    target_collection: target.collection.clone(),
                    target_identifier: target.id.clone(),
                }),
                FieldValue::Scalar(_) => None,
            })
            .collect()
    }
}

/// A payload field that points at a document of another collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CrossReference {
    pub field: String,
    pub target_collection: String,
    pub target_identifier: String,
}

/// Kind of change recorded by a collection's change feed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Remove,
}

/// Change-feed entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub action: Action,
    pub identifier: String,
    pub timestamp: i64,
}

/// Entry of a "by modification timestamp" index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub timestamp: i64,
    pub reference: DocumentRef,
}

/// Materialized state of one collection, keyed by document identifier.
pub type Snapshot = BTreeMap<String, Document>;

/// Persisted pairing of a watermark and the snapshot it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// Collection this checkpoint belongs to.
    pub collection: String,
    /// Highest timestamp incorporated into `snapshot`, `None` if never synced.
    pub watermark: Option<i64>,
    pub snapshot: Snapshot,
}

/// Identifies a remote collection and the index used for "updated since" queries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    pub name: String,
    /// Name of the remote index ordered by modification timestamp.
    pub change_feed_index: String,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, change_feed_index: impl Into<String>) -> Self {
        CollectionDescriptor {
            name: name.into(),
            change_feed_index: change_feed_index.into(),
        }
    }
}
