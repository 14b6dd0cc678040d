//! In-memory document store with request tracing and failure injection.
//!
//! Backs the tests and local demos. Every request is recorded so callers can
//! assert how many round trips a sync cycle made.

use crate::error::{Result, SyncError};
use crate::store::DocumentStore;
use crate::types::{Action, Cursor, Document, DocumentRef, Event, IndexEntry, Page, Payload};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Record of a store request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    DocumentsPage { collection: String },
    ChangeFeedPage { collection: String, from_ts: i64 },
    IndexRangePage { index: String, from_ts: i64 },
    Resolve { reference: DocumentRef },
}

#[derive(Debug, Default)]
struct MemoryCollection {
    index: String,
    documents: BTreeMap<String, Document>,
    events: Vec<Event>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, MemoryCollection>,
    operations: Vec<StoreOp>,
    /// Remaining injected failures per collection, `None` fails forever.
    failures: HashMap<String, Option<usize>>,
    /// Documents `resolve` reports as gone while the index still lists them.
    vanishing: HashSet<DocumentRef>,
    clock: i64,
}

/// In-memory `DocumentStore`.
#[derive(Debug, Clone)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<State>>,
    page_size: usize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MemoryDocumentStore {
    /// Creates an empty store serving pages of at most `page_size` items.
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            page_size: page_size.max(1),
        }
    }

    /// Registers a collection and the index listing it by timestamp.
    pub fn create_collection(&self, name: &str, index: &str) {
        let mut state = self.state.lock().expect("lock");
        state.collections.insert(
            name.to_string(),
            MemoryCollection {
                index: index.to_string(),
                ..MemoryCollection::default()
            },
        );
    }

    /// Writes a document at the next clock tick and returns its timestamp.
    pub fn put(&self, collection: &str, id: &str, payload: Payload) -> i64 {
        let ts = self.state.lock().expect("lock").clock + 1;
        self.put_at(collection, Document::new(id, ts, payload));
        ts
    }

    /// Writes `document` with its own timestamp, recording a create or update event.
    ///
    /// A tombstoned `document` is stored as-is, modelling a store that returns
    /// a document without data.
    pub fn put_at(&self, collection: &str, document: Document) {
        let mut state = self.state.lock().expect("lock");
        state.clock = state.clock.max(document.timestamp);
        let target = state.collections.entry(collection.to_string()).or_default();
        let action = if target.documents.contains_key(&document.identifier) {
            Action::Update
        } else {
            Action::Create
        };
        target.events.push(Event {
            action,
            identifier: document.identifier.clone(),
            timestamp: document.timestamp,
        });
        target
            .documents
            .insert(document.identifier.clone(), document);
    }

    /// Removes a document at the next clock tick and returns the event timestamp.
    pub fn remove(&self, collection: &str, id: &str) -> i64 {
        let ts = self.state.lock().expect("lock").clock + 1;
        self.remove_at(collection, id, ts);
        ts
    }

    /// Removes a document, recording a remove event at `ts`.
    pub fn remove_at(&self, collection: &str, id: &str, ts: i64) {
        let mut state = self.state.lock().expect("lock");
        state.clock = state.clock.max(ts);
        let target = state.collections.entry(collection.to_string()).or_default();
        target.documents.remove(id);
        target.events.push(Event {
            action: Action::Remove,
            identifier: id.to_string(),
            timestamp: ts,
        });
    }

    /// Makes the next `count` requests touching `collection` fail transiently.
    pub fn fail_next(&self, collection: &str, count: usize) {
        let mut state = self.state.lock().expect("lock");
        state.failures.insert(collection.to_string(), Some(count));
    }

    /// Makes every request touching `collection` fail transiently.
    pub fn fail_always(&self, collection: &str) {
        let mut state = self.state.lock().expect("lock");
        state.failures.insert(collection.to_string(), None);
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().expect("lock").failures.clear();
    }

    /// Makes `resolve` return `None` for `id` while the index keeps listing it,
    /// as when the document is removed between an index read and its resolve.
    pub fn vanish_on_resolve(&self, collection: &str, id: &str) {
        let mut state = self.state.lock().expect("lock");
        state.vanishing.insert(DocumentRef::new(collection, id));
    }

    /// Returns all recorded requests.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.state.lock().expect("lock").operations.clone()
    }

    /// Clears recorded requests.
    pub fn clear_operations(&self) {
        self.state.lock().expect("lock").operations.clear();
    }

    fn begin(state: &mut State, collection: &str, op: StoreOp) -> Result<()> {
        state.operations.push(op);
        match state.failures.get_mut(collection) {
            Some(None) => Err(SyncError::transient(collection, "injected failure")),
            Some(Some(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(SyncError::transient(collection, "injected failure"))
            }
            _ => Ok(()),
        }
    }

    fn slice<T: Clone>(&self, items: &[T], cursor: Option<Cursor>) -> Result<Page<T>> {
        let offset = match cursor {
            Some(cursor) => cursor
                .as_str()
                .parse::<usize>()
                .map_err(|_| SyncError::Pagination(format!("unknown cursor '{}'", cursor)))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(items.len());
        let data = items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
        let after = (end < items.len()).then(|| Cursor::new(end.to_string()));
        Ok(Page { data, after })
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn documents_page(
        &self,
        collection: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Document>> {
        let mut state = self.state.lock().expect("lock");
        Self::begin(
            &mut state,
            collection,
            StoreOp::DocumentsPage {
                collection: collection.to_string(),
            },
        )?;
        let documents: Vec<Document> = state
            .collections
            .get(collection)
            .map(|c| c.documents.values().cloned().collect())
            .unwrap_or_default();
        self.slice(&documents, cursor)
    }

    async fn change_feed_page(
        &self,
        collection: &str,
        from_ts: i64,
        cursor: Option<Cursor>,
    ) -> Result<Page<Event>> {
        let mut state = self.state.lock().expect("lock");
        Self::begin(
            &mut state,
            collection,
            StoreOp::ChangeFeedPage {
                collection: collection.to_string(),
                from_ts,
            },
        )?;
        let mut events: Vec<Event> = state
            .collections
            .get(collection)
            .map(|c| {
                c.events
                    .iter()
                    .filter(|e| e.timestamp >= from_ts)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by_key(|e| e.timestamp);
        self.slice(&events, cursor)
    }

    async fn index_range_page(
        &self,
        collection: &str,
        index: &str,
        from_ts: i64,
        cursor: Option<Cursor>,
    ) -> Result<Page<IndexEntry>> {
        let mut state = self.state.lock().expect("lock");
        Self::begin(
            &mut state,
            collection,
            StoreOp::IndexRangePage {
                index: index.to_string(),
                from_ts,
            },
        )?;
        let mut entries: Vec<IndexEntry> = state
            .collections
            .get(collection)
            .filter(|c| c.index == index)
            .map(|c| {
                c.documents
                    .values()
                    .filter(|d| d.timestamp >= from_ts)
                    .map(|d| IndexEntry {
                        timestamp: d.timestamp,
                        reference: DocumentRef::new(collection, d.identifier.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            (a.timestamp, &a.reference.id).cmp(&(b.timestamp, &b.reference.id))
        });
        self.slice(&entries, cursor)
    }

    async fn resolve(&self, reference: &DocumentRef) -> Result<Option<Document>> {
        let mut state = self.state.lock().expect("lock");
        Self::begin(
            &mut state,
            &reference.collection,
            StoreOp::Resolve {
                reference: reference.clone(),
            },
        )?;
        if state.vanishing.contains(reference) {
            return Ok(None);
        }
        Ok(state
            .collections
            .get(&reference.collection)
            .and_then(|c| c.documents.get(&reference.id))
            .cloned())
    }
}
