//! Snapshots as handed to the build pipeline.

use crate::error::Result;
use crate::types::{Document, Payload, Snapshot};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Strips characters outside `[_a-zA-Z0-9]` and capitalizes the first letter.
pub fn sanitize_name(name: &str) -> String {
    let mut chars = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_');
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.collect::<String>(),
        None => String::new(),
    }
}

/// Type name under which the consumer registers a collection's documents.
pub fn type_name(prefix: &str, collection: &str) -> String {
    format!("{}{}", prefix, sanitize_name(collection))
}

/// Node id of a document, stable across cycles.
pub fn node_id(prefix: &str, collection: &str, identifier: &str) -> String {
    format!("{}-{}-{}", prefix, sanitize_name(collection), identifier)
}

/// A payload field that points at another collection's document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EmittedReference {
    pub field: String,
    pub target_collection: String,
    pub target_identifier: String,
    /// Node id of the target, for edge construction.
    pub target_node_id: String,
}

/// A live document with what the consumer needs to build a node from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmittedDocument {
    pub node_id: String,
    pub identifier: String,
    pub timestamp: i64,
    pub payload: Payload,
    /// MD5 hex digest of the payload's JSON encoding.
    pub content_digest: String,
    pub cross_references: Vec<EmittedReference>,
}

/// The snapshot of one collection after a cycle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmittedSnapshot {
    pub collection: String,
    pub type_name: String,
    pub watermark: Option<i64>,
    pub documents: BTreeMap<String, EmittedDocument>,
}

fn content_digest(payload: &Payload) -> Result<String> {
    let mut hasher = Md5::new();
    hasher.update(serde_json::to_vec(payload)?);
    Ok(format!("{:x}", hasher.finalize()))
}

fn emit_document(
    prefix: &str,
    collection: &str,
    document: &Document,
) -> Result<Option<EmittedDocument>> {
    let Some(payload) = &document.payload else {
        return Ok(None);
    };
    let cross_references = document
        .references()
        .into_iter()
        .map(|r| EmittedReference {
            target_node_id: node_id(prefix, &r.target_collection, &r.target_identifier),
            field: r.field,
            target_collection: r.target_collection,
            target_identifier: r.target_identifier,
        })
        .collect();

    Ok(Some(EmittedDocument {
        node_id: node_id(prefix, collection, &document.identifier),
        identifier: document.identifier.clone(),
        timestamp: document.timestamp,
        payload: payload.clone(),
        content_digest: content_digest(payload)?,
        cross_references,
    }))
}

impl EmittedSnapshot {
    /// Builds the consumer view of `snapshot`, leaving out any tombstone.
    pub fn build(
        prefix: &str,
        collection: &str,
        watermark: Option<i64>,
        snapshot: &Snapshot,
    ) -> Result<Self> {
        let mut documents = BTreeMap::new();
        for (identifier, document) in snapshot {
            if let Some(emitted) = emit_document(prefix, collection, document)? {
                documents.insert(identifier.clone(), emitted);
            }
        }
        Ok(Self {
            collection: collection.to_string(),
            type_name: type_name(prefix, collection),
            watermark,
            documents,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Writes `<type_name>.json` into `dir` and returns its path.
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", self.type_name));
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        info!(
            "Wrote {} documents of '{}' to {}",
            self.len(),
            self.collection,
            path.display()
        );
        Ok(path)
    }
}
