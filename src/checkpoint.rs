//! Checkpoint persistence.
//!
//! One record per collection, stored under [`cache_key`] as
//! `{"timestamp": <watermark>, "data": {<identifier>: <document>}}`.

use crate::error::{Result, SyncError};
use crate::types::{Checkpoint, Snapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Stable cache key of a collection's checkpoint.
pub fn cache_key(collection: &str) -> String {
    format!("docsync-{}", collection)
}

/// Serialized form of a checkpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub timestamp: Option<i64>,
    pub data: Snapshot,
}

impl CheckpointRecord {
    fn into_checkpoint(self, collection: &str) -> Checkpoint {
        Checkpoint {
            collection: collection.to_string(),
            watermark: self.timestamp,
            snapshot: self.data,
        }
    }
}

impl From<&Checkpoint> for CheckpointRecord {
    fn from(checkpoint: &Checkpoint) -> Self {
        CheckpointRecord {
            timestamp: checkpoint.watermark,
            data: checkpoint.snapshot.clone(),
        }
    }
}

fn parse_record(key: &str, bytes: &[u8]) -> Result<CheckpointRecord> {
    serde_json::from_slice(bytes).map_err(|e| SyncError::CheckpointCorrupt {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Per-collection checkpoint persistence.
///
/// `save` must be atomic: after a crash either the old or the new record is
/// visible, never a partial one.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Loads the checkpoint of `collection`, `None` if there is none.
    ///
    /// A record that exists but cannot be parsed yields
    /// [`SyncError::CheckpointCorrupt`].
    async fn load(&self, collection: &str) -> Result<Option<Checkpoint>>;

    /// Replaces the checkpoint of `checkpoint.collection`.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
}

/// Checkpoints stored as JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record for `collection`.
    pub fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(collection)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, collection: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(collection);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = parse_record(&cache_key(collection), &bytes)?;
        debug!("Loaded checkpoint from {}", path.display());
        Ok(Some(record.into_checkpoint(collection)))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&checkpoint.collection);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&CheckpointRecord::from(checkpoint))?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        info!(
            "Persisted checkpoint for '{}' (watermark: {:?}) to {}",
            checkpoint.collection,
            checkpoint.watermark,
            path.display()
        );
        Ok(())
    }
}

/// In-memory checkpoint store that keeps serialized records.
///
/// Records go through the same JSON encoding as [`FileCheckpointStore`], so
/// corrupt records can be seeded with [`MemoryCheckpointStore::put_raw`].
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    records: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under the key of `collection`.
    pub fn put_raw(&self, collection: &str, bytes: impl Into<Vec<u8>>) {
        self.records
            .lock()
            .expect("lock")
            .insert(cache_key(collection), bytes.into());
    }

    /// Collections written through `save`, in write order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, collection: &str) -> Result<Option<Checkpoint>> {
        let key = cache_key(collection);
        let bytes = self.records.lock().expect("lock").get(&key).cloned();
        match bytes {
            Some(bytes) => Ok(Some(parse_record(&key, &bytes)?.into_checkpoint(collection))),
            None => Ok(None),
        }
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes = serde_json::to_vec(&CheckpointRecord::from(checkpoint))?;
        self.records
            .lock()
            .expect("lock")
            .insert(cache_key(&checkpoint.collection), bytes);
        self.writes
            .lock()
            .expect("lock")
            .push(checkpoint.collection.clone());
        Ok(())
    }
}
