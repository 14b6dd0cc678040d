//! Docsync - Incremental, checkpointed sync of remote document collections
//!
//! This library mirrors paginated remote document collections into local
//! snapshots. The first cycle of a collection reads it in full; later cycles
//! read only what changed after the stored watermark and fold it into the
//! stored snapshot.
//!
//! # Features
//!
//! - **Checkpoints**: One atomic record per collection holding watermark and snapshot
//! - **Delta Fetching**: Removals and upserts scanned concurrently since the watermark
//! - **Pagination**: Cursor-driven page draining with no loss or duplication
//! - **Isolation**: Collections sync concurrently, a failing one never blocks the rest
//! - **Automatic Retry**: One retry per collection per cycle for transient failures
//!
//! # Example
//!
//! ```no_run
//! use docsync::{CollectionDescriptor, FileCheckpointStore, HttpDocumentStore, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig {
//!     base_url: "https://db.example.com".to_string(),
//!     collections: vec![CollectionDescriptor::new("posts", "posts_by_ts")],
//!     ..SyncConfig::default()
//! };
//! let engine = SyncEngine::new(
//!     Arc::new(HttpDocumentStore::new(&config)?),
//!     Arc::new(FileCheckpointStore::new(&config.checkpoint_dir)),
//!     config.clone(),
//! );
//!
//! let report = engine.sync(&config.collections).await?;
//! if let Some(posts) = report.get_snapshot("posts") {
//!     println!("{} posts", posts.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod delta;
pub mod emit;
pub mod error;
pub mod full;
pub mod http;
pub mod memory;
pub mod merge;
pub mod orchestrator;
pub mod paginate;
pub mod store;
pub mod types;

pub use checkpoint::{cache_key, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::SyncConfig;
pub use delta::{fetch_delta, DeltaFetch};
pub use emit::{EmittedDocument, EmittedReference, EmittedSnapshot};
pub use error::{Result, SyncError};
pub use full::{fetch_all, FullFetch};
pub use http::HttpDocumentStore;
pub use memory::MemoryDocumentStore;
pub use merge::merge;
pub use orchestrator::{CollectionOutcome, CollectionReport, FetchMode, SyncEngine, SyncReport};
pub use paginate::drain_all;
pub use store::DocumentStore;
pub use types::{
    Action, Checkpoint, CollectionDescriptor, CrossReference, Cursor, Document, DocumentRef, Event,
    FieldValue, IndexEntry, Page, Payload, Snapshot,
};
