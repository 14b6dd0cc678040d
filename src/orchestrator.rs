//! Main orchestration logic for syncing collections.

use crate::checkpoint::CheckpointStore;
use crate::config::{validate_descriptors, SyncConfig, MAX_RETRIES_PER_CYCLE};
use crate::delta::fetch_delta;
use crate::emit::EmittedSnapshot;
use crate::error::{Result, SyncError};
use crate::full::fetch_all;
use crate::store::DocumentStore;
use crate::types::{Checkpoint, CollectionDescriptor};
use futures_util::future::join_all;
use indicatif::ProgressBar;
use std::sync::Arc;
use tokio_retry2::{Retry, RetryError};
use tracing::{error, info, warn};

/// How a collection was fetched in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// No usable checkpoint, the whole collection was read.
    Full,
    /// Only changes after the checkpoint's watermark were read.
    Delta,
}

/// Outcome of one collection's pipeline.
#[derive(Debug, Clone)]
pub enum CollectionOutcome {
    Synced {
        mode: FetchMode,
        snapshot: EmittedSnapshot,
        /// Whether a new checkpoint was persisted.
        checkpoint_written: bool,
    },
    Failed {
        error: String,
        /// Snapshot of the untouched checkpoint, if it could be read.
        stale: Option<EmittedSnapshot>,
    },
}

#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub collection: String,
    pub outcome: CollectionOutcome,
}

/// Result of a sync cycle over all requested collections, in request order.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub collections: Vec<CollectionReport>,
}

impl SyncReport {
    /// Fresh snapshot of `collection`, `None` if it was not synced this cycle.
    pub fn get_snapshot(&self, collection: &str) -> Option<&EmittedSnapshot> {
        self.collections
            .iter()
            .find(|r| r.collection == collection)
            .and_then(|r| match &r.outcome {
                CollectionOutcome::Synced { snapshot, .. } => Some(snapshot),
                CollectionOutcome::Failed { .. } => None,
            })
    }

    pub fn outcome(&self, collection: &str) -> Option<&CollectionOutcome> {
        self.collections
            .iter()
            .find(|r| r.collection == collection)
            .map(|r| &r.outcome)
    }

    /// Reports of collections whose pipeline failed.
    pub fn failures(&self) -> Vec<&CollectionReport> {
        self.collections
            .iter()
            .filter(|r| matches!(r.outcome, CollectionOutcome::Failed { .. }))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }
}

struct PipelineResult {
    mode: FetchMode,
    snapshot: EmittedSnapshot,
    checkpoint_written: bool,
}

/// Drives one sync cycle per call over a set of collections.
///
/// Each collection runs its own pipeline: read checkpoint, fetch (full or
/// delta), merge, persist, emit. Pipelines share no mutable state and run
/// concurrently; a failing one never affects the others.
///
/// # Example
///
/// ```no_run
/// use docsync::{FileCheckpointStore, HttpDocumentStore, SyncConfig, SyncEngine};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SyncConfig::from_file("docsync.json")?;
/// config.validate()?;
/// let store = Arc::new(HttpDocumentStore::new(&config)?);
/// let checkpoints = Arc::new(FileCheckpointStore::new(&config.checkpoint_dir));
/// let collections = config.collections.clone();
///
/// let engine = SyncEngine::new(store, checkpoints, config);
/// let report = engine.sync(&collections).await?;
/// println!("{} collections failed", report.failures().len());
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    checkpoints: Arc<C>,
    config: SyncConfig,
    progress: ProgressBar,
}

impl<S, C> SyncEngine<S, C>
where
    S: DocumentStore + ?Sized,
    C: CheckpointStore + ?Sized,
{
    pub fn new(store: Arc<S>, checkpoints: Arc<C>, config: SyncConfig) -> Self {
        Self {
            store,
            checkpoints,
            config,
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports per-collection progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Runs one sync cycle over `collections`.
    ///
    /// Only configuration problems fail the whole call, and they are detected
    /// before any fetch starts. Fetch failures are reported per collection.
    pub async fn sync(&self, collections: &[CollectionDescriptor]) -> Result<SyncReport> {
        validate_descriptors(collections)?;
        if self.config.max_retries > MAX_RETRIES_PER_CYCLE {
            return Err(SyncError::Configuration(format!(
                "max_retries is {}, at most {} retry per cycle is allowed",
                self.config.max_retries, MAX_RETRIES_PER_CYCLE
            )));
        }

        self.progress.set_length(collections.len() as u64);
        self.progress.set_message(format!("Syncing {} collection(s)", collections.len()));

        let reports = join_all(collections.iter().map(|c| self.sync_collection(c))).await;
        let report = SyncReport {
            collections: reports,
        };

        let failed = report.failures().len();
        if failed == 0 {
            self.progress.finish_with_message("All collections synced");
        } else {
            self.progress.finish_with_message(format!("{} collection(s) failed", failed));
        }
        info!(
            "Sync cycle finished: {} synced, {} failed",
            report.collections.len() - failed,
            failed
        );
        Ok(report)
    }

    /// Runs the pipeline of `collection`, retrying transient failures up to `max_retries` times.
    async fn sync_collection(&self, collection: &CollectionDescriptor) -> CollectionReport {
        let retry_strategy = tokio_retry2::strategy::FixedInterval::new(self.config.retry_delay())
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, move || async move {
            match self.run_pipeline(collection).await {
                Ok(result) => Ok(result),
                Err(e) if e.is_transient() => {
                    warn!("Sync of '{}' failed: {}", collection.name, e);
                    RetryError::to_transient(e)
                }
                Err(e) => RetryError::to_permanent(e),
            }
        })
        .await;

        self.progress.inc(1);
        let outcome = match result {
            Ok(result) => {
                self.progress.set_message(format!("Synced: {}", collection.name));
                CollectionOutcome::Synced {
                    mode: result.mode,
                    snapshot: result.snapshot,
                    checkpoint_written: result.checkpoint_written,
                }
            }
            Err(e) => {
                error!("Giving up on collection '{}' this cycle: {}", collection.name, e);
                self.progress.set_message(format!("Failed: {}", collection.name));
                CollectionOutcome::Failed {
                    error: e.to_string(),
                    stale: self.stale_snapshot(collection).await,
                }
            }
        };

        CollectionReport {
            collection: collection.name.clone(),
            outcome,
        }
    }

    async fn load_checkpoint(
        &self,
        collection: &CollectionDescriptor,
    ) -> Result<Option<Checkpoint>> {
        match self.checkpoints.load(&collection.name).await {
            Ok(checkpoint) => Ok(checkpoint),
            Err(e @ SyncError::CheckpointCorrupt { .. }) => {
                warn!("{}; refetching collection '{}' in full", e, collection.name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn run_pipeline(&self, collection: &CollectionDescriptor) -> Result<PipelineResult> {
        let prior = self.load_checkpoint(collection).await?;
        let prior_watermark = prior.as_ref().and_then(|c| c.watermark);

        let (mode, watermark, snapshot) = match prior {
            Some(Checkpoint {
                watermark: Some(since),
                snapshot,
                ..
            }) => {
                let delta = fetch_delta(&*self.store, collection, since, &snapshot).await?;
                (FetchMode::Delta, Some(delta.watermark), delta.snapshot)
            }
            _ => {
                let full = fetch_all(&*self.store, collection).await?;
                (FetchMode::Full, full.watermark, full.snapshot)
            }
        };

        // An empty collection has no watermark and is fetched in full again next cycle.
        let checkpoint_written = watermark.is_some() && watermark != prior_watermark;
        if checkpoint_written {
            self.checkpoints
                .save(&Checkpoint {
                    collection: collection.name.clone(),
                    watermark,
                    snapshot: snapshot.clone(),
                })
                .await?;
        } else {
            info!(
                "Collection '{}' unchanged at watermark {:?}, checkpoint kept",
                collection.name, watermark
            );
        }

        let snapshot = EmittedSnapshot::build(
            &self.config.type_prefix,
            &collection.name,
            watermark,
            &snapshot,
        )?;
        Ok(PipelineResult {
            mode,
            snapshot,
            checkpoint_written,
        })
    }

    async fn stale_snapshot(&self, collection: &CollectionDescriptor) -> Option<EmittedSnapshot> {
        let checkpoint = self.checkpoints.load(&collection.name).await.ok()??;
        EmittedSnapshot::build(
            &self.config.type_prefix,
            &collection.name,
            checkpoint.watermark,
            &checkpoint.snapshot,
        )
        .ok()
    }
}
