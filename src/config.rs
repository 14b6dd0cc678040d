//! Sync configuration and startup validation.

use crate::error::{Result, SyncError};
use crate::types::CollectionDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Configuration for a sync run.
///
/// # Example
///
/// ```
/// use docsync::{CollectionDescriptor, SyncConfig};
///
/// let config = SyncConfig {
///     base_url: "https://db.example.com".to_string(),
///     collections: vec![CollectionDescriptor::new("posts", "posts_by_ts")],
///     ..SyncConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote document store.
    pub base_url: String,
    /// Bearer secret sent with every request, if any.
    pub secret: Option<String>,
    /// Directory holding one checkpoint file per collection (default: `".docsync"`).
    pub checkpoint_dir: String,
    /// Requested page size for paginated queries (default: 64).
    pub page_size: usize,
    /// Retries per collection per cycle after a transient failure (default: 1, at most 1).
    pub max_retries: usize,
    /// Delay before the retry, in milliseconds (default: 1000).
    pub retry_delay_ms: u64,
    /// Prefix of emitted type names and node ids (default: `"docsync"`).
    pub type_prefix: String,
    /// Collections to sync, in order.
    pub collections: Vec<CollectionDescriptor>,
}

/// Upper bound for `max_retries`.
pub const MAX_RETRIES_PER_CYCLE: usize = 1;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8443".to_string(),
            secret: None,
            checkpoint_dir: ".docsync".to_string(),
            page_size: 64,
            max_retries: 1,
            retry_delay_ms: 1_000,
            type_prefix: "docsync".to_string(),
            collections: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: SyncConfig = serde_json::from_str(&content).map_err(|e| {
            SyncError::Configuration(format!("invalid config {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Pause before the retry of a failed collection.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Checks the whole configuration, including its collection list.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SyncError::Configuration("base_url is empty".into()));
        }
        if self.page_size == 0 {
            return Err(SyncError::Configuration("page_size must be positive".into()));
        }
        if self.max_retries > MAX_RETRIES_PER_CYCLE {
            return Err(SyncError::Configuration(format!(
                "max_retries is {}, at most {} retry per cycle is allowed",
                self.max_retries, MAX_RETRIES_PER_CYCLE
            )));
        }
        if self.collections.is_empty() {
            return Err(SyncError::Configuration("no collections configured".into()));
        }
        validate_descriptors(&self.collections)
    }
}

/// Rejects descriptors with missing fields or duplicate names.
pub fn validate_descriptors(collections: &[CollectionDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for (position, descriptor) in collections.iter().enumerate() {
        if descriptor.name.trim().is_empty() {
            return Err(SyncError::Configuration(format!(
                "collection #{} has an empty name",
                position
            )));
        }
        if descriptor.change_feed_index.trim().is_empty() {
            return Err(SyncError::Configuration(format!(
                "collection '{}' has no change_feed_index",
                descriptor.name
            )));
        }
        if !seen.insert(descriptor.name.as_str()) {
            return Err(SyncError::Configuration(format!(
                "collection '{}' is listed twice",
                descriptor.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with(collections: Vec<CollectionDescriptor>) -> SyncConfig {
        SyncConfig {
            collections,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn accepts_well_formed_config() {
        let config = config_with(vec![
            CollectionDescriptor::new("posts", "posts_by_ts"),
            CollectionDescriptor::new("users", "users_by_ts"),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_missing_index_and_duplicates() {
        let missing = config_with(vec![CollectionDescriptor::new("posts", " ")]);
        assert!(matches!(missing.validate(), Err(SyncError::Configuration(_))));

        let duplicated = config_with(vec![
            CollectionDescriptor::new("posts", "a"),
            CollectionDescriptor::new("posts", "b"),
        ]);
        assert!(matches!(duplicated.validate(), Err(SyncError::Configuration(_))));

        assert!(config_with(vec![]).validate().is_err());
    }

    #[test]
    fn rejects_more_than_one_retry() {
        let config = SyncConfig {
            max_retries: 3,
            ..config_with(vec![CollectionDescriptor::new("posts", "posts_by_ts")])
        };
        assert!(matches!(config.validate(), Err(SyncError::Configuration(_))));
    }

    #[test]
    fn loads_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"base_url": "https://db.example.com",
                "collections": [{{"name": "posts", "change_feed_index": "posts_by_ts"}}]}}"#
        )
        .unwrap();

        let config = SyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_url, "https://db.example.com");
        assert_eq!(config.page_size, 64);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.collections.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unreadable_file_is_a_configuration_error() {
        let err = SyncConfig::from_file("/nonexistent/docsync.json").unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }
}
