//! HTTP adapter for the remote document store.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::store::DocumentStore;
use crate::types::{Cursor, Document, DocumentRef, Event, IndexEntry, Page};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-request timeout. A timeout surfaces as a transient fetch error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Document store reached over HTTP with JSON pages.
///
/// Endpoints, relative to `base_url`:
///
/// * `GET /collections/{name}/documents?size=&after=`
/// * `GET /collections/{name}/events?from=&size=&after=`
/// * `GET /indexes/{index}/range?from=&size=&after=`
/// * `GET /collections/{name}/documents/{id}` (404 when the document is gone)
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    secret: Option<String>,
    page_size: usize,
}

impl HttpDocumentStore {
    /// Builds a client from the connection part of `config`.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Configuration(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret: config.secret.clone(),
            page_size: config.page_size,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn page_params(
        &self,
        from_ts: Option<i64>,
        cursor: Option<Cursor>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![("size", self.page_size.to_string())];
        if let Some(from_ts) = from_ts {
            params.push(("from", from_ts.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("after", cursor.0));
        }
        params
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        collection: &str,
        url: String,
        params: &[(&'static str, String)],
    ) -> Result<Option<T>> {
        let started = Instant::now();
        let mut request = self.client.get(&url).query(params);
        if let Some(secret) = &self.secret {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_error(collection, format!("GET {} failed", url), None, e))?;

        let status = response.status();
        debug!(
            "GET {} returned {} in {} ms",
            url,
            status,
            started.elapsed().as_millis()
        );
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(collection, &url, status));
        }

        let body = response.json::<T>().await.map_err(|e| {
            request_error(collection, format!("invalid body from {}", url), Some(status), e)
        })?;
        Ok(Some(body))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        collection: &str,
        url: String,
        params: Vec<(&'static str, String)>,
    ) -> Result<Page<T>> {
        match self.get_json::<Page<T>>(collection, url.clone(), &params).await? {
            Some(page) => Ok(page),
            None => Err(SyncError::Remote {
                collection: collection.to_string(),
                status: Some(StatusCode::NOT_FOUND.as_u16()),
                message: format!("GET {} returned 404", url),
            }),
        }
    }
}

/// Maps an unsuccessful status other than 404.
///
/// Request timeouts, throttling and server errors are transient. Any other
/// status means the store refused the request.
fn status_error(collection: &str, url: &str, status: StatusCode) -> SyncError {
    let message = format!("GET {} failed: HTTP {}", url, status);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        SyncError::transient(collection, message)
    } else {
        SyncError::Remote {
            collection: collection.to_string(),
            status: Some(status.as_u16()),
            message,
        }
    }
}

/// Maps a reqwest failure. Connection and timeout failures are transient.
fn request_error(
    collection: &str,
    context: String,
    status: Option<StatusCode>,
    e: reqwest::Error,
) -> SyncError {
    let message = format!("{}: {}", context, e);
    if e.is_connect() || e.is_timeout() || e.is_request() {
        return SyncError::transient(collection, message);
    }
    SyncError::Remote {
        collection: collection.to_string(),
        status: status.or(e.status()).map(|s| s.as_u16()),
        message,
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn documents_page(
        &self,
        collection: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<Document>> {
        let url = self.url(&format!("collections/{}/documents", collection));
        self.get_page(collection, url, self.page_params(None, cursor))
            .await
    }

    async fn change_feed_page(
        &self,
        collection: &str,
        from_ts: i64,
        cursor: Option<Cursor>,
    ) -> Result<Page<Event>> {
        let url = self.url(&format!("collections/{}/events", collection));
        self.get_page(collection, url, self.page_params(Some(from_ts), cursor))
            .await
    }

    async fn index_range_page(
        &self,
        collection: &str,
        index: &str,
        from_ts: i64,
        cursor: Option<Cursor>,
    ) -> Result<Page<IndexEntry>> {
        let url = self.url(&format!("indexes/{}/range", index));
        self.get_page(collection, url, self.page_params(Some(from_ts), cursor))
            .await
    }

    async fn resolve(&self, reference: &DocumentRef) -> Result<Option<Document>> {
        let url = self.url(&format!(
            "collections/{}/documents/{}",
            reference.collection, reference.id
        ));
        self.get_json(&reference.collection, url, &[]).await
    }
}
