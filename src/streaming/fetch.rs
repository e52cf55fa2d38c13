//! Byte fetching
//!
//! Loaders never talk to the network or disk directly; they go through a
//! [`Fetch`] implementation so transports can be swapped and tested.
//!
//! # Implementations
//!
//! - [`HttpFetcher`]: `reqwest` client for remote asset servers
//! - [`FileFetcher`]: local asset directories via `tokio::fs`
//! - [`MemoryFetcher`]: in-memory files with request counting, for tests and tools

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::core::error::Error;
use crate::core::types::Result;

/// Future returned by [`Fetch::fetch`]
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Source of raw asset bytes, addressed by URL or path
pub trait Fetch: Send + Sync {
    /// Fetch the full body at `url`
    ///
    /// Failures are [`Error::Fetch`]; `retryable` marks transient ones.
    fn fetch(&self, url: &str) -> FetchFuture<'_>;
}

fn fetch_error(url: &str, message: impl Into<String>, retryable: bool) -> Error {
    Error::Fetch {
        url: url.to_string(),
        message: message.into(),
        retryable,
    }
}

/// Whether `base` names a remote server rather than a local directory
pub fn is_remote(base: &str) -> bool {
    base.starts_with("http://") || base.starts_with("https://")
}

/// HTTP(S) fetcher
///
/// Transport failures and 5xx/408/429 responses are retryable; any other
/// non-success status is not.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Use an existing client
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        let url = url.to_string();
        Box::pin(async move {
            log::debug!("GET {url}");

            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| fetch_error(&url, e.to_string(), true))?;

            let status = response.status();
            if !status.is_success() {
                let retryable = status.is_server_error()
                    || status == reqwest::StatusCode::REQUEST_TIMEOUT
                    || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
                return Err(fetch_error(&url, format!("HTTP {status}"), retryable));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| fetch_error(&url, e.to_string(), true))?;
            Ok(body.to_vec())
        })
    }
}

/// Reads assets from the local filesystem; URLs are paths
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl Fetch for FileFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        let path = url.to_string();
        Box::pin(async move {
            tokio::fs::read(&path).await.map_err(|e| {
                let retryable = !matches!(
                    e.kind(),
                    ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
                );
                fetch_error(&path, e.to_string(), retryable)
            })
        })
    }
}

/// Local paths go to [`FileFetcher`], `http(s)://` URLs to [`HttpFetcher`]
#[derive(Clone, Debug)]
pub struct SchemeFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SchemeFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(timeout)?,
            file: FileFetcher,
        })
    }
}

impl Fetch for SchemeFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        if is_remote(url) {
            self.http.fetch(url)
        } else {
            self.file.fetch(url)
        }
    }
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: HashMap<String, Vec<u8>>,
    /// Remaining transient failures per URL
    failures: HashMap<String, u32>,
    requests: HashMap<String, usize>,
}

/// In-memory files
///
/// Counts every request and can be told to fail a URL transiently a number
/// of times before serving it.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    inner: Mutex<MemoryFiles>,
    latency: Option<Duration>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn files(&self) -> std::sync::MutexGuard<'_, MemoryFiles> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.files().files.insert(url.into(), bytes);
    }

    /// Fail the next `times` requests for `url` with a retryable error
    pub fn fail_transiently(&self, url: impl Into<String>, times: u32) {
        self.files().failures.insert(url.into(), times);
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.files().requests.get(url).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.files().requests.values().sum()
    }

    /// URLs requested at least once, sorted
    pub fn requested_urls(&self) -> Vec<String> {
        let mut urls: Vec<_> = self.files().requests.keys().cloned().collect();
        urls.sort();
        urls
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>> {
        let mut files = self.files();
        *files.requests.entry(url.to_string()).or_default() += 1;

        if let Some(remaining) = files.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(fetch_error(url, "connection reset", true));
            }
        }

        files
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| fetch_error(url, "not found", false))
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&self, url: &str) -> FetchFuture<'_> {
        let result = self.respond(url);
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_fetcher_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk-0-0.vox");
        std::fs::write(&path, b"VOX payload").unwrap();

        let bytes = FileFetcher.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, b"VOX payload");
    }

    #[tokio::test]
    async fn test_file_fetcher_missing_file_not_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.vox");

        let err = FileFetcher.fetch(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { retryable: false, .. }));
    }

    #[tokio::test]
    async fn test_memory_fetcher_counts_and_fails() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("a", vec![1, 2, 3]);
        fetcher.fail_transiently("a", 2);

        for _ in 0..2 {
            let err = fetcher.fetch("a").await.unwrap_err();
            assert!(err.is_retryable());
        }
        assert_eq!(fetcher.fetch("a").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(fetcher.request_count("a"), 3);

        let missing = fetcher.fetch("b").await.unwrap_err();
        assert!(!missing.is_retryable());
        assert_eq!(fetcher.requested_urls(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(fetcher.total_requests(), 4);
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://cdn.example.com/chunks"));
        assert!(is_remote("http://localhost:8080"));
        assert!(!is_remote("assets/chunks"));
        assert!(!is_remote("/var/lib/assets"));
    }

    #[tokio::test]
    async fn test_scheme_fetcher_routes_local_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{}").unwrap();

        let fetcher = SchemeFetcher::new(Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.fetch(path.to_str().unwrap()).await.unwrap(), b"{}");
    }
}
