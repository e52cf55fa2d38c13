//! Generic fetch, decode and cache pipeline shared by every asset kind

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::LoaderConfig;
use crate::core::error::Error;
use crate::core::types::Result;
use crate::streaming::cache::{KeyedCache, Loaded};
use crate::streaming::fetch::Fetch;
use crate::streaming::offload::{DecodeFn, Offload, Offloaded};

/// How often and how patiently a fetch is retried
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure; the n-th retry waits `n * backoff`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.max_attempts, config.retry_backoff())
    }

    /// Wait before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Fetch `url`, retrying transient failures until the budget runs out
    pub async fn fetch(&self, fetcher: &dyn Fetch, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match fetcher.fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "fetch of {url} failed (attempt {attempt}/{}): {e}; retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(Error::LoadLimitExceeded {
                        url: url.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A kind of asset: what it decodes to and how
pub trait AssetKind: Send + Sync + 'static {
    type Asset: Send + Sync + 'static;

    /// Used for cache names and log lines
    const NAME: &'static str;

    /// Pure decoder, run through the offloader
    const DECODE: DecodeFn<Vec<u8>, Self::Asset>;
}

/// Join a base path or URL with a relative file path
pub fn join_url(base: &str, file: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        file.to_string()
    } else {
        format!("{base}/{file}")
    }
}

/// Fetches, decodes and caches one kind of asset
///
/// Cloning shares the cache and the decode worker.
pub struct AssetLoader<K: AssetKind> {
    cache: KeyedCache<K::Asset>,
    fetcher: Arc<dyn Fetch>,
    decode: Offloaded<Vec<u8>, K::Asset>,
    policy: RetryPolicy,
    base_url: String,
}

impl<K: AssetKind> Clone for AssetLoader<K> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            fetcher: Arc::clone(&self.fetcher),
            decode: self.decode.clone(),
            policy: self.policy,
            base_url: self.base_url.clone(),
        }
    }
}

impl<K: AssetKind> AssetLoader<K> {
    /// Create a loader for one asset kind
    ///
    /// # Arguments
    /// * `config` - Base URL, capacity and retry budget
    /// * `fetcher` - Transport for asset files
    /// * `offload` - Where decodes run; threaded offloaders bind one worker to `K::DECODE`
    pub fn new(config: &LoaderConfig, fetcher: Arc<dyn Fetch>, offload: &impl Offload) -> Self {
        Self {
            cache: KeyedCache::new(K::NAME, config.capacity),
            fetcher,
            decode: offload.offload(K::DECODE),
            policy: RetryPolicy::from_config(config),
            base_url: config.base_url.clone(),
        }
    }

    /// Full URL of a file under this loader's base
    pub fn url_for(&self, file: &str) -> String {
        join_url(&self.base_url, file)
    }

    /// Load the asset stored in `file`, cached under `key`
    ///
    /// # Arguments
    /// * `key` - Cache key; several keys may map to the same file
    /// * `file` - Path relative to the base URL
    ///
    /// # Errors
    /// [`Error::LoadLimitExceeded`](crate::core::error::Error::LoadLimitExceeded)
    /// once the retry budget runs out, or the first non-retryable fetch or decode
    /// error
    pub async fn load(&self, key: &str, file: &str) -> Result<Loaded<K::Asset>> {
        let url = self.url_for(file);
        let fetcher = Arc::clone(&self.fetcher);
        let decode = self.decode.clone();
        let policy = self.policy;

        self.cache
            .get_or_load(key, move || async move {
                let bytes = policy.fetch(fetcher.as_ref(), &url).await?;
                log::debug!("decoding {} ({} bytes) from {url}", K::NAME, bytes.len());
                decode.call(bytes).await
            })
            .await
    }

    pub fn cache(&self) -> &KeyedCache<K::Asset> {
        &self.cache
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether decodes run on a worker thread
    pub fn is_offloaded(&self) -> bool {
        self.decode.is_threaded()
    }
}
