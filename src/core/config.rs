//! Streaming configuration
//!
//! Loaded from a JSON file at startup; every field has a default so a partial
//! file (or no file at all) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Which decode backend to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffloadMode {
    /// Worker threads if the platform reports more than one core, inline otherwise
    #[default]
    Auto,
    /// Always decode on a dedicated worker thread
    Thread,
    /// Always decode on the calling task
    Inline,
}

/// Per asset kind loader settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// URL or directory prefix that file names are appended to
    pub base_url: String,
    /// Maximum number of decoded assets kept in memory
    pub capacity: usize,
    /// Fetch attempts per load before giving up
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly with each retry
    pub retry_backoff_ms: u64,
}

impl LoaderConfig {
    /// Defaults for world chunks
    pub fn chunks() -> Self {
        Self {
            base_url: "assets/chunks".to_string(),
            capacity: 500,
            max_attempts: 5,
            retry_backoff_ms: 50,
        }
    }

    /// Defaults for skinned character models
    pub fn models() -> Self {
        Self {
            base_url: "assets/models".to_string(),
            capacity: 100,
            max_attempts: 15,
            retry_backoff_ms: 50,
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// A loader section as written in the file; absent fields fall back to the
/// kind's defaults
#[derive(Deserialize)]
struct LoaderSection {
    base_url: Option<String>,
    capacity: Option<usize>,
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

impl LoaderSection {
    fn over(self, defaults: LoaderConfig) -> LoaderConfig {
        LoaderConfig {
            base_url: self.base_url.unwrap_or(defaults.base_url),
            capacity: self.capacity.unwrap_or(defaults.capacity),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            retry_backoff_ms: self.retry_backoff_ms.unwrap_or(defaults.retry_backoff_ms),
        }
    }
}

fn chunks_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<LoaderConfig, D::Error> {
    LoaderSection::deserialize(d).map(|s| s.over(LoaderConfig::chunks()))
}

fn models_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<LoaderConfig, D::Error> {
    LoaderSection::deserialize(d).map(|s| s.over(LoaderConfig::models()))
}

/// Top level configuration for the asset registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    #[serde(deserialize_with = "chunks_section")]
    pub chunks: LoaderConfig,
    #[serde(deserialize_with = "models_section")]
    pub models: LoaderConfig,
    pub offload: OffloadMode,
    /// Per request timeout for HTTP fetches
    pub fetch_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunks: LoaderConfig::chunks(),
            models: LoaderConfig::models(),
            offload: OffloadMode::Auto,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl StreamingConfig {
    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file (sync)
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        for (name, loader) in [("chunks", &self.chunks), ("models", &self.models)] {
            if loader.capacity == 0 {
                return Err(Error::Config(format!("{name}.capacity must be at least 1")));
            }
            if loader.max_attempts == 0 {
                return Err(Error::Config(format!("{name}.max_attempts must be at least 1")));
            }
        }
        Ok(())
    }
}
