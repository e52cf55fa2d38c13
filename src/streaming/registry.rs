//! One loader per asset kind, built once at startup and passed around

use std::sync::Arc;

use crate::core::config::StreamingConfig;
use crate::core::types::Result;
use crate::streaming::cache::CacheStats;
use crate::streaming::chunk_loader::ChunkLoader;
use crate::streaming::fetch::{Fetch, SchemeFetcher};
use crate::streaming::model_loader::SkinnedObjectLoader;
use crate::streaming::offload::Offloader;

/// Snapshot of every cache in a registry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub chunks: CacheStats,
    pub tiles: CacheStats,
    pub models: CacheStats,
}

/// Shared asset loaders
///
/// Clones are cheap handles to the same caches and decode workers.
#[derive(Clone)]
pub struct AssetRegistry {
    chunks: ChunkLoader,
    models: SkinnedObjectLoader,
    offloader: Arc<Offloader>,
    config: Arc<StreamingConfig>,
}

impl AssetRegistry {
    /// Build with the default transports: files for local bases, HTTP for URLs
    pub fn from_config(config: StreamingConfig) -> Result<Self> {
        let fetcher: Arc<dyn Fetch> = Arc::new(SchemeFetcher::new(config.fetch_timeout())?);
        let offloader = Offloader::from_mode(config.offload);
        Ok(Self::with_fetcher(config, fetcher, offloader))
    }

    pub fn with_fetcher(config: StreamingConfig, fetcher: Arc<dyn Fetch>, offloader: Offloader) -> Self {
        let chunks = ChunkLoader::new(&config.chunks, Arc::clone(&fetcher), &offloader);
        let models = SkinnedObjectLoader::new(&config.models, fetcher, &offloader);

        log::info!(
            "asset registry ready: chunks from {} (capacity {}), models from {} (capacity {}), {} decode workers",
            config.chunks.base_url,
            config.chunks.capacity,
            config.models.base_url,
            config.models.capacity,
            offloader.worker_count()
        );

        Self {
            chunks,
            models,
            offloader: Arc::new(offloader),
            config: Arc::new(config),
        }
    }

    pub fn chunks(&self) -> &ChunkLoader {
        &self.chunks
    }

    pub fn models(&self) -> &SkinnedObjectLoader {
        &self.models
    }

    pub fn offloader(&self) -> &Offloader {
        &self.offloader
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            chunks: self.chunks.chunks().stats(),
            tiles: self.chunks.tiles().stats(),
            models: self.models.cache().stats(),
        }
    }
}
