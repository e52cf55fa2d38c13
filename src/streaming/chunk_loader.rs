//! World chunk loading
//!
//! Two caches: decoded tile geometry keyed by storage tile, and placed
//! [`WorldChunk`]s keyed by logical index. Chunks a tile period apart share
//! one fetch and one decode but never share placement or dirty state.

use std::sync::Arc;

use crate::core::config::LoaderConfig;
use crate::core::types::Result;
use crate::streaming::asset_loader::{AssetKind, AssetLoader};
use crate::streaming::cache::{KeyedCache, Loaded};
use crate::streaming::chunk_index::{ChunkIdentity, TILE_PERIOD};
use crate::streaming::fetch::Fetch;
use crate::streaming::offload::{DecodeFn, Offload};
use crate::voxel::chunk::{ChunkGeometry, WorldChunk, chunk_origin, decode_tile};

/// Enough to hold every distinct storage tile
pub const TILE_CACHE_CAPACITY: usize = (TILE_PERIOD * TILE_PERIOD) as usize;

/// `.vox` chunk tiles
pub struct TileKind;

impl AssetKind for TileKind {
    type Asset = ChunkGeometry;
    const NAME: &'static str = "chunk tile";
    const DECODE: DecodeFn<Vec<u8>, ChunkGeometry> = decode_tile;
}

/// Loads and caches world chunks by logical coordinate
#[derive(Clone)]
pub struct ChunkLoader {
    tiles: AssetLoader<TileKind>,
    chunks: KeyedCache<WorldChunk>,
}

impl ChunkLoader {
    /// `config.capacity` bounds placed chunks; tile geometry gets its own
    /// fixed-size cache.
    pub fn new(config: &LoaderConfig, fetcher: Arc<dyn Fetch>, offload: &impl Offload) -> Self {
        let tile_config = LoaderConfig {
            capacity: TILE_CACHE_CAPACITY,
            ..config.clone()
        };

        Self {
            tiles: AssetLoader::new(&tile_config, fetcher, offload),
            chunks: KeyedCache::new("world chunk", config.capacity),
        }
    }

    /// URL of the storage file backing `identity`
    pub fn url_for(&self, identity: ChunkIdentity) -> String {
        self.tiles.url_for(&identity.tile().file_name())
    }

    /// Load the chunk at `identity`
    ///
    /// # Arguments
    /// * `identity` - Logical chunk coordinate; any `i32` pair whose origin fits
    ///   in voxel space
    ///
    /// # Returns
    /// The placed chunk. `cached` reports whether the placed chunk was already
    /// ready; the underlying tile may have been cached even when it is false.
    ///
    /// # Errors
    /// [`Error::ChunkOutOfRange`](crate::core::error::Error::ChunkOutOfRange)
    /// before any fetch if the chunk cannot be placed, otherwise the tile's
    /// fetch or decode error.
    pub async fn load(&self, identity: ChunkIdentity) -> Result<Loaded<WorldChunk>> {
        chunk_origin(identity)?;
        let tiles = self.tiles.clone();

        self.chunks
            .get_or_load(&identity.index(), move || async move {
                let tile = identity.tile();
                let geometry = tiles.load(&tile.cache_key(), &tile.file_name()).await?;
                log::debug!(
                    "placing chunk {identity} from tile {}-{} (tile cached: {})",
                    tile.x,
                    tile.z,
                    geometry.cached
                );
                WorldChunk::new(identity, geometry.item)
            })
            .await
    }

    /// Load by canonical index string, e.g. `"3|-7"`
    pub async fn load_index(&self, index: &str) -> Result<Loaded<WorldChunk>> {
        self.load(index.parse()?).await
    }

    /// Ready chunk at `identity`, if any
    pub fn get(&self, identity: ChunkIdentity) -> Option<Arc<WorldChunk>> {
        self.chunks.get(&identity.index())
    }

    /// Whether the placed chunk is ready
    pub fn is_loaded(&self, identity: ChunkIdentity) -> bool {
        self.chunks.contains(&identity.index())
    }

    /// Drop a placed chunk; its tile geometry stays cached
    pub fn release(&self, identity: ChunkIdentity) -> bool {
        let released = self.chunks.invalidate(&identity.index());
        if released {
            log::debug!("released chunk {identity}");
        }
        released
    }

    /// Cache of placed chunks, keyed by index string
    pub fn chunks(&self) -> &KeyedCache<WorldChunk> {
        &self.chunks
    }

    /// Cache of decoded tile geometry, keyed by tile
    pub fn tiles(&self) -> &KeyedCache<ChunkGeometry> {
        self.tiles.cache()
    }

    pub fn tile_loader(&self) -> &AssetLoader<TileKind> {
        &self.tiles
    }
}
