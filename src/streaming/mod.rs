//! Asset streaming: fetch, decode off-thread, cache

pub mod chunk_index;
pub mod lru;
pub mod cache;
pub mod offload;
pub mod fetch;
pub mod asset_loader;
pub mod chunk_loader;
pub mod model_loader;
pub mod registry;

pub use chunk_index::{ChunkIdentity, TileCoord, TILE_PERIOD, from_index, storage_file, to_index};
pub use cache::{CacheStats, KeyedCache, Loaded};
pub use offload::{DecodeFn, InlineOffload, Offload, Offloaded, Offloader, ThreadOffload};
pub use fetch::{Fetch, FetchFuture, FileFetcher, HttpFetcher, MemoryFetcher, SchemeFetcher};
pub use asset_loader::{AssetKind, AssetLoader, RetryPolicy};
pub use chunk_loader::{ChunkLoader, TileKind};
pub use model_loader::{ModelKind, SkinnedObjectLoader};
pub use registry::{AssetRegistry, RegistryStats};
