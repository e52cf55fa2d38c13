//! World chunks: decoded tile geometry plus per-chunk placement and state

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::error::Error;
use crate::core::types::{IVec3, Result};
use crate::math::Bounds;
use crate::streaming::chunk_index::{ChunkIdentity, TileCoord};
use crate::voxel::mesh::{ChunkMesh, VoxelGrid, mesh_grid};
use crate::voxel::vox;

/// Horizontal stride between chunk origins, in voxels
pub const CHUNK_SIZE: i32 = 32;

/// One solid voxel in tile-local, Y-up coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub position: IVec3,
    pub color_index: u8,
}

/// Coarse classification of a tile's contents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// No solid voxels
    Empty,
    /// Partially filled
    Terrain,
    /// Every cell of the tile is solid
    Solid,
}

/// Immutable geometry decoded from one storage tile
///
/// Shared by every logical chunk that wraps onto the same tile.
#[derive(Debug)]
pub struct ChunkGeometry {
    /// Extent in voxels (Y up)
    pub size: IVec3,
    pub mesh: Arc<ChunkMesh>,
    pub blocks: Vec<Block>,
    pub chunk_type: ChunkType,
    /// RGBA palette, `palette[i]` colours index `i + 1`
    pub palette: Option<Vec<[u8; 4]>>,
}

impl ChunkGeometry {
    /// Build geometry from a decoded `.vox` model
    ///
    /// MagicaVoxel files are Z-up; file `(x, y, z)` maps to world `(x, z, y)`.
    pub fn from_vox(model: vox::VoxModel) -> Self {
        let [sx, sy, sz] = model.size;
        let size = IVec3::new(sx as i32, sz as i32, sy as i32);

        let mut grid = VoxelGrid::new(size);
        for v in &model.voxels {
            grid.set(
                IVec3::new(i32::from(v.x), i32::from(v.z), i32::from(v.y)),
                v.color_index,
            );
        }

        let chunk_type = if grid.solid_count() == 0 {
            ChunkType::Empty
        } else if grid.is_full() {
            ChunkType::Solid
        } else {
            ChunkType::Terrain
        };

        Self {
            size,
            mesh: Arc::new(mesh_grid(&grid)),
            blocks: grid.blocks(),
            chunk_type,
            palette: model.palette,
        }
    }

    pub fn triangle_count(&self) -> u32 {
        self.mesh.triangle_count()
    }
}

/// Decode a chunk file payload into tile geometry
///
/// Runs on a decode worker, so it takes owned bytes and touches no shared state.
pub fn decode_tile(bytes: Vec<u8>) -> Result<ChunkGeometry> {
    let model = vox::read_payload(&bytes)?;
    Ok(ChunkGeometry::from_vox(model))
}

/// World-space origin of a logical chunk
///
/// Fails for identities whose origin does not fit in `i32` voxel space.
pub fn chunk_origin(identity: ChunkIdentity) -> Result<IVec3> {
    let out_of_range = || Error::ChunkOutOfRange(identity.to_string());
    let x = identity.x.checked_mul(CHUNK_SIZE).ok_or_else(out_of_range)?;
    let z = identity.z.checked_mul(CHUNK_SIZE).ok_or_else(out_of_range)?;
    Ok(IVec3::new(x, 0, z))
}

/// A chunk placed in the world
///
/// Placement and the dirty flag belong to this logical chunk; geometry is
/// shared with all chunks on the same storage tile.
#[derive(Debug)]
pub struct WorldChunk {
    identity: ChunkIdentity,
    geometry: Arc<ChunkGeometry>,
    position: IVec3,
    bounds: Bounds,
    dirty: AtomicBool,
}

impl WorldChunk {
    /// Place tile geometry at a logical chunk coordinate
    ///
    /// # Errors
    /// [`Error::ChunkOutOfRange`] if the chunk's origin or far corner
    /// overflows `i32` voxel space.
    pub fn new(identity: ChunkIdentity, geometry: Arc<ChunkGeometry>) -> Result<Self> {
        let position = chunk_origin(identity)?;
        let bounds = Bounds::checked_from_origin_size(position, geometry.size)
            .ok_or_else(|| Error::ChunkOutOfRange(identity.to_string()))?;
        Ok(Self {
            identity,
            position,
            bounds,
            geometry,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn identity(&self) -> ChunkIdentity {
        self.identity
    }

    /// Canonical index string, derived from the identity
    pub fn chunk_index(&self) -> String {
        self.identity.index()
    }

    pub fn tile(&self) -> TileCoord {
        self.identity.tile()
    }

    /// World-space origin (minimum corner)
    pub fn position(&self) -> IVec3 {
        self.position
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Renderer payload
    pub fn mesh(&self) -> &Arc<ChunkMesh> {
        &self.geometry.mesh
    }

    pub fn geometry(&self) -> &Arc<ChunkGeometry> {
        &self.geometry
    }

    pub fn triangle_count(&self) -> u32 {
        self.geometry.triangle_count()
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.geometry.chunk_type
    }

    pub fn blocks(&self) -> &[Block] {
        &self.geometry.blocks
    }

    pub fn voxel_block_count(&self) -> u32 {
        self.geometry.blocks.len() as u32
    }

    /// Flag the chunk for re-meshing after its block data changed
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was set
    pub fn clear_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}
