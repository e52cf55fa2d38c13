//! Voxel chunk data, `.vox` decoding and meshing

pub mod vox;
pub mod mesh;
pub mod chunk;

pub use chunk::{Block, ChunkGeometry, ChunkType, WorldChunk, CHUNK_SIZE, decode_tile};
pub use mesh::{ChunkMesh, ChunkVertex, VoxelGrid, mesh_grid};
