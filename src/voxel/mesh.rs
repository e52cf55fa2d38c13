//! Dense voxel grid and face-culling mesher

use bytemuck::{Pod, Zeroable};

use crate::core::types::IVec3;
use crate::voxel::chunk::Block;

/// Renderer-ready vertex, uploadable as raw bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ChunkVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color_index: u32,
}

/// Triangle mesh for one chunk tile, in tile-local coordinates
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    pub vertices: Vec<ChunkVertex>,
    pub indices: Vec<u32>,
}

impl ChunkMesh {
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Vertex data as bytes for buffer upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Dense occupancy grid, Y up. A cell value of 0 means empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelGrid {
    size: IVec3,
    cells: Vec<u8>,
}

impl VoxelGrid {
    pub fn new(size: IVec3) -> Self {
        let s = size.max(IVec3::ZERO);
        let cells = s.x as usize * s.y as usize * s.z as usize;
        Self {
            size: s,
            cells: vec![0; cells],
        }
    }

    pub fn size(&self) -> IVec3 {
        self.size
    }

    fn index(&self, p: IVec3) -> Option<usize> {
        if p.cmplt(IVec3::ZERO).any() || p.cmpge(self.size).any() {
            return None;
        }
        let (x, y, z) = (p.x as usize, p.y as usize, p.z as usize);
        let (sx, sz) = (self.size.x as usize, self.size.z as usize);
        Some(x + z * sx + y * sx * sz)
    }

    /// Set a cell; out of range writes are ignored
    pub fn set(&mut self, p: IVec3, color_index: u8) {
        if let Some(i) = self.index(p) {
            self.cells[i] = color_index;
        }
    }

    pub fn get(&self, p: IVec3) -> u8 {
        self.index(p).map_or(0, |i| self.cells[i])
    }

    pub fn is_solid(&self, p: IVec3) -> bool {
        self.get(p) != 0
    }

    pub fn solid_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0).count()
    }

    pub fn is_full(&self) -> bool {
        !self.cells.is_empty() && self.cells.iter().all(|&c| c != 0)
    }

    /// Solid cells in y, z, x order
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(self.solid_count());
        for y in 0..self.size.y {
            for z in 0..self.size.z {
                for x in 0..self.size.x {
                    let position = IVec3::new(x, y, z);
                    let color_index = self.get(position);
                    if color_index != 0 {
                        blocks.push(Block { position, color_index });
                    }
                }
            }
        }
        blocks
    }
}

/// Face normal and its four corners, counter-clockwise seen from outside
const FACES: [(IVec3, [IVec3; 4]); 6] = [
    (IVec3::new(1, 0, 0), [IVec3::new(1, 0, 0), IVec3::new(1, 1, 0), IVec3::new(1, 1, 1), IVec3::new(1, 0, 1)]),
    (IVec3::new(-1, 0, 0), [IVec3::new(0, 0, 0), IVec3::new(0, 0, 1), IVec3::new(0, 1, 1), IVec3::new(0, 1, 0)]),
    (IVec3::new(0, 1, 0), [IVec3::new(0, 1, 0), IVec3::new(0, 1, 1), IVec3::new(1, 1, 1), IVec3::new(1, 1, 0)]),
    (IVec3::new(0, -1, 0), [IVec3::new(0, 0, 0), IVec3::new(1, 0, 0), IVec3::new(1, 0, 1), IVec3::new(0, 0, 1)]),
    (IVec3::new(0, 0, 1), [IVec3::new(0, 0, 1), IVec3::new(1, 0, 1), IVec3::new(1, 1, 1), IVec3::new(0, 1, 1)]),
    (IVec3::new(0, 0, -1), [IVec3::new(0, 0, 0), IVec3::new(0, 1, 0), IVec3::new(1, 1, 0), IVec3::new(1, 0, 0)]),
];

/// Emit one quad per solid face that has no solid neighbour
pub fn mesh_grid(grid: &VoxelGrid) -> ChunkMesh {
    let mut mesh = ChunkMesh::default();

    for block in grid.blocks() {
        for (normal, corners) in &FACES {
            if grid.is_solid(block.position + *normal) {
                continue;
            }

            let base = mesh.vertices.len() as u32;
            for corner in corners {
                mesh.vertices.push(ChunkVertex {
                    position: (block.position + *corner).as_vec3().to_array(),
                    normal: normal.as_vec3().to_array(),
                    color_index: u32::from(block.color_index),
                });
            }
            mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }

    mesh
}
