//! Skinned character model files
//!
//! Models are JSON documents with flat vertex arrays, a triangle index list,
//! optional bones with per-vertex skin data, and a material list. A file with
//! bones decodes to [`SkinnedAsset::Skinned`]; one without decodes to a plain
//! [`SkinnedAsset::Static`] model.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::animation::skeleton::{Bone, Skeleton};
use crate::core::error::Error;
use crate::core::types::{Mat4, Result};

const ASSET: &str = "skinned model";

fn default_influences() -> usize {
    2
}

fn root_parent() -> i32 {
    -1
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn white() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// On-disk model layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    /// Flat xyz positions
    pub vertices: Vec<f32>,
    #[serde(default)]
    pub normals: Vec<f32>,
    #[serde(default)]
    pub uvs: Vec<f32>,
    /// Triangle list
    pub indices: Vec<u32>,
    #[serde(default)]
    pub skin_indices: Vec<u32>,
    #[serde(default)]
    pub skin_weights: Vec<f32>,
    #[serde(default = "default_influences")]
    pub influences_per_vertex: usize,
    #[serde(default)]
    pub bones: Vec<BoneFile>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoneFile {
    pub name: String,
    /// Index of the parent bone, -1 for a root
    #[serde(default = "root_parent")]
    pub parent: i32,
    #[serde(default)]
    pub pos: [f32; 3],
    /// Rotation quaternion as x, y, z, w
    #[serde(default = "identity_rotation")]
    pub rotq: [f32; 4],
    #[serde(default = "unit_scale")]
    pub scl: [f32; 3],
}

/// Surface description handed to the renderer untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    #[serde(default)]
    pub name: String,
    #[serde(default = "white")]
    pub color_diffuse: [f32; 3],
    /// Texture path relative to the model directory
    #[serde(default)]
    pub map: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            color_diffuse: white(),
            map: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }
}

/// Geometry bound to a skeleton
#[derive(Debug, Clone)]
pub struct SkinnedMesh {
    pub geometry: Geometry,
    pub skeleton: Skeleton,
    /// `influences_per_vertex` bone indices per vertex
    pub skin_indices: Vec<u32>,
    pub skin_weights: Vec<f32>,
    pub influences_per_vertex: usize,
    pub materials: Vec<Material>,
}

/// Unskinned geometry with a single material
#[derive(Debug, Clone)]
pub struct Model {
    pub geometry: Geometry,
    pub material: Material,
}

/// The two shapes a character model can decode to
#[derive(Debug, Clone)]
pub enum SkinnedAsset {
    Skinned(SkinnedMesh),
    Static(Model),
}

impl SkinnedAsset {
    pub fn geometry(&self) -> &Geometry {
        match self {
            SkinnedAsset::Skinned(mesh) => &mesh.geometry,
            SkinnedAsset::Static(model) => &model.geometry,
        }
    }

    pub fn is_skinned(&self) -> bool {
        matches!(self, SkinnedAsset::Skinned(_))
    }

    pub fn skinned_mesh(&self) -> Option<&SkinnedMesh> {
        match self {
            SkinnedAsset::Skinned(mesh) => Some(mesh),
            SkinnedAsset::Static(_) => None,
        }
    }

    pub fn model(&self) -> Option<&Model> {
        match self {
            SkinnedAsset::Static(model) => Some(model),
            SkinnedAsset::Skinned(_) => None,
        }
    }
}

fn vec3s(flat: &[f32], what: &str) -> Result<Vec<Vec3>> {
    if flat.len() % 3 != 0 {
        return Err(Error::decode(ASSET, format!("{what} length {} is not a multiple of 3", flat.len())));
    }
    Ok(flat.chunks_exact(3).map(Vec3::from_slice).collect())
}

fn build_geometry(file: &ModelFile) -> Result<Geometry> {
    let positions = vec3s(&file.vertices, "vertices")?;
    let vertex_count = positions.len();

    let normals = vec3s(&file.normals, "normals")?;
    if !normals.is_empty() && normals.len() != vertex_count {
        return Err(Error::decode(
            ASSET,
            format!("{} normals for {} vertices", normals.len(), vertex_count),
        ));
    }

    if !file.uvs.is_empty() && file.uvs.len() != vertex_count * 2 {
        return Err(Error::decode(
            ASSET,
            format!("{} uv components for {} vertices", file.uvs.len(), vertex_count),
        ));
    }
    let uvs = file.uvs.chunks_exact(2).map(Vec2::from_slice).collect();

    if file.indices.len() % 3 != 0 {
        return Err(Error::decode(ASSET, "index count is not a multiple of 3"));
    }
    if let Some(&bad) = file.indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(Error::decode(
            ASSET,
            format!("index {bad} out of range for {vertex_count} vertices"),
        ));
    }

    Ok(Geometry {
        positions,
        normals,
        uvs,
        indices: file.indices.clone(),
    })
}

fn build_skeleton(bones: &[BoneFile]) -> Result<Skeleton> {
    let mut skeleton = Skeleton::new();
    for bone in bones {
        let parent = match bone.parent {
            -1 => None,
            p if p >= 0 => Some(p as usize),
            p => return Err(Error::decode(ASSET, format!("bone {:?} has parent {p}", bone.name))),
        };

        let rotation = Quat::from_array(bone.rotq);
        if !rotation.is_finite() || rotation.length_squared() == 0.0 {
            return Err(Error::decode(ASSET, format!("bone {:?} has an invalid rotation", bone.name)));
        }

        let local = Mat4::from_scale_rotation_translation(
            Vec3::from(bone.scl),
            rotation.normalize(),
            Vec3::from(bone.pos),
        );
        skeleton.add_bone(Bone::new(bone.name.clone(), parent, local))?;
    }
    Ok(skeleton)
}

fn validate_skin(file: &ModelFile, vertex_count: usize, bone_count: usize) -> Result<()> {
    if file.influences_per_vertex == 0 {
        return Err(Error::decode(ASSET, "influencesPerVertex must be at least 1"));
    }
    let expected = vertex_count
        .checked_mul(file.influences_per_vertex)
        .ok_or_else(|| Error::decode(ASSET, "influencesPerVertex is too large"))?;
    if file.skin_indices.len() != expected || file.skin_weights.len() != expected {
        return Err(Error::decode(
            ASSET,
            format!(
                "expected {expected} skin entries, got {} indices and {} weights",
                file.skin_indices.len(),
                file.skin_weights.len()
            ),
        ));
    }
    if let Some(&bad) = file.skin_indices.iter().find(|&&i| i as usize >= bone_count) {
        return Err(Error::decode(
            ASSET,
            format!("skin index {bad} out of range for {bone_count} bones"),
        ));
    }
    Ok(())
}

/// Decode a model file payload
///
/// Runs on a decode worker, so it takes owned bytes and touches no shared state.
pub fn decode_model(bytes: Vec<u8>) -> Result<SkinnedAsset> {
    let file: ModelFile = serde_json::from_slice(&bytes)
        .map_err(|e| Error::decode(ASSET, e.to_string()))?;

    let geometry = build_geometry(&file)?;

    if file.bones.is_empty() {
        let material = file.materials.into_iter().next().unwrap_or_default();
        return Ok(SkinnedAsset::Static(Model { geometry, material }));
    }

    let skeleton = build_skeleton(&file.bones)?;
    validate_skin(&file, geometry.vertex_count(), skeleton.bone_count())?;

    Ok(SkinnedAsset::Skinned(SkinnedMesh {
        geometry,
        skeleton,
        skin_indices: file.skin_indices,
        skin_weights: file.skin_weights,
        influences_per_vertex: file.influences_per_vertex,
        materials: file.materials,
    }))
}
