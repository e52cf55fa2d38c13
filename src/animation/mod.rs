//! Skeletons and skinned character models

pub mod skeleton;
pub mod skinned;

pub use skeleton::{Bone, Skeleton, MAX_BONES};
pub use skinned::{Geometry, Material, Model, SkinnedAsset, SkinnedMesh, decode_model};
