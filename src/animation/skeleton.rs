//! Bone hierarchy decoded from skinned model files

use glam::Mat4;
use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::Result;

/// Maximum number of bones per skeleton (GPU uniform buffer limit)
pub const MAX_BONES: usize = 64;

const ASSET: &str = "skinned model";

/// A single bone in a skeletal hierarchy
#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent_index: Option<usize>,
    pub local_bind_pose: Mat4,
    /// Filled in by [`Skeleton::add_bone`]
    pub inverse_bind_pose: Mat4,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent_index: Option<usize>, local_bind_pose: Mat4) -> Self {
        Self {
            name: name.into(),
            parent_index,
            local_bind_pose,
            inverse_bind_pose: Mat4::IDENTITY,
        }
    }
}

/// Bones stored parents-first, so a bone's parent always has a lower index
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    bones: Vec<Bone>,
    bone_names: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bone, computing its inverse bind pose
    ///
    /// Fails if the skeleton is full, the parent has not been added yet, or
    /// the name is taken.
    pub fn add_bone(&mut self, mut bone: Bone) -> Result<usize> {
        if self.bones.len() >= MAX_BONES {
            return Err(Error::decode(ASSET, format!("more than {MAX_BONES} bones")));
        }

        if let Some(parent) = bone.parent_index {
            if parent >= self.bones.len() {
                return Err(Error::decode(
                    ASSET,
                    format!("bone {:?} references parent {} before it is defined", bone.name, parent),
                ));
            }
        }

        if self.bone_names.contains_key(&bone.name) {
            return Err(Error::decode(ASSET, format!("duplicate bone name {:?}", bone.name)));
        }

        let world_bind_pose = match bone.parent_index {
            Some(parent) => self.world_bind_pose(parent) * bone.local_bind_pose,
            None => bone.local_bind_pose,
        };
        bone.inverse_bind_pose = world_bind_pose.inverse();

        let index = self.bones.len();
        self.bone_names.insert(bone.name.clone(), index);
        self.bones.push(bone);
        Ok(index)
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn get_bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bone_names.get(name).copied()
    }

    pub fn parent_index(&self, bone_index: usize) -> Option<usize> {
        self.bones.get(bone_index)?.parent_index
    }

    pub fn children(&self, bone_index: usize) -> Vec<usize> {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, bone)| bone.parent_index == Some(bone_index))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// World-space bind pose of a bone, walking up to the root
    pub fn world_bind_pose(&self, bone_index: usize) -> Mat4 {
        let mut chain = Vec::new();
        let mut current = Some(bone_index);
        while let Some(idx) = current {
            chain.push(idx);
            current = self.bones[idx].parent_index;
        }

        chain
            .iter()
            .rev()
            .fold(Mat4::IDENTITY, |acc, &idx| acc * self.bones[idx].local_bind_pose)
    }
}
