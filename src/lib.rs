//! Voxstream - streaming asset cache for a voxel game client

pub mod core;
pub mod math;
pub mod voxel;
pub mod animation;
pub mod streaming;
