//! Integer spatial helpers

pub mod bounds;

pub use bounds::Bounds;
