//! Integer axis-aligned bounds for voxel space

use crate::core::types::IVec3;

/// Axis-aligned box in voxel units, `from` inclusive and `to` exclusive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub from: IVec3,
    pub to: IVec3,
}

impl Bounds {
    /// Create bounds from min and max corners
    pub fn new(from: IVec3, to: IVec3) -> Self {
        Self { from, to }
    }

    /// Create bounds from an origin and an extent
    pub fn from_origin_size(origin: IVec3, size: IVec3) -> Self {
        Self {
            from: origin,
            to: origin + size,
        }
    }

    /// Like [`Bounds::from_origin_size`], `None` if the far corner overflows
    pub fn checked_from_origin_size(origin: IVec3, size: IVec3) -> Option<Self> {
        let to = IVec3::new(
            origin.x.checked_add(size.x)?,
            origin.y.checked_add(size.y)?,
            origin.z.checked_add(size.z)?,
        );
        Some(Self { from: origin, to })
    }

    /// Get size (to - from)
    pub fn size(&self) -> IVec3 {
        self.to - self.from
    }

    /// Number of voxel cells covered
    pub fn volume(&self) -> u64 {
        let s = self.size().max(IVec3::ZERO);
        s.x as u64 * s.y as u64 * s.z as u64
    }

    /// Check if a voxel position lies inside
    pub fn contains(&self, p: IVec3) -> bool {
        p.x >= self.from.x && p.x < self.to.x &&
        p.y >= self.from.y && p.y < self.to.y &&
        p.z >= self.from.z && p.z < self.to.z
    }

    /// Check if two bounds overlap
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.from.x < other.to.x && self.to.x > other.from.x &&
        self.from.y < other.to.y && self.to.y > other.from.y &&
        self.from.z < other.to.z && self.to.z > other.from.z
    }

    /// Shift by an offset
    pub fn translated(&self, offset: IVec3) -> Bounds {
        Bounds {
            from: self.from + offset,
            to: self.to + offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_and_volume() {
        let b = Bounds::from_origin_size(IVec3::new(32, 0, -64), IVec3::new(32, 16, 32));
        assert_eq!(b.to, IVec3::new(64, 16, -32));
        assert_eq!(b.size(), IVec3::new(32, 16, 32));
        assert_eq!(b.volume(), 32 * 16 * 32);
    }

    #[test]
    fn test_checked_from_origin_size() {
        let b = Bounds::checked_from_origin_size(IVec3::new(-64, 0, 96), IVec3::new(4, 8, 2));
        assert_eq!(b, Some(Bounds::new(IVec3::new(-64, 0, 96), IVec3::new(-60, 8, 98))));

        let edge = IVec3::new(i32::MAX - 31, 0, 0);
        assert!(Bounds::checked_from_origin_size(edge, IVec3::new(32, 1, 1)).is_none());
        assert!(Bounds::checked_from_origin_size(edge, IVec3::new(31, 1, 1)).is_some());
    }

    #[test]
    fn test_contains_is_half_open() {
        let b = Bounds::new(IVec3::ZERO, IVec3::splat(4));
        assert!(b.contains(IVec3::ZERO));
        assert!(b.contains(IVec3::splat(3)));
        assert!(!b.contains(IVec3::new(4, 0, 0)));
        assert!(!b.contains(IVec3::new(-1, 0, 0)));
    }

    #[test]
    fn test_adjacent_bounds_do_not_intersect() {
        let a = Bounds::new(IVec3::ZERO, IVec3::splat(4));
        let b = a.translated(IVec3::new(4, 0, 0));
        let c = a.translated(IVec3::new(2, 0, 0));
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
    }

    #[test]
    fn test_inverted_bounds_have_zero_volume() {
        let b = Bounds::new(IVec3::splat(4), IVec3::ZERO);
        assert_eq!(b.volume(), 0);
    }
}
