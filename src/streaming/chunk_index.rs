//! Chunk coordinates, canonical index strings and storage tiling
//!
//! The world is unbounded but only `TILE_PERIOD x TILE_PERIOD` distinct chunk
//! files exist on the asset server; logical coordinates wrap onto them.

use std::fmt;
use std::str::FromStr;

use crate::core::error::Error;
use crate::core::types::Result;

/// Number of distinct storage tiles along each horizontal axis
pub const TILE_PERIOD: i32 = 8;

/// Separator between the two coordinates of an index string
pub const INDEX_SEPARATOR: char = '|';

/// Logical chunk coordinate on the horizontal plane
///
/// Any `i32` pair is a valid identity; only chunks whose voxel origin fits in
/// `i32` can be placed (see [`crate::voxel::chunk::chunk_origin`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkIdentity {
    pub x: i32,
    pub z: i32,
}

impl ChunkIdentity {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Canonical index string, e.g. `"-3|12"`
    pub fn index(&self) -> String {
        to_index(self.x, self.z)
    }

    /// Storage tile this chunk's geometry is read from
    pub fn tile(&self) -> TileCoord {
        TileCoord::of(self.x, self.z)
    }
}

impl fmt::Display for ChunkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.x, INDEX_SEPARATOR, self.z)
    }
}

impl FromStr for ChunkIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (x, z) = from_index(s)?;
        Ok(Self { x, z })
    }
}

/// Reduced coordinate of a storage tile, both components in `0..TILE_PERIOD`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u8,
    pub z: u8,
}

impl TileCoord {
    /// Wrap a logical coordinate onto the tile grid
    pub fn of(x: i32, z: i32) -> Self {
        Self {
            x: x.rem_euclid(TILE_PERIOD) as u8,
            z: z.rem_euclid(TILE_PERIOD) as u8,
        }
    }

    /// File name on the asset server
    pub fn file_name(&self) -> String {
        format!("chunk-{}-{}.vox", self.x, self.z)
    }

    /// Cache key for decoded tile geometry
    pub fn cache_key(&self) -> String {
        format!("tile:{}{}{}", self.x, INDEX_SEPARATOR, self.z)
    }
}

/// Canonical, order-sensitive index for a chunk coordinate
pub fn to_index(x: i32, z: i32) -> String {
    format!("{x}{INDEX_SEPARATOR}{z}")
}

/// Inverse of [`to_index`]
pub fn from_index(index: &str) -> Result<(i32, i32)> {
    let invalid = || Error::InvalidIndex(index.to_string());

    let (x, z) = index.split_once(INDEX_SEPARATOR).ok_or_else(invalid)?;
    let x = x.parse::<i32>().map_err(|_| invalid())?;
    let z = z.parse::<i32>().map_err(|_| invalid())?;
    Ok((x, z))
}

/// Storage file name for a logical coordinate (tiling applied)
pub fn storage_file(x: i32, z: i32) -> String {
    TileCoord::of(x, z).file_name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_index_format() {
        assert_eq!(to_index(3, -4), "3|-4");
        assert_eq!(ChunkIdentity::new(0, 0).index(), "0|0");
        assert_eq!(ChunkIdentity::new(-1, 7).to_string(), "-1|7");
    }

    #[test]
    fn test_index_is_order_sensitive() {
        assert_ne!(to_index(1, 2), to_index(2, 1));
    }

    #[test]
    fn test_extreme_coordinates_round_trip() {
        for (x, z) in [(i32::MIN, i32::MAX), (i32::MAX, i32::MIN), (0, i32::MIN)] {
            assert_eq!(from_index(&to_index(x, z)).unwrap(), (x, z));
        }
    }

    #[test]
    fn test_malformed_indices_rejected() {
        for bad in ["", "1", "1|", "|2", "a|2", "1|2|3", "1,2", " 1|2"] {
            assert!(
                matches!(from_index(bad), Err(Error::InvalidIndex(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_identity() {
        let id: ChunkIdentity = "12|-9".parse().unwrap();
        assert_eq!(id, ChunkIdentity::new(12, -9));
    }

    #[test]
    fn test_tiling_wraps_negative_coordinates() {
        assert_eq!(TileCoord::of(-1, -8), TileCoord { x: 7, z: 0 });
        assert_eq!(TileCoord::of(9, 17), TileCoord { x: 1, z: 1 });
        assert_eq!(storage_file(-1, 3), "chunk-7-3.vox");
    }

    #[test]
    fn test_tile_cache_key_differs_from_logical_index() {
        let id = ChunkIdentity::new(1, 2);
        assert_eq!(id.tile().cache_key(), "tile:1|2");
        assert_ne!(id.tile().cache_key(), id.index());
    }

    proptest! {
        #[test]
        fn prop_index_round_trip(x in any::<i32>(), z in any::<i32>()) {
            prop_assert_eq!(from_index(&to_index(x, z)).unwrap(), (x, z));
        }

        #[test]
        fn prop_period_shares_storage_file(x in -1_000_000i32..1_000_000, z in -1_000_000i32..1_000_000) {
            prop_assert_eq!(storage_file(x, z), storage_file(x + TILE_PERIOD, z));
            prop_assert_eq!(storage_file(x, z), storage_file(x, z - TILE_PERIOD));
            prop_assert_ne!(to_index(x, z), to_index(x + TILE_PERIOD, z));
        }

        #[test]
        fn prop_tile_in_range(x in any::<i32>(), z in any::<i32>()) {
            let tile = TileCoord::of(x, z);
            prop_assert!((tile.x as i32) < TILE_PERIOD);
            prop_assert!((tile.z as i32) < TILE_PERIOD);
        }
    }
}
