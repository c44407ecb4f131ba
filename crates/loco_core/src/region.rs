//! Region-based pathing lookup.
//!
//! A map is partitioned into pathing regions on a 32-pixel tile grid. Tiles
//! of mixed terrain are refined by a split region: a 16-bit mask over the
//! tile's 4x4 minitile grid selecting between two finer region ids. The
//! whole structure is built once at map load and is immutable for the rest
//! of the simulation's life, which is what makes [`RegionMap::region_of`]
//! a pure function.
//!
//! Capacities are fixed. Exceeding them while building is a map-authoring
//! defect and panics; it is never a runtime condition the movement core
//! has to recover from.

use serde::{Deserialize, Serialize};

use crate::math::Point;

/// Pathing region identifier.
pub type RegionId = u16;

/// Edge length of a macro pathing tile, in pixels.
pub const TILE_SIZE: u16 = 32;

/// Edge length of a minitile, in pixels.
pub const MINITILE_SIZE: u16 = 8;

/// Row stride of the dense tile lookup table, in tiles.
pub const TILE_STRIDE: usize = 256;

/// Largest supported map extent per axis, in pixels.
pub const MAX_MAP_EXTENT: u16 = (TILE_STRIDE as u16) * TILE_SIZE;

/// Tile-table ids at or above this value index the split-region table.
pub const SPLIT_REGION_BASE: RegionId = 0x2000;

/// Fixed capacity of the region table.
pub const REGION_CAPACITY: usize = 5000;

/// Fixed capacity of the split-region table.
pub const SPLIT_REGION_CAPACITY: usize = 25000;

/// Axis-aligned pixel rectangle (inclusive corners).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub left: u16,
    /// Top edge.
    pub top: u16,
    /// Right edge.
    pub right: u16,
    /// Bottom edge.
    pub bottom: u16,
}

impl Rect {
    /// Create a rectangle from its corner coordinates.
    #[must_use]
    pub const fn new(left: u16, top: u16, right: u16, bottom: u16) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// One pathing region: static per-map data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Representative center point of the region.
    pub center: Point,
    /// Pixel rectangle enclosing the region.
    pub area: Rect,
    /// Whether ground entities can occupy this region.
    pub walkable: bool,
}

/// Sub-tile refinement of one macro tile into two region ids.
///
/// The mask is addressed by minitile coordinates within the tile: bit
/// `mx + my * 4` selects `region_true`, a clear bit selects `region_false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRegion {
    /// 16-bit minitile selector mask.
    pub minitile_mask: u16,
    /// Region id for clear mask bits.
    pub region_false: RegionId,
    /// Region id for set mask bits.
    pub region_true: RegionId,
}

/// The process-wide pathing lookup for one map.
///
/// Holds every [`Region`] and [`SplitRegion`] plus the dense tile-to-region
/// table covering the full map extent. Created once per map load; read-only
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionMap {
    /// Map width in pixels.
    width: u16,
    /// Map height in pixels.
    height: u16,
    /// Dense tile lookup, row-major with a fixed [`TILE_STRIDE`] stride.
    tile_regions: Vec<RegionId>,
    /// Region table, indexed by plain region id.
    regions: Vec<Region>,
    /// Split-region table, indexed by `tile id - SPLIT_REGION_BASE`.
    split_regions: Vec<SplitRegion>,
}

impl RegionMap {
    /// Create a map of the given tile dimensions with a single walkable
    /// region covering everything.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero or exceeds [`TILE_STRIDE`] tiles.
    #[must_use]
    pub fn new(width_tiles: u16, height_tiles: u16) -> Self {
        assert!(
            width_tiles > 0 && height_tiles > 0,
            "RegionMap dimensions must be positive"
        );
        assert!(
            (width_tiles as usize) <= TILE_STRIDE && (height_tiles as usize) <= TILE_STRIDE,
            "RegionMap dimensions exceed the {TILE_STRIDE}-tile lookup stride"
        );

        let width = width_tiles * TILE_SIZE;
        let height = height_tiles * TILE_SIZE;
        let base = Region {
            center: Point::new(width / 2, height / 2),
            area: Rect::new(0, 0, width - 1, height - 1),
            walkable: true,
        };
        Self {
            width,
            height,
            tile_regions: vec![0; TILE_STRIDE * TILE_STRIDE],
            regions: vec![base],
            split_regions: Vec::new(),
        }
    }

    /// Map width in pixels.
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Map height in pixels.
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// Whether a pixel position lies within the map.
    #[must_use]
    pub fn in_bounds(&self, pos: Point) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Add a region, returning its id.
    ///
    /// # Panics
    ///
    /// Panics if the region table is full; fixed capacities are a documented
    /// invariant, so overflowing one is a map-authoring defect.
    pub fn add_region(&mut self, region: Region) -> RegionId {
        assert!(
            self.regions.len() < REGION_CAPACITY,
            "region table full ({REGION_CAPACITY})"
        );
        let id = self.regions.len() as RegionId;
        self.regions.push(region);
        id
    }

    /// Add a split region, returning the tile-table id that refers to it.
    ///
    /// # Panics
    ///
    /// Panics if the split-region table is full.
    pub fn add_split_region(&mut self, split: SplitRegion) -> RegionId {
        assert!(
            self.split_regions.len() < SPLIT_REGION_CAPACITY,
            "split-region table full ({SPLIT_REGION_CAPACITY})"
        );
        let id = SPLIT_REGION_BASE + self.split_regions.len() as RegionId;
        self.split_regions.push(split);
        id
    }

    /// Assign a tile-table entry. `id` is either a plain region id or a
    /// value returned by [`add_split_region`](Self::add_split_region).
    pub fn set_tile_region(&mut self, tile_x: u16, tile_y: u16, id: RegionId) {
        assert!(
            tile_x < self.width / TILE_SIZE && tile_y < self.height / TILE_SIZE,
            "tile ({tile_x}, {tile_y}) outside map"
        );
        self.tile_regions[tile_x as usize + tile_y as usize * TILE_STRIDE] = id;
    }

    /// Look up the pathing region at a pixel position.
    ///
    /// Pure and side-effect free: path construction and real-time dodge
    /// decisions both rely on this returning identical results for
    /// identical inputs. The position must lie within map bounds; that
    /// precondition is the caller's responsibility.
    #[must_use]
    pub fn region_of(&self, pos: Point) -> RegionId {
        debug_assert!(self.in_bounds(pos), "region_of outside map: {pos:?}");
        let tile_x = usize::from(pos.x / TILE_SIZE);
        let tile_y = usize::from(pos.y / TILE_SIZE);
        let id = self.tile_regions[tile_x + tile_y * TILE_STRIDE];
        if id < SPLIT_REGION_BASE {
            return id;
        }
        let split = &self.split_regions[usize::from(id - SPLIT_REGION_BASE)];
        let mini_x = (pos.x / MINITILE_SIZE) & 0x3;
        let mini_y = (pos.y / MINITILE_SIZE) & 0x3;
        if split.minitile_mask & (1 << (mini_x + mini_y * 4)) != 0 {
            split.region_true
        } else {
            split.region_false
        }
    }

    /// Region data for an id previously returned by
    /// [`region_of`](Self::region_of).
    #[must_use]
    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[usize::from(id)]
    }

    /// Whether the region at a position is walkable. Positions outside the
    /// map count as unwalkable.
    #[must_use]
    pub fn is_walkable(&self, pos: Point) -> bool {
        self.in_bounds(pos) && self.region(self.region_of(pos)).walkable
    }
}

impl Default for RegionMap {
    /// A 64x64-tile (2048x2048-pixel) single-region map.
    fn default() -> Self {
        Self::new(64, 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_region_map() -> (RegionMap, RegionId) {
        let mut map = RegionMap::new(8, 8);
        let blocked = map.add_region(Region {
            center: Point::new(48, 48),
            area: Rect::new(32, 32, 63, 63),
            walkable: false,
        });
        map.set_tile_region(1, 1, blocked);
        (map, blocked)
    }

    #[test]
    fn test_region_of_plain_tile() {
        let (map, blocked) = two_region_map();
        assert_eq!(map.region_of(Point::new(5, 5)), 0);
        assert_eq!(map.region_of(Point::new(40, 40)), blocked);
    }

    #[test]
    fn test_region_of_is_pure() {
        let (map, _) = two_region_map();
        let pos = Point::new(40, 40);
        let first = map.region_of(pos);
        for _ in 0..10 {
            assert_eq!(map.region_of(pos), first);
        }
    }

    #[test]
    fn test_split_region_minitile_selection() {
        let mut map = RegionMap::new(8, 8);
        let high = map.add_region(Region {
            center: Point::new(48, 40),
            area: Rect::new(32, 32, 63, 63),
            walkable: true,
        });
        // Top half of the tile resolves to `high`, bottom half to region 0.
        let split = map.add_split_region(SplitRegion {
            minitile_mask: 0x00ff,
            region_false: 0,
            region_true: high,
        });
        map.set_tile_region(1, 1, split);

        // Minitile row 0 and 1 (y in 32..48) have their mask bits set.
        assert_eq!(map.region_of(Point::new(40, 33)), high);
        assert_eq!(map.region_of(Point::new(40, 44)), high);
        // Rows 2 and 3 (y in 48..64) fall through to region_false.
        assert_eq!(map.region_of(Point::new(40, 50)), 0);
        assert_eq!(map.region_of(Point::new(40, 63)), 0);
    }

    #[test]
    fn test_split_region_addresses_by_both_axes() {
        let mut map = RegionMap::new(8, 8);
        let odd = map.add_region(Region {
            center: Point::new(48, 48),
            area: Rect::new(32, 32, 63, 63),
            walkable: true,
        });
        // Checkerboard over the 4x4 minitile grid.
        let split = map.add_split_region(SplitRegion {
            minitile_mask: 0b0101_1010_0101_1010,
            region_false: 0,
            region_true: odd,
        });
        map.set_tile_region(1, 1, split);

        // Minitile (0, 0): bit 0 of 0b...1010 is clear.
        assert_eq!(map.region_of(Point::new(32, 32)), 0);
        // Minitile (1, 0): bit 1 set.
        assert_eq!(map.region_of(Point::new(40, 32)), odd);
        // Minitile (0, 1): bit 4 of the second nibble (0101) is set.
        assert_eq!(map.region_of(Point::new(32, 40)), odd);
    }

    #[test]
    fn test_walkability() {
        let (map, _) = two_region_map();
        assert!(map.is_walkable(Point::new(5, 5)));
        assert!(!map.is_walkable(Point::new(40, 40)));
        // Outside the map counts as unwalkable.
        assert!(!map.is_walkable(Point::new(4000, 5)));
    }

    #[test]
    #[should_panic(expected = "exceed")]
    fn test_oversized_map_is_an_authoring_defect() {
        let _ = RegionMap::new(300, 8);
    }
}
