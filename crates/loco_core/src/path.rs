//! Per-entity route records.
//!
//! A [`Path`] is a fixed-capacity record of a planned route: endpoints,
//! packed waypoints, the entity currently being negotiated around, and
//! bookkeeping counters. Storage never grows; construction negotiates the
//! requested waypoint and region counts down into the fixed byte budget,
//! and a route that cannot be encoded even after shrinking is a capacity
//! error the caller handles locally (treat as no-route).

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityHandle};
use crate::error::{MovementError, Result};
use crate::math::{Fixed, Point};
use crate::region::{RegionId, RegionMap};

/// Number of packed u16 slots in a path: interleaved waypoint coordinates
/// followed by region-id annotations.
pub const PATH_VALUE_SLOTS: usize = 0x30;

/// Hard ceiling on the encoded size of a path, in bytes.
pub const PATH_BYTE_BUDGET: usize = 0x80;

/// Encoded size of a path with the given counts, in bytes, rounded down
/// to a 4-byte boundary.
#[must_use]
pub const fn encoded_size(region_count: u16, position_count: u16) -> usize {
    ((position_count as usize * 2 + region_count as usize) * 2 + 0x23) & !3
}

/// Negotiate waypoint/region counts into the fixed byte budget.
///
/// If the initial request overflows: a request of `0x18` or more positions
/// is clamped to `0x17` positions and a single region; smaller requests
/// keep their positions and recompute `region_count = (0x18 - positions) * 2`.
/// The budget check repeats once after the adjustment; a second overflow is
/// a capacity error.
pub fn negotiate_budget(
    mut region_count: u16,
    mut position_count: u16,
) -> Result<(u16, u16)> {
    if encoded_size(region_count, position_count) > PATH_BYTE_BUDGET {
        if position_count >= 0x18 {
            position_count = 0x17;
            region_count = 1;
        } else {
            region_count = (0x18 - position_count) * 2;
        }
        if encoded_size(region_count, position_count) > PATH_BYTE_BUDGET {
            return Err(MovementError::PathBudgetExceeded {
                region_count,
                position_count,
            });
        }
    }
    Ok((region_count, position_count))
}

/// A planned route, exclusively owned by its entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    /// Position the route started from.
    pub start: Point,
    /// Immediate next waypoint.
    pub next_point: Point,
    /// Final destination.
    pub end: Point,
    /// Simulation tick the route started.
    pub start_tick: u64,
    /// Entity currently being dodged. Non-owning; revalidated on every use
    /// since the entity may have been destroyed.
    pub dodge_entity: Option<EntityHandle>,
    /// Stored lateral direction for dodge slipping.
    pub dodge_direction: u8,
    /// Speed captured at the moment of a blocking collision, restored when
    /// movement resumes.
    #[serde(with = "crate::math::fixed_serde")]
    pub retained_speed: Fixed,
    /// Total regions the route crosses.
    pub total_region_count: u8,
    /// Remaining waypoint count.
    pub position_count: u8,
    /// Index of the waypoint currently being moved toward.
    pub position_index: u8,
    /// Bounded retry counter for collision recovery.
    pub retry_count: u8,
    /// Countdown cycled while following cleanly.
    pub repath_countdown: u8,
    #[serde(with = "value_slots_serde")]
    values: [u16; PATH_VALUE_SLOTS],
}

impl Path {
    /// Allocate a path for the requested counts, negotiating them into the
    /// fixed budget per [`negotiate_budget`].
    pub fn allocate(region_count: u16, position_count: u16, start_tick: u64) -> Result<Box<Self>> {
        let (region_count, position_count) = negotiate_budget(region_count, position_count)?;
        Ok(Box::new(Self {
            start: Point::ZERO,
            next_point: Point::ZERO,
            end: Point::ZERO,
            start_tick,
            dodge_entity: None,
            dodge_direction: 0,
            retained_speed: Fixed::ZERO,
            total_region_count: region_count as u8,
            position_count: position_count as u8,
            position_index: 0,
            retry_count: 0,
            repath_countdown: 0,
            values: [0; PATH_VALUE_SLOTS],
        }))
    }

    /// Waypoint `i` of the packed array.
    #[must_use]
    pub fn waypoint(&self, i: usize) -> Point {
        debug_assert!(i < usize::from(self.position_count));
        Point::new(self.values[i * 2], self.values[i * 2 + 1])
    }

    /// Store waypoint `i`.
    pub fn set_waypoint(&mut self, i: usize, p: Point) {
        debug_assert!(i < usize::from(self.position_count));
        self.values[i * 2] = p.x;
        self.values[i * 2 + 1] = p.y;
    }

    /// Region annotation `i`, stored after the waypoints.
    #[must_use]
    pub fn region_annotation(&self, i: usize) -> RegionId {
        debug_assert!(i < usize::from(self.total_region_count));
        self.values[usize::from(self.position_count) * 2 + i]
    }

    /// Store region annotation `i`.
    pub fn set_region_annotation(&mut self, i: usize, id: RegionId) {
        debug_assert!(i < usize::from(self.total_region_count));
        self.values[usize::from(self.position_count) * 2 + i] = id;
    }

    /// Ticks elapsed since the route started.
    #[must_use]
    pub fn age(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.start_tick)
    }
}

/// Build the trivial single-leg route and hand it to the entity.
///
/// Releases any path the entity already holds, allocates a fresh one with
/// single region/position counts, and stores `next_waypoint` as both the
/// immediate waypoint and the sole packed waypoint, with `destination` as
/// the terminal point. The region annotation is looked up fresh from
/// `next_waypoint` rather than carried over, so a route handed out here
/// never reports a stale region.
pub fn assign_simple_route(
    map: &RegionMap,
    entity: &mut Entity,
    next_waypoint: Point,
    destination: Point,
    tick: u64,
) -> Result<()> {
    // Release before replacement; nothing may retain the old path.
    entity.path = None;
    let mut route = Path::allocate(1, 1, tick)?;
    route.start = entity.position;
    route.next_point = next_waypoint;
    route.end = destination;
    route.set_waypoint(0, next_waypoint);
    route.set_region_annotation(0, map.region_of(next_waypoint));
    entity.next_waypoint = next_waypoint;
    entity.path = Some(route);
    Ok(())
}

/// Serde support for the packed value array (serialized as a sequence;
/// arrays above 32 elements need an explicit impl).
mod value_slots_serde {
    use super::PATH_VALUE_SLOTS;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(values: &[u16; PATH_VALUE_SLOTS], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        values.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u16; PATH_VALUE_SLOTS], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<u16>::deserialize(deserializer)?;
        let len = vec.len();
        vec.try_into()
            .map_err(|_| D::Error::invalid_length(len, &"48 packed path slots"))
    }
}
