//! Entity data model and arena storage.
//!
//! Entities live in a pre-sized arena and are addressed by generation-
//! checked handles. A handle held across ticks (most importantly the dodge
//! back-reference stored on a [`Path`]) can go stale when its entity is
//! destroyed; the generation check makes that staleness structurally
//! detectable instead of relying on liveness flags scattered through the
//! movement logic.

use serde::{Deserialize, Serialize};

use crate::error::{MovementError, Result};
use crate::math::{Fixed, Point, Vec2Fixed};
use crate::movement::MovementState;
use crate::path::Path;

/// Fixed capacity of the entity arena.
pub const ENTITY_CAPACITY: usize = 1700;

/// Generation-checked reference to an arena slot.
///
/// Ordering is by slot index then generation, which gives collision
/// queries a deterministic tie-break.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityHandle {
    index: u16,
    generation: u32,
}

impl EntityHandle {
    /// Arena slot index.
    #[must_use]
    pub const fn index(self) -> u16 {
        self.index
    }
}

/// Collision bounding box: extents from the entity's center, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Extent to the left of center.
    pub left: u16,
    /// Extent above center.
    pub top: u16,
    /// Extent to the right of center.
    pub right: u16,
    /// Extent below center.
    pub bottom: u16,
}

impl BoundingBox {
    /// Square box with the given half-extent.
    #[must_use]
    pub const fn square(extent: u16) -> Self {
        Self {
            left: extent,
            top: extent,
            right: extent,
            bottom: extent,
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::square(8)
    }
}

/// How an entity's speed progresses each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccelModel {
    /// Speed ramps by the entity's acceleration value toward its top speed.
    #[default]
    DataDriven,
    /// Speed snaps straight to top speed while moving.
    FixedTopSpeed,
}

/// Per-tick motion flags, copied into the movement context during a step
/// and written back on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MotionFlags {
    /// The entity still needs to rotate toward its target direction.
    pub steering: bool,
    /// The entity is advancing toward its next waypoint.
    pub in_motion: bool,
    /// Kinematics are suspended; the state machine treats this as a
    /// force-idle request.
    pub immobilized: bool,
}

/// Long-lived status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusFlags {
    /// This entity blocks and is blocked by other colliding entities.
    pub collides: bool,
    /// Collision is disabled entirely for this entity.
    pub no_collision: bool,
    /// The move target was refreshed since the entity last reached it.
    pub move_target_updated: bool,
    /// The entity flies and is not bound by terrain regions.
    pub airborne: bool,
}

/// A transient repulsion effect pushing a flyer, applied both before and
/// after its position commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repulse {
    /// Per-tick displacement, split across the two application points.
    pub offset: Vec2Fixed,
    /// Remaining ticks; the effect is dropped at zero.
    pub ticks: u8,
}

/// Result of the stationary check used when deciding whether a movement
/// attempt is even needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandStill {
    /// The move target has not been reached.
    Moving,
    /// At the move target.
    AtTarget,
    /// At the move target, but the target was refreshed since arrival.
    AtTargetRefreshed,
}

/// A mobile simulation actor.
///
/// Owns at most one [`Path`]; replacing it requires releasing the previous
/// one first (`Option::take`), so no component can retain a reference into
/// a freed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Committed position in whole pixels.
    pub position: Point,
    /// Committed sub-pixel position.
    pub exact_position: Vec2Fixed,
    /// Per-axis velocity, derived from movement direction and speed.
    pub velocity: Vec2Fixed,
    /// Direction the entity is visibly facing.
    pub facing: u8,
    /// Direction the entity is actually displacing along.
    pub movement_dir: u8,
    /// Direction the entity wants to face.
    pub target_dir: u8,
    /// Direction produced by the last steering step; becomes
    /// `movement_dir` on commit.
    pub heading_dir: u8,
    /// Turn rate in direction steps per tick.
    pub turn_rate: u8,
    /// Current scalar speed in pixels per tick.
    #[serde(with = "crate::math::fixed_serde")]
    pub current_speed: Fixed,
    /// Speed committed by the previous movement step.
    #[serde(with = "crate::math::fixed_serde")]
    pub next_speed: Fixed,
    /// Maximum scalar speed.
    #[serde(with = "crate::math::fixed_serde")]
    pub top_speed: Fixed,
    /// Speed gained per tick under the data-driven acceleration model.
    #[serde(with = "crate::math::fixed_serde")]
    pub acceleration: Fixed,
    /// Acceleration model selector.
    pub accel_model: AccelModel,
    /// Current move target.
    pub move_target: Point,
    /// Entity the move target tracks, if any.
    pub move_target_entity: Option<EntityHandle>,
    /// Immediate waypoint being moved toward.
    pub next_waypoint: Point,
    /// Collision bounding box.
    pub bounds: BoundingBox,
    /// Per-tick motion flags.
    pub motion: MotionFlags,
    /// Long-lived status flags.
    pub flags: StatusFlags,
    /// Ticks of unresolved contention on the current route. Grows while
    /// colliding or waiting, decays to at most 2 while following cleanly.
    pub contention_ticks: u8,
    /// Movement state tag.
    pub state: MovementState,
    /// The planned route, if any.
    pub path: Option<Box<Path>>,
    /// Active repulsion effect (flyers only).
    pub repulse: Option<Repulse>,
    /// The entity is in its death sequence.
    pub dying: bool,
    /// The entity has no visible graphical representation.
    pub hidden: bool,
}

impl Entity {
    /// Create a stationary entity at a position with the given top speed.
    #[must_use]
    pub fn at(position: Point, top_speed: Fixed) -> Self {
        Self {
            position,
            exact_position: Vec2Fixed::from_point(position),
            velocity: Vec2Fixed::ZERO,
            facing: 0,
            movement_dir: 0,
            target_dir: 0,
            heading_dir: 0,
            turn_rate: 8,
            current_speed: Fixed::ZERO,
            next_speed: Fixed::ZERO,
            top_speed,
            acceleration: Fixed::from_bits(17),
            accel_model: AccelModel::DataDriven,
            move_target: position,
            move_target_entity: None,
            next_waypoint: position,
            bounds: BoundingBox::default(),
            motion: MotionFlags::default(),
            flags: StatusFlags {
                collides: true,
                ..StatusFlags::default()
            },
            contention_ticks: 0,
            state: MovementState::Idle,
            path: None,
            repulse: None,
            dying: false,
            hidden: false,
        }
    }

    /// Stationary check against the move target.
    #[must_use]
    pub fn standing_still(&self) -> StandStill {
        if self.move_target != self.position {
            StandStill::Moving
        } else if self.flags.move_target_updated {
            StandStill::AtTargetRefreshed
        } else {
            StandStill::AtTarget
        }
    }

    /// Whether this entity's displacement direction points away from
    /// `other`, judged per dominant axis quadrant.
    #[must_use]
    pub fn is_moving_away_from(&self, other: &Entity) -> bool {
        if !self.motion.in_motion {
            return false;
        }
        let dir = self.movement_dir;
        match relative_quadrant(self.position, other.position) {
            Quadrant::North => dir > 0x40 && dir < 0xc0,
            Quadrant::East => dir > 0x80,
            Quadrant::South => dir < 0x40 || dir > 0xc0,
            Quadrant::West => dir > 0x00 && dir < 0x80,
        }
    }

    /// Whether this entity, placed at `own_pos`, overlaps `other` placed
    /// at `other_pos`.
    #[must_use]
    pub fn overlaps_at(&self, own_pos: Point, other: &Entity, other_pos: Point) -> bool {
        let own = &self.bounds;
        let theirs = &other.bounds;
        if i32::from(own_pos.x) + i32::from(own.right)
            < i32::from(other_pos.x) - i32::from(theirs.left)
        {
            return false;
        }
        if i32::from(own_pos.x) - i32::from(own.left)
            > i32::from(other_pos.x) + i32::from(theirs.right)
        {
            return false;
        }
        if i32::from(own_pos.y) + i32::from(own.bottom)
            < i32::from(other_pos.y) - i32::from(theirs.top)
        {
            return false;
        }
        if i32::from(own_pos.y) - i32::from(own.top)
            > i32::from(other_pos.y) + i32::from(theirs.bottom)
        {
            return false;
        }
        true
    }
}

/// Which side of `a` the point `b` falls on, by dominant axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    /// Above.
    North,
    /// To the right.
    East,
    /// Below.
    South,
    /// To the left.
    West,
}

/// Classify `b` relative to `a` by dominant axis. Ties resolve to the
/// vertical axis so the result is deterministic.
#[must_use]
pub fn relative_quadrant(a: Point, b: Point) -> Quadrant {
    let dx = i32::from(b.x) - i32::from(a.x);
    let dy = i32::from(b.y) - i32::from(a.y);
    if dx.abs() > dy.abs() {
        if dx > 0 {
            Quadrant::East
        } else {
            Quadrant::West
        }
    } else if dy > 0 {
        Quadrant::South
    } else {
        Quadrant::North
    }
}

/// One arena slot: a generation counter plus the occupant, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Pre-sized arena of all entities in the simulation.
///
/// Slots are reused; each reuse bumps the slot generation so handles from
/// a previous occupant fail the generation check instead of aliasing the
/// new one. Iteration order is ascending slot index, which is the
/// canonical per-tick processing order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityArena {
    slots: Vec<Slot>,
    free: Vec<u16>,
    len: usize,
}

impl EntityArena {
    /// Create an empty arena at full fixed capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no entities.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an entity, returning its handle.
    pub fn spawn(&mut self, entity: Entity) -> Result<EntityHandle> {
        let index = if let Some(index) = self.free.pop() {
            self.slots[usize::from(index)].entity = Some(entity);
            index
        } else {
            if self.slots.len() >= ENTITY_CAPACITY {
                return Err(MovementError::ArenaFull(ENTITY_CAPACITY));
            }
            let index = self.slots.len() as u16;
            self.slots.push(Slot {
                generation: 0,
                entity: Some(entity),
            });
            index
        };
        self.len += 1;
        Ok(EntityHandle {
            index,
            generation: self.slots[usize::from(index)].generation,
        })
    }

    /// Remove an entity. Outstanding handles to it become stale
    /// immediately. Returns the entity if the handle was live.
    pub fn despawn(&mut self, handle: EntityHandle) -> Option<Entity> {
        let slot = self.slots.get_mut(usize::from(handle.index))?;
        if slot.generation != handle.generation || slot.entity.is_none() {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        slot.entity.take()
    }

    /// Borrow an entity if the handle is still live.
    #[must_use]
    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        let slot = self.slots.get(usize::from(handle.index))?;
        if slot.generation == handle.generation {
            slot.entity.as_ref()
        } else {
            None
        }
    }

    /// Mutably borrow an entity if the handle is still live.
    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(usize::from(handle.index))?;
        if slot.generation == handle.generation {
            slot.entity.as_mut()
        } else {
            None
        }
    }

    /// Whether a handle is still live.
    #[must_use]
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Temporarily remove an entity for processing, leaving its slot and
    /// generation intact. Pair with [`restore`](Self::restore).
    pub fn take(&mut self, handle: EntityHandle) -> Option<Entity> {
        let slot = self.slots.get_mut(usize::from(handle.index))?;
        if slot.generation == handle.generation {
            slot.entity.take()
        } else {
            None
        }
    }

    /// Put back an entity removed with [`take`](Self::take).
    pub fn restore(&mut self, handle: EntityHandle, entity: Entity) {
        let slot = &mut self.slots[usize::from(handle.index)];
        debug_assert!(slot.generation == handle.generation && slot.entity.is_none());
        slot.entity = Some(entity);
    }

    /// Live handles in canonical (ascending slot) order.
    #[must_use]
    pub fn handles(&self) -> Vec<EntityHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entity.is_some())
            .map(|(index, slot)| EntityHandle {
                index: index as u16,
                generation: slot.generation,
            })
            .collect()
    }

    /// Iterate live `(handle, entity)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entity.as_ref().map(|entity| {
                (
                    EntityHandle {
                        index: index as u16,
                        generation: slot.generation,
                    },
                    entity,
                )
            })
        })
    }
}

impl Default for EntityArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> Entity {
        Entity::at(Point::new(100, 100), Fixed::from_num(4))
    }

    #[test]
    fn test_spawn_and_get() {
        let mut arena = EntityArena::new();
        let handle = arena.spawn(entity()).unwrap();
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(handle).unwrap().position, Point::new(100, 100));
    }

    #[test]
    fn test_despawn_makes_handle_stale() {
        let mut arena = EntityArena::new();
        let handle = arena.spawn(entity()).unwrap();
        assert!(arena.despawn(handle).is_some());
        assert!(arena.get(handle).is_none());
        assert!(!arena.contains(handle));
        // A second despawn through the same handle is a no-op.
        assert!(arena.despawn(handle).is_none());
    }

    #[test]
    fn test_slot_reuse_does_not_alias_old_handle() {
        let mut arena = EntityArena::new();
        let old = arena.spawn(entity()).unwrap();
        arena.despawn(old);
        let new = arena.spawn(entity()).unwrap();
        assert_eq!(old.index(), new.index());
        assert!(arena.get(old).is_none());
        assert!(arena.get(new).is_some());
    }

    #[test]
    fn test_take_restore_preserves_handle() {
        let mut arena = EntityArena::new();
        let handle = arena.spawn(entity()).unwrap();
        let mut taken = arena.take(handle).unwrap();
        assert!(arena.get(handle).is_none());
        taken.position = Point::new(7, 9);
        arena.restore(handle, taken);
        assert_eq!(arena.get(handle).unwrap().position, Point::new(7, 9));
    }

    #[test]
    fn test_handles_are_in_canonical_order() {
        let mut arena = EntityArena::new();
        let a = arena.spawn(entity()).unwrap();
        let b = arena.spawn(entity()).unwrap();
        let c = arena.spawn(entity()).unwrap();
        arena.despawn(b);
        let handles = arena.handles();
        assert_eq!(handles, vec![a, c]);
    }

    #[test]
    fn test_standing_still() {
        let mut e = entity();
        assert_eq!(e.standing_still(), StandStill::AtTarget);
        e.flags.move_target_updated = true;
        assert_eq!(e.standing_still(), StandStill::AtTargetRefreshed);
        e.move_target = Point::new(200, 200);
        assert_eq!(e.standing_still(), StandStill::Moving);
    }

    #[test]
    fn test_overlap() {
        let a = entity();
        let b = entity();
        assert!(a.overlaps_at(Point::new(100, 100), &b, Point::new(110, 100)));
        assert!(!a.overlaps_at(Point::new(100, 100), &b, Point::new(120, 100)));
    }

    #[test]
    fn test_moving_away_quadrants() {
        let mut a = entity();
        let b = Entity::at(Point::new(100, 50), Fixed::from_num(4)); // north of a
        a.motion.in_motion = true;
        a.movement_dir = 128; // south
        assert!(a.is_moving_away_from(&b));
        a.movement_dir = 0; // north, toward b
        assert!(!a.is_moving_away_from(&b));
    }
}
