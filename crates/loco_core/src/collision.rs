//! Collaborator seam for the movement state machine.
//!
//! The state machine consumes route planning, route-progress bookkeeping,
//! collision queries, and the spatial gap finder through the [`MovementEnv`]
//! trait. The in-crate [`StandardEnv`] implements all of them from the
//! region map and the entity arena; tests substitute scripted
//! implementations to drive the state machine through exact collision
//! sequences.

use crate::entity::{Entity, EntityArena, EntityHandle};
use crate::math::{dir_diff, direction_between, Point};
use crate::path;
use crate::region::RegionMap;

/// Read-only view of the world handed to collaborators while one entity is
/// being processed. The entity itself is temporarily absent from the
/// arena, so queries observe only other entities' committed positions.
pub struct WorldView<'a> {
    /// Static pathing data.
    pub map: &'a RegionMap,
    /// All other entities, at their committed positions.
    pub arena: &'a EntityArena,
    /// Current simulation tick.
    pub tick: u64,
}

/// Route-progress signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCheck {
    /// The route is still live; keep moving.
    Continue,
    /// Stop: arrived, or the route was lost.
    Stop,
}

/// External collaborators consumed by the movement state machine.
///
/// Methods take `&mut self` so scripted test environments can consume
/// canned result sequences; the standard implementation is stateless.
pub trait MovementEnv {
    /// Attempt to populate or replace the entity's path toward `target`.
    /// `dodge_hint` carries the dodge entity captured from a just-released
    /// path, scoped to this call. Returns success.
    fn plan_route(
        &mut self,
        world: &WorldView<'_>,
        entity: &mut Entity,
        target: Point,
        dodge_hint: Option<EntityHandle>,
    ) -> bool;

    /// Advance "still on a valid route" bookkeeping, stepping the path's
    /// waypoint cursor as waypoints are reached.
    fn route_progress(&mut self, world: &WorldView<'_>, entity: &mut Entity) -> RouteCheck;

    /// Nearest entity blocking `entity` if it stood at `at`, or none.
    fn blocking_entity(
        &mut self,
        world: &WorldView<'_>,
        entity: &Entity,
        at: Point,
    ) -> Option<EntityHandle>;

    /// Whether terrain blocks `entity` standing at `at`.
    fn terrain_blocked(&mut self, world: &WorldView<'_>, entity: &Entity, at: Point) -> bool;

    /// Whether `blocker` blocks `entity` from occupying `point`.
    fn blocks_point(
        &mut self,
        world: &WorldView<'_>,
        blocker: EntityHandle,
        entity: &Entity,
        point: Point,
    ) -> bool;

    /// Lateral direction that slips `entity` past `other`, or none if the
    /// spatial index finds no gap.
    fn dodge_direction(
        &mut self,
        world: &WorldView<'_>,
        entity: &Entity,
        other: EntityHandle,
    ) -> Option<u8>;
}

/// Standard collaborator implementation over the region map and arena.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEnv;

impl StandardEnv {
    /// Create the standard environment.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Whether two entities mutually participate in collision.
fn mutually_collides(a: &Entity, b: &Entity) -> bool {
    a.flags.collides
        && !a.flags.no_collision
        && b.flags.collides
        && !b.flags.no_collision
        && a.flags.airborne == b.flags.airborne
}

impl MovementEnv for StandardEnv {
    fn plan_route(
        &mut self,
        world: &WorldView<'_>,
        entity: &mut Entity,
        target: Point,
        dodge_hint: Option<EntityHandle>,
    ) -> bool {
        // The trivial planner ignores the dodge hint; a full route search
        // would seed its blocked set with it.
        let _ = dodge_hint;
        if !world.map.in_bounds(target) {
            return false;
        }
        path::assign_simple_route(world.map, entity, target, target, world.tick).is_ok()
    }

    fn route_progress(&mut self, world: &WorldView<'_>, entity: &mut Entity) -> RouteCheck {
        let _ = world;
        let Some(route) = entity.path.as_mut() else {
            return RouteCheck::Stop;
        };
        if entity.position == route.next_point {
            let next_index = usize::from(route.position_index) + 1;
            if next_index >= usize::from(route.position_count) {
                return RouteCheck::Stop;
            }
            route.position_index = next_index as u8;
            route.next_point = route.waypoint(next_index);
            entity.next_waypoint = route.next_point;
        }
        RouteCheck::Continue
    }

    fn blocking_entity(
        &mut self,
        world: &WorldView<'_>,
        entity: &Entity,
        at: Point,
    ) -> Option<EntityHandle> {
        if !entity.flags.collides || entity.flags.no_collision {
            return None;
        }
        let mut nearest: Option<(u64, EntityHandle)> = None;
        for (handle, other) in world.arena.iter() {
            if other.hidden || !mutually_collides(entity, other) {
                continue;
            }
            if !entity.overlaps_at(at, other, other.position) {
                continue;
            }
            let dx = i64::from(at.x) - i64::from(other.position.x);
            let dy = i64::from(at.y) - i64::from(other.position.y);
            let dist = (dx * dx + dy * dy) as u64;
            // Canonical iteration order makes the strict < a deterministic
            // lowest-slot tie-break.
            if nearest.map_or(true, |(best, _)| dist < best) {
                nearest = Some((dist, handle));
            }
        }
        nearest.map(|(_, handle)| handle)
    }

    fn terrain_blocked(&mut self, world: &WorldView<'_>, entity: &Entity, at: Point) -> bool {
        if entity.flags.airborne {
            return false;
        }
        let b = &entity.bounds;
        let left = i32::from(at.x) - i32::from(b.left);
        let top = i32::from(at.y) - i32::from(b.top);
        let right = i32::from(at.x) + i32::from(b.right);
        let bottom = i32::from(at.y) + i32::from(b.bottom);
        if left < 0
            || top < 0
            || right >= i32::from(world.map.width())
            || bottom >= i32::from(world.map.height())
        {
            return true;
        }
        let corners = [
            Point::new(left as u16, top as u16),
            Point::new(right as u16, top as u16),
            Point::new(left as u16, bottom as u16),
            Point::new(right as u16, bottom as u16),
        ];
        corners.iter().any(|&corner| !world.map.is_walkable(corner))
    }

    fn blocks_point(
        &mut self,
        world: &WorldView<'_>,
        blocker: EntityHandle,
        entity: &Entity,
        point: Point,
    ) -> bool {
        world.arena.get(blocker).is_some_and(|other| {
            mutually_collides(entity, other) && entity.overlaps_at(point, other, other.position)
        })
    }

    fn dodge_direction(
        &mut self,
        world: &WorldView<'_>,
        entity: &Entity,
        other: EntityHandle,
    ) -> Option<u8> {
        let other_entity = world.arena.get(other)?;
        let to_other = direction_between(entity.position, other_entity.position);
        let clearance = i32::from(entity.bounds.left)
            + i32::from(entity.bounds.right)
            + i32::from(other_entity.bounds.left)
            + i32::from(other_entity.bounds.right);

        // Probe the side closer to the current heading first.
        let ccw = to_other.wrapping_sub(64);
        let cw = to_other.wrapping_add(64);
        let sides = if dir_diff(ccw, entity.movement_dir) <= dir_diff(cw, entity.movement_dir) {
            [ccw, cw]
        } else {
            [cw, ccw]
        };

        for side in sides {
            let probe = entity.position.step(side, clearance);
            if !self.terrain_blocked(world, entity, probe)
                && self.blocking_entity(world, entity, probe).is_none()
            {
                return Some(side);
            }
        }
        None
    }
}

/// Whether `entity` actually needs to dodge `other`.
///
/// Dodging is unnecessary when either party has collision disabled, and a
/// stale self-reference never reaches this check: the entity under
/// processing is absent from the arena, so its own handle fails the
/// liveness lookup first.
#[must_use]
pub fn needs_to_dodge(entity: &Entity, other: &Entity) -> bool {
    if entity.flags.airborne || entity.flags.no_collision || !entity.flags.collides {
        return false;
    }
    other.flags.collides && !other.flags.no_collision
}

/// Whether `subject` lies in front of `other`'s current displacement.
#[must_use]
pub fn in_front_of_movement(other: &Entity, subject: &Entity) -> bool {
    dir_diff(
        other.movement_dir,
        direction_between(other.position, subject.position),
    ) <= 32
}
