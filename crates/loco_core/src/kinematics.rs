//! Kinematics integration: turning, speed progression, and tentative
//! position computation.
//!
//! A movement step never writes the entity's position directly. Each
//! advance returns a [`MoveContext`] holding the tentative position and
//! velocity for this tick; the state machine decides whether to commit it.
//! Collision queries made on behalf of other entities therefore only ever
//! observe committed state, and the handoff between integration and the
//! state machine is an explicit value, not ambient shared scratch.

use crate::entity::{AccelModel, Entity, MotionFlags};
use crate::math::{
    direction_between, turn_step, velocity_for, Fixed, Point, Vec2Fixed,
};
use crate::region::RegionMap;

/// Tentative result of one movement step, produced by [`advance`] and
/// committed (or discarded) by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveContext {
    /// Tentative position in whole pixels.
    pub new_position: Point,
    /// Tentative sub-pixel position.
    pub new_exact: Vec2Fixed,
    /// Distance actually covered by this step.
    pub moved_speed: Fixed,
    /// Whether the step used the full speed, or was limited by snapping
    /// to the waypoint.
    pub full_speed: bool,
    /// Motion flags as of this step.
    pub flags: MotionFlags,
}

impl MoveContext {
    /// A stationary context at the entity's committed position.
    #[must_use]
    pub fn stationary(entity: &Entity, flags: MotionFlags) -> Self {
        Self {
            new_position: entity.position,
            new_exact: entity.exact_position,
            moved_speed: Fixed::ZERO,
            full_speed: true,
            flags,
        }
    }
}

/// Update the entity's target and heading directions toward its next
/// waypoint.
pub fn steer(entity: &mut Entity) {
    if entity.position == entity.next_waypoint {
        return;
    }
    entity.target_dir = direction_between(entity.position, entity.next_waypoint);
    entity.heading_dir = turn_step(entity.movement_dir, entity.target_dir, entity.turn_rate);
}

/// Rotate facing toward the target direction by the turn rate, clearing
/// the steering flag once every direction agrees.
pub fn progress_turning(entity: &mut Entity) {
    entity.facing = turn_step(entity.facing, entity.target_dir, entity.turn_rate);
    if entity.target_dir == entity.movement_dir && entity.target_dir == entity.facing {
        entity.motion.steering = false;
    }
}

/// Advance the scalar speed one tick under the entity's acceleration model.
pub fn progress_speed(entity: &mut Entity) {
    match entity.accel_model {
        AccelModel::FixedTopSpeed => {
            entity.current_speed = if entity.motion.immobilized {
                Fixed::ZERO
            } else {
                entity.top_speed
            };
        }
        AccelModel::DataDriven => {
            if entity.motion.in_motion && !entity.motion.immobilized {
                entity.current_speed =
                    (entity.current_speed + entity.acceleration).min(entity.top_speed);
            } else {
                entity.current_speed =
                    (entity.current_speed - entity.acceleration).max(Fixed::ZERO);
            }
        }
    }
}

/// One full movement step: steer toward the waypoint, progress speed,
/// refresh the moving flag, and integrate a tentative position.
///
/// Mutates only the entity's steering and speed state; the position result
/// is returned in the context.
pub fn advance(entity: &mut Entity) -> MoveContext {
    let mut flags = entity.motion;
    steer(entity);
    progress_speed(entity);
    flags.in_motion = !flags.immobilized && entity.next_waypoint != entity.position;
    entity.motion.in_motion = flags.in_motion;
    integrate(entity, flags)
}

/// Integrate a tentative position from the current heading and speed.
///
/// Snaps onto the waypoint when the remaining distance is within one
/// step, reporting the shortened distance and clearing `full_speed`.
#[must_use]
pub fn integrate(entity: &Entity, flags: MotionFlags) -> MoveContext {
    if !flags.in_motion || entity.current_speed == Fixed::ZERO {
        return MoveContext::stationary(entity, flags);
    }

    let waypoint = Vec2Fixed::from_point(entity.next_waypoint);
    let distance = entity.exact_position.distance(waypoint);
    if distance <= entity.current_speed {
        MoveContext {
            new_position: entity.next_waypoint,
            new_exact: waypoint,
            moved_speed: distance,
            full_speed: false,
            flags,
        }
    } else {
        let new_exact = entity.exact_position + velocity_for(entity.heading_dir, entity.current_speed);
        MoveContext {
            new_position: new_exact.to_point(),
            new_exact,
            moved_speed: entity.current_speed,
            full_speed: true,
            flags,
        }
    }
}

/// Integrate a tentative position along an explicit direction and speed,
/// bypassing waypoint snapping. Used by dodge slipping.
#[must_use]
pub fn advance_with(entity: &Entity, direction: u8, speed: Fixed) -> MoveContext {
    let mut flags = entity.motion;
    flags.in_motion = true;
    let new_exact = entity.exact_position + velocity_for(direction, speed);
    MoveContext {
        new_position: new_exact.to_point(),
        new_exact,
        moved_speed: speed,
        full_speed: true,
        flags,
    }
}

/// Derive a sub-step context covering `1/divisor` of another context's
/// displacement, truncating toward zero in raw fixed-point bits.
#[must_use]
pub fn scale_step(entity: &Entity, ctx: &MoveContext, divisor: i32) -> MoveContext {
    let dx = ctx.new_exact.x.to_bits() - entity.exact_position.x.to_bits();
    let dy = ctx.new_exact.y.to_bits() - entity.exact_position.y.to_bits();
    let new_exact = Vec2Fixed::new(
        Fixed::from_bits(entity.exact_position.x.to_bits() + dx / divisor),
        Fixed::from_bits(entity.exact_position.y.to_bits() + dy / divisor),
    );
    MoveContext {
        new_position: new_exact.to_point(),
        new_exact,
        moved_speed: Fixed::from_bits(ctx.moved_speed.to_bits() / divisor),
        full_speed: false,
        flags: ctx.flags,
    }
}

/// Commit a tentative step: adopt the position, velocity, and flags, then
/// progress turning. Returns whether the pixel position changed.
pub fn commit(entity: &mut Entity, ctx: &MoveContext) -> bool {
    let moved = ctx.new_position != entity.position;
    entity.position = ctx.new_position;
    entity.exact_position = ctx.new_exact;
    entity.movement_dir = entity.heading_dir;
    entity.motion = ctx.flags;
    entity.velocity = velocity_for(entity.movement_dir, entity.current_speed);
    entity.next_speed = entity.current_speed;
    progress_turning(entity);
    moved
}

/// Bring the entity to an immediate full stop in place, dropping any
/// remaining movement intent.
pub fn instant_stop(entity: &mut Entity) {
    entity.current_speed = Fixed::ZERO;
    entity.next_speed = Fixed::ZERO;
    entity.velocity = Vec2Fixed::ZERO;
    entity.motion.in_motion = false;
    entity.next_waypoint = entity.position;
    entity.move_target = entity.position;
}

/// Force the scalar speed, recomputing the per-axis velocity.
pub fn set_speed(entity: &mut Entity, speed: Fixed) {
    entity.current_speed = speed;
    entity.velocity = velocity_for(entity.movement_dir, speed);
}

/// Rotate in place toward the move target without advancing.
pub fn reorient(entity: &mut Entity) {
    if entity.position != entity.move_target {
        entity.target_dir = direction_between(entity.position, entity.move_target);
    }
    progress_turning(entity);
}

/// Adopt the heading as the movement direction and progress turning;
/// recovery step for movement that could not be committed.
pub fn adopt_heading(entity: &mut Entity) {
    entity.movement_dir = entity.heading_dir;
    progress_turning(entity);
}

/// Clamp the entity's move target and waypoint into map bounds, honoring
/// its bounding box. Flyers path to arbitrary coordinates, so their
/// targets are sanitized every tick.
pub fn clamp_move_target_in_bounds(entity: &mut Entity, map: &RegionMap) {
    entity.move_target = clamp_point(entity.move_target, &entity.bounds, map);
    entity.next_waypoint = clamp_point(entity.next_waypoint, &entity.bounds, map);
}

fn clamp_point(p: Point, bounds: &crate::entity::BoundingBox, map: &RegionMap) -> Point {
    let x = p
        .x
        .clamp(bounds.left, map.width().saturating_sub(bounds.right + 1));
    let y = p
        .y
        .clamp(bounds.top, map.height().saturating_sub(bounds.bottom + 1));
    Point::new(x, y)
}
