//! The per-tick movement state machine.
//!
//! Each tick, an entity with a movement intent is driven through one or
//! more state handlers. A handler reads committed state, asks the
//! kinematics collaborator for a tentative step, resolves collisions and
//! terrain against it through the [`MovementEnv`] seam, and deterministically
//! selects the next state and committed position. Dispatch is bounded: a
//! handler either ends the tick or hands off to a different state, and the
//! chain length is capped, so per-entity per-tick cost has a hard ceiling.
//!
//! Every retry in this module is bounded (at most the two graduated
//! sub-steps) and every unresolved situation yields a deterministic
//! transition; nothing here loops until conditions improve.

use serde::{Deserialize, Serialize};

use crate::collision::{in_front_of_movement, needs_to_dodge, MovementEnv, RouteCheck, WorldView};
use crate::entity::{Entity, EntityHandle, StandStill};
use crate::kinematics::{self, MoveContext};
use crate::math::{did_wrap, dir_diff, direction_between, velocity_for, Fixed, Point, Vec2Fixed};
use crate::region::RegionMap;

/// Movement state tag.
///
/// The transition graph between these states is part of the lockstep
/// contract; the discriminants themselves are an implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementState {
    /// No movement intent, or the current intent is satisfied.
    #[default]
    Idle,
    /// A route is needed before movement can continue.
    NeedsPath,
    /// Route planning failed; terminal until a new intent arrives.
    Failed,
    /// Following the current route.
    Following,
    /// Negotiating around a recorded blocking entity.
    ResolveDodge,
    /// Blocked by terrain with no entity involved.
    TerrainBlocked,
    /// Slipping laterally along a stored dodge direction.
    DodgeSlip,
    /// Settling in place while a blocker clears.
    Waiting,
    /// Flyer-specific movement, not bound by terrain regions.
    Flyer,
    /// Programmatic separation toward a stored point.
    Unstacking,
}

/// Ticks after a route starts during which disruptive dodge outcomes are
/// suppressed in favor of re-orienting, to avoid oscillation.
pub const ROUTE_GRACE_TICKS: u64 = 7;

/// Contention threshold above which a blocker's route counts as settled.
pub const BLOCKER_STABLE_TICKS: u8 = 30;

/// Contention level a cleanly-following entity decays to.
pub const CONTENTION_SETTLED_THRESHOLD: u8 = 2;

/// Interval of the countdown cycled while following cleanly.
pub const REPATH_INTERVAL_TICKS: u8 = 30;

/// Route age beyond which a finished dodge slip replans instead of
/// resuming the route.
pub const ROUTE_STALE_AGE_TICKS: u64 = 150;

/// Ticks an entity settles in [`MovementState::Waiting`] before replanning.
pub const SETTLE_WAIT_TICKS: u8 = 25;

/// Terrain recovery attempts before giving up and replanning.
const TERRAIN_RETRY_LIMIT: u8 = 2;

/// Graduated sub-step divisors: half, then quarter, of the planned
/// displacement.
const SUBSTEP_DIVISORS: [i32; 2] = [2, 4];

/// Upper bound on handler chaining within one tick.
const MAX_DISPATCH: u32 = 6;

/// Whether a handler finished the entity's tick or handed off to the next
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Done,
    Continue,
}

/// Drive one entity through its movement handlers for this tick.
///
/// The entity has been taken out of the arena; `world` exposes the other
/// entities at their committed positions.
pub fn run(entity: &mut Entity, world: &WorldView<'_>, env: &mut dyn MovementEnv) {
    for _ in 0..MAX_DISPATCH {
        let before = entity.state;
        let progress = match entity.state {
            MovementState::Idle => idle(entity),
            MovementState::NeedsPath => needs_path(entity, world, env),
            MovementState::Failed => Progress::Done,
            MovementState::Following => following(entity, world, env),
            MovementState::ResolveDodge => resolve_dodge(entity, world, env),
            MovementState::TerrainBlocked => terrain_blocked(entity, world, env),
            MovementState::DodgeSlip => dodge_slip(entity, world, env),
            MovementState::Waiting => waiting(entity, world, env),
            MovementState::Flyer => flyer(entity, world),
            MovementState::Unstacking => unstacking(entity, world),
        };
        if entity.state != before {
            tracing::trace!(from = ?before, to = ?entity.state, "movement transition");
        }
        match progress {
            Progress::Done => break,
            Progress::Continue if entity.state == before => break,
            Progress::Continue => {}
        }
    }
}

/// Shared reaction to the route-progress collaborator reporting stop:
/// arrival settles to Idle, a lost route replans.
fn handle_route_stop(entity: &mut Entity) {
    if entity.position == entity.move_target {
        kinematics::instant_stop(entity);
        entity.flags.move_target_updated = false;
        entity.state = MovementState::Idle;
    } else {
        entity.state = MovementState::NeedsPath;
    }
}

fn idle(entity: &mut Entity) -> Progress {
    if entity.standing_still() == StandStill::Moving && !entity.motion.immobilized {
        entity.state = MovementState::NeedsPath;
        return Progress::Continue;
    }
    Progress::Done
}

fn needs_path(entity: &mut Entity, world: &WorldView<'_>, env: &mut dyn MovementEnv) -> Progress {
    // Capture the dodge reference out of the released path; it lives only
    // for the duration of this planning attempt.
    let dodge_hint = entity.path.take().and_then(|route| route.dodge_entity);

    if entity.standing_still() != StandStill::Moving || entity.motion.immobilized {
        entity.state = MovementState::Idle;
        return Progress::Done;
    }

    let target = entity.move_target;
    if env.plan_route(world, entity, target, dodge_hint) {
        entity.state = MovementState::Following;
        Progress::Continue
    } else {
        entity.state = MovementState::Failed;
        Progress::Done
    }
}

fn following(entity: &mut Entity, world: &WorldView<'_>, env: &mut dyn MovementEnv) -> Progress {
    if env.route_progress(world, entity) == RouteCheck::Stop {
        handle_route_stop(entity);
        return Progress::Done;
    }
    // Re-validate the route before advancing.
    let Some(route) = entity.path.as_ref() else {
        entity.state = MovementState::Failed;
        return Progress::Done;
    };
    if route.next_point != entity.next_waypoint {
        entity.state = MovementState::Failed;
        return Progress::Done;
    }

    let ctx = kinematics::advance(entity);
    let blocker = env.blocking_entity(world, entity, ctx.new_position);
    let terrain = env.terrain_blocked(world, entity, ctx.new_position);

    match (terrain, blocker) {
        (true, None) => {
            record_blocking(entity, None);
            entity.state = MovementState::TerrainBlocked;
            Progress::Done
        }
        (true, Some(handle)) => {
            record_blocking(entity, Some(handle));
            entity.state = MovementState::ResolveDodge;
            Progress::Done
        }
        (false, Some(handle)) => {
            // Emulate finer time-slicing: retry at half, then quarter, of
            // the planned displacement before accepting the collision.
            for divisor in SUBSTEP_DIVISORS {
                let sub = kinematics::scale_step(entity, &ctx, divisor);
                if env.blocking_entity(world, entity, sub.new_position).is_none()
                    && !env.terrain_blocked(world, entity, sub.new_position)
                {
                    kinematics::commit(entity, &sub);
                    after_clean_step(entity);
                    return Progress::Done;
                }
            }
            if !would_face_blocker(entity, world, handle) {
                // The collision is an artifact of mid-turn heading; keep
                // re-orienting instead of entering a dodge.
                kinematics::reorient(entity);
                return Progress::Done;
            }
            record_blocking(entity, Some(handle));
            entity.state = MovementState::ResolveDodge;
            Progress::Done
        }
        (false, None) => {
            kinematics::commit(entity, &ctx);
            after_clean_step(entity);
            if entity.current_speed == Fixed::ZERO {
                entity.state = MovementState::Idle;
            }
            Progress::Done
        }
    }
}

/// Capture the speed (and optionally the blocker) on the path at the
/// moment of a blocking collision.
fn record_blocking(entity: &mut Entity, blocker: Option<EntityHandle>) {
    let speed = entity.current_speed;
    if let Some(route) = entity.path.as_mut() {
        route.retained_speed = speed;
        if blocker.is_some() {
            route.dodge_entity = blocker;
        }
    }
}

/// Bookkeeping after a committed collision-free step: contention decays
/// toward zero (clamped to the settled threshold) and the repath countdown
/// cycles.
fn after_clean_step(entity: &mut Entity) {
    entity.contention_ticks = entity
        .contention_ticks
        .saturating_sub(1)
        .min(CONTENTION_SETTLED_THRESHOLD);
    if let Some(route) = entity.path.as_mut() {
        if route.repath_countdown == 0 {
            route.repath_countdown = REPATH_INTERVAL_TICKS;
        } else {
            route.repath_countdown -= 1;
        }
    }
}

/// Whether the entity, once properly turned toward its target, would still
/// be headed at the blocker. If not, the collision is transient turning
/// noise and a dodge would be spurious.
fn would_face_blocker(entity: &Entity, world: &WorldView<'_>, blocker: EntityHandle) -> bool {
    let Some(other) = world.arena.get(blocker) else {
        return false;
    };
    let dir_to_target = if entity.position == entity.next_waypoint {
        entity.movement_dir
    } else {
        direction_between(entity.position, entity.next_waypoint)
    };
    let dir_to_blocker = direction_between(entity.position, other.position);
    dir_diff(dir_to_target, dir_to_blocker) <= 64
}

/// Classification outcome of a dodge encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DodgeOutcome {
    /// The move target is effectively reached; stop there.
    StopAtTarget,
    /// Stop where we are; the target is squatted on by a settled blocker.
    StopInPlace,
    /// Abandon the route and replan.
    Replan,
    /// Short lateral detour around a blocker crossing our front.
    Detour,
    /// Stop dead and replan; no gap to slip through.
    FullStopWait,
    /// Settle in place until the blocker clears.
    Settle,
    /// Slip laterally along the found gap direction.
    Slip(u8),
}

fn resolve_dodge(entity: &mut Entity, world: &WorldView<'_>, env: &mut dyn MovementEnv) -> Progress {
    if env.route_progress(world, entity) == RouteCheck::Stop {
        handle_route_stop(entity);
        return Progress::Done;
    }
    if entity.contention_ticks < u8::MAX {
        entity.contention_ticks += 1;
    }

    let Some(route) = entity.path.as_deref() else {
        entity.state = MovementState::NeedsPath;
        return Progress::Continue;
    };
    let route_age = route.age(world.tick);
    let Some(other_handle) = route.dodge_entity else {
        entity.state = MovementState::Following;
        return Progress::Continue;
    };

    // Revalidate the recorded blocker on every use: it may have been
    // destroyed, be mid-death, or have gone invisible since last tick.
    let candidate = world
        .arena
        .get(other_handle)
        .filter(|other| !other.dying && !other.hidden && needs_to_dodge(entity, *other));
    let Some(other) = candidate else {
        if let Some(route) = entity.path.as_mut() {
            route.dodge_entity = None;
        }
        entity.state = MovementState::Following;
        return Progress::Continue;
    };

    let outcome = classify(entity, other_handle, other, world, env);

    if route_age < ROUTE_GRACE_TICKS
        && matches!(
            outcome,
            DodgeOutcome::Replan | DodgeOutcome::Detour | DodgeOutcome::FullStopWait
        )
    {
        // Right after a route starts these outcomes oscillate; just turn
        // toward the target instead.
        kinematics::set_speed(entity, Fixed::ZERO);
        kinematics::reorient(entity);
        return Progress::Done;
    }

    let detour_dir = lateral_detour_direction(entity, other);
    match outcome {
        DodgeOutcome::StopAtTarget => {
            kinematics::instant_stop(entity);
            entity.flags.move_target_updated = false;
            entity.state = MovementState::Idle;
        }
        DodgeOutcome::StopInPlace => {
            kinematics::instant_stop(entity);
            entity.state = MovementState::Idle;
        }
        DodgeOutcome::Replan => {
            entity.state = MovementState::NeedsPath;
        }
        DodgeOutcome::FullStopWait => {
            kinematics::set_speed(entity, Fixed::ZERO);
            entity.state = MovementState::NeedsPath;
        }
        DodgeOutcome::Settle => {
            entity.state = MovementState::Waiting;
        }
        DodgeOutcome::Detour => {
            if let Some(route) = entity.path.as_mut() {
                route.dodge_direction = detour_dir;
            }
            entity.state = MovementState::DodgeSlip;
        }
        DodgeOutcome::Slip(direction) => {
            if let Some(route) = entity.path.as_mut() {
                route.dodge_entity = Some(other_handle);
                route.dodge_direction = direction;
            }
            entity.state = MovementState::DodgeSlip;
        }
    }
    Progress::Continue
}

/// Deterministic classification of a dodge encounter. Exactly one outcome
/// is selected from the blocker's relation to our target and waypoint, its
/// own route stability, and its motion.
fn classify(
    entity: &Entity,
    other_handle: EntityHandle,
    other: &Entity,
    world: &WorldView<'_>,
    env: &mut dyn MovementEnv,
) -> DodgeOutcome {
    // Tracking a target entity and already in contact with it counts as
    // reaching the move target.
    if let Some(target_handle) = entity.move_target_entity {
        if let Some(target) = world.arena.get(target_handle) {
            if entity.overlaps_at(entity.position, target, target.position) {
                return DodgeOutcome::StopAtTarget;
            }
        }
    }

    let blocks_target = env.blocks_point(world, other_handle, entity, entity.move_target);
    if blocks_target && entity.overlaps_at(entity.position, other, other.position) {
        // As close to the target as the blocker allows.
        return DodgeOutcome::StopAtTarget;
    }
    if blocks_target {
        if other.contention_ticks < BLOCKER_STABLE_TICKS
            && !entity.overlaps_at(entity.move_target, other, other.move_target)
        {
            // The blocker is transient: it has not settled and its own
            // destination clears our target.
            return if in_front_of_movement(other, entity) {
                DodgeOutcome::Detour
            } else {
                DodgeOutcome::Settle
            };
        }
        return if entity.move_target_entity.is_some() {
            DodgeOutcome::Replan
        } else {
            DodgeOutcome::StopInPlace
        };
    }

    if env.blocks_point(world, other_handle, entity, entity.next_waypoint) {
        if other.contention_ticks < BLOCKER_STABLE_TICKS
            && !entity.overlaps_at(entity.next_waypoint, other, other.move_target)
        {
            return if in_front_of_movement(other, entity) {
                DodgeOutcome::Detour
            } else {
                DodgeOutcome::Settle
            };
        }
        return DodgeOutcome::Replan;
    }

    if other.is_moving_away_from(entity) {
        return DodgeOutcome::Settle;
    }

    // Neither endpoint is blocked; judge by what the blocker itself is
    // doing. A blocker with unresolved contention counts as waiting no
    // matter what its state tag says.
    let effective_state = if other.contention_ticks > CONTENTION_SETTLED_THRESHOLD {
        MovementState::Waiting
    } else {
        other.state
    };
    if other.motion.in_motion && other.standing_still() == StandStill::Moving {
        match effective_state {
            MovementState::Following | MovementState::ResolveDodge => DodgeOutcome::Settle,
            MovementState::Waiting => gap_or_stop(entity, other_handle, world, env),
            _ => DodgeOutcome::Detour,
        }
    } else {
        gap_or_stop(entity, other_handle, world, env)
    }
}

fn gap_or_stop(
    entity: &Entity,
    other_handle: EntityHandle,
    world: &WorldView<'_>,
    env: &mut dyn MovementEnv,
) -> DodgeOutcome {
    env.dodge_direction(world, entity, other_handle)
        .map_or(DodgeOutcome::FullStopWait, DodgeOutcome::Slip)
}

/// Lateral direction for a short detour: perpendicular to the blocker,
/// on the side closer to the current heading.
fn lateral_detour_direction(entity: &Entity, other: &Entity) -> u8 {
    let to_other = direction_between(entity.position, other.position);
    let ccw = to_other.wrapping_sub(64);
    let cw = to_other.wrapping_add(64);
    if dir_diff(ccw, entity.movement_dir) <= dir_diff(cw, entity.movement_dir) {
        ccw
    } else {
        cw
    }
}

fn terrain_blocked(entity: &mut Entity, world: &WorldView<'_>, env: &mut dyn MovementEnv) -> Progress {
    if env.route_progress(world, entity) == RouteCheck::Stop {
        handle_route_stop(entity);
        return Progress::Done;
    }
    if entity.contention_ticks < u8::MAX {
        entity.contention_ticks += 1;
    }
    let Some(route) = entity.path.as_ref() else {
        entity.state = MovementState::NeedsPath;
        return Progress::Continue;
    };

    // Resume from the speed held when the collision was recorded.
    kinematics::set_speed(entity, route.retained_speed);
    let full = kinematics::advance(entity);
    let candidates = [
        full,
        kinematics::scale_step(entity, &full, SUBSTEP_DIVISORS[0]),
        kinematics::scale_step(entity, &full, SUBSTEP_DIVISORS[1]),
    ];
    for ctx in candidates {
        if env.terrain_blocked(world, entity, ctx.new_position) {
            continue;
        }
        if let Some(handle) = env.blocking_entity(world, entity, ctx.new_position) {
            record_blocking(entity, Some(handle));
            entity.state = MovementState::ResolveDodge;
            return Progress::Continue;
        }
        kinematics::commit(entity, &ctx);
        entity.state = MovementState::Following;
        return Progress::Done;
    }

    let mut give_up = false;
    if let Some(route) = entity.path.as_mut() {
        route.retry_count += 1;
        if route.retry_count >= TERRAIN_RETRY_LIMIT {
            route.retry_count = 0;
            give_up = true;
        }
    }
    if give_up {
        entity.state = MovementState::NeedsPath;
        Progress::Continue
    } else {
        kinematics::reorient(entity);
        Progress::Done
    }
}

fn dodge_slip(entity: &mut Entity, world: &WorldView<'_>, env: &mut dyn MovementEnv) -> Progress {
    if entity.contention_ticks < u8::MAX {
        entity.contention_ticks += 1;
    }
    if env.route_progress(world, entity) == RouteCheck::Stop {
        handle_route_stop(entity);
        return Progress::Done;
    }
    let Some(route) = entity.path.as_deref() else {
        entity.state = MovementState::NeedsPath;
        return Progress::Continue;
    };
    let dodge = route.dodge_entity;
    let slip_dir = route.dodge_direction;
    let route_age = route.age(world.tick);

    entity.motion.steering = true;
    entity.target_dir = slip_dir;
    kinematics::progress_turning(entity);
    entity.motion.in_motion = true;
    kinematics::progress_speed(entity);

    let original_dir = entity.movement_dir;
    let original_speed = entity.current_speed;
    entity.next_speed = original_speed;

    // Slip in one-pixel slices so each fraction of the step is collision
    // checked; the 256-unit scale of the arithmetic is part of the
    // lockstep contract.
    let mut remaining = original_speed;
    let mut next_state = MovementState::DodgeSlip;
    let mut colliding = None;
    while remaining > Fixed::ZERO {
        let step = remaining.min(Fixed::ONE);
        remaining -= Fixed::ONE;
        entity.motion.steering = false;
        let ctx = kinematics::advance_with(entity, slip_dir, step);
        if env.blocking_entity(world, entity, ctx.new_position).is_some()
            || env.terrain_blocked(world, entity, ctx.new_position)
        {
            next_state = MovementState::TerrainBlocked;
            break;
        }
        kinematics::commit(entity, &ctx);
        entity.movement_dir = original_dir;
        kinematics::steer(entity);
        let probe = kinematics::advance_with(entity, entity.heading_dir, original_speed);
        colliding = env.blocking_entity(world, entity, probe.new_position);
        if colliding != dodge {
            break;
        }
    }

    entity.heading_dir = original_dir;
    entity.movement_dir = original_dir;
    entity.current_speed = original_speed;
    entity.velocity = velocity_for(original_dir, original_speed);

    if next_state != MovementState::DodgeSlip {
        entity.state = next_state;
        return Progress::Continue;
    }
    if colliding.is_some() {
        // Blocked ahead by someone new; hold the slip and try again next
        // tick.
        return Progress::Done;
    }
    entity.motion.steering = true;
    if route_age >= ROUTE_STALE_AGE_TICKS {
        entity.state = MovementState::NeedsPath;
    } else {
        entity.state = MovementState::Following;
    }
    Progress::Continue
}

fn waiting(entity: &mut Entity, world: &WorldView<'_>, env: &mut dyn MovementEnv) -> Progress {
    if env.route_progress(world, entity) == RouteCheck::Stop {
        handle_route_stop(entity);
        return Progress::Done;
    }
    if entity.contention_ticks < u8::MAX {
        entity.contention_ticks += 1;
    }
    entity.motion.in_motion = false;
    kinematics::progress_speed(entity);

    let dodge = entity.path.as_ref().and_then(|route| route.dodge_entity);
    let blocker_cleared = match dodge {
        None => true,
        Some(handle) => world
            .arena
            .get(handle)
            .map_or(true, |other| {
                other.dying || other.hidden || other.is_moving_away_from(entity)
            }),
    };

    let Some(route) = entity.path.as_mut() else {
        entity.state = MovementState::NeedsPath;
        return Progress::Continue;
    };
    route.retry_count += 1;
    if blocker_cleared {
        route.retry_count = 0;
        entity.motion.in_motion = true;
        entity.state = MovementState::Following;
        return Progress::Continue;
    }
    if route.retry_count >= SETTLE_WAIT_TICKS {
        route.retry_count = 0;
        entity.state = MovementState::NeedsPath;
        return Progress::Continue;
    }
    Progress::Done
}

fn flyer(entity: &mut Entity, world: &WorldView<'_>) -> Progress {
    kinematics::clamp_move_target_in_bounds(entity, world.map);
    let mut ctx = kinematics::advance(entity);
    let repulsed = apply_repulse_pre(entity, &mut ctx);
    clamp_flyer_bounds(entity, &mut ctx, world.map);
    kinematics::commit(entity, &ctx);
    finish_repulse(entity, repulsed, world.map);
    Progress::Done
}

/// First half of an active repulse effect, folded into the tentative step
/// before it is committed.
fn apply_repulse_pre(entity: &Entity, ctx: &mut MoveContext) -> bool {
    let Some(repulse) = entity.repulse else {
        return false;
    };
    ctx.new_exact = Vec2Fixed::new(
        Fixed::from_bits(ctx.new_exact.x.to_bits() + repulse.offset.x.to_bits() / 2),
        Fixed::from_bits(ctx.new_exact.y.to_bits() + repulse.offset.y.to_bits() / 2),
    );
    ctx.new_position = ctx.new_exact.to_point();
    true
}

/// Second half of the repulse effect, applied to the committed position,
/// then the effect's lifetime is ticked down.
fn finish_repulse(entity: &mut Entity, repulsed: bool, map: &RegionMap) {
    if !repulsed {
        return;
    }
    let Some(mut repulse) = entity.repulse else {
        return;
    };
    let pushed = Vec2Fixed::new(
        Fixed::from_bits(entity.exact_position.x.to_bits() + repulse.offset.x.to_bits() / 2),
        Fixed::from_bits(entity.exact_position.y.to_bits() + repulse.offset.y.to_bits() / 2),
    );
    let mut ctx = MoveContext {
        new_position: pushed.to_point(),
        new_exact: pushed,
        moved_speed: Fixed::ZERO,
        full_speed: true,
        flags: entity.motion,
    };
    clamp_flyer_bounds(entity, &mut ctx, map);
    entity.position = ctx.new_position;
    entity.exact_position = ctx.new_exact;

    repulse.ticks = repulse.ticks.saturating_sub(1);
    entity.repulse = if repulse.ticks == 0 {
        None
    } else {
        Some(repulse)
    };
}

/// Clamp a tentative flyer position into map bounds component-wise,
/// treating a wrapped coordinate as having crossed the near edge.
fn clamp_flyer_bounds(entity: &Entity, ctx: &mut MoveContext, map: &RegionMap) {
    let bounds = &entity.bounds;
    let old = entity.position;
    let mut p = ctx.new_position;

    if p.x < bounds.left || did_wrap(p.x, old.x) {
        p.x = bounds.left;
    } else if i32::from(p.x) + i32::from(bounds.right) >= i32::from(map.width()) {
        p.x = map.width() - bounds.right - 1;
    }
    if p.y < bounds.top || did_wrap(p.y, old.y) {
        p.y = bounds.top;
    } else if i32::from(p.y) + i32::from(bounds.bottom) >= i32::from(map.height()) {
        p.y = map.height() - bounds.bottom - 1;
    }

    if p != ctx.new_position {
        ctx.new_position = p;
        ctx.new_exact = Vec2Fixed::from_point(p);
    }
}

/// Whether an entity's bounding box at `p` would exit map bounds.
fn box_out_of_bounds(entity: &Entity, p: Point, map: &RegionMap) -> bool {
    i32::from(p.x) - i32::from(entity.bounds.left) < 0
        || i32::from(p.y) - i32::from(entity.bounds.top) < 0
        || i32::from(p.x) + i32::from(entity.bounds.right) >= i32::from(map.width())
        || i32::from(p.y) + i32::from(entity.bounds.bottom) >= i32::from(map.height())
}

fn unstacking(entity: &mut Entity, world: &WorldView<'_>) -> Progress {
    let Some(route) = entity.path.as_ref() else {
        entity.state = MovementState::NeedsPath;
        return Progress::Continue;
    };
    if route.next_point == entity.position {
        // Separation complete.
        entity.state = MovementState::Idle;
        return Progress::Done;
    }
    let ctx = kinematics::advance(entity);
    if box_out_of_bounds(entity, ctx.new_position, world.map) {
        if entity.motion.in_motion && entity.position != entity.next_waypoint {
            entity.state = MovementState::Idle;
            return Progress::Done;
        }
        // Advance a second time and re-orient; recovery for a step that
        // could not be committed.
        let _ = kinematics::advance(entity);
        kinematics::adopt_heading(entity);
        return Progress::Done;
    }
    kinematics::commit(entity, &ctx);
    Progress::Done
}
