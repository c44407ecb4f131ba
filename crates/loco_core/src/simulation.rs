//! Core simulation loop.
//!
//! Owns the static pathing data and the entity arena, and advances all
//! entities one tick at a time. Execution is single-threaded and
//! cooperative at tick granularity: entities are processed in canonical
//! ascending arena order, each handler runs to completion, and collision
//! queries made while processing one entity observe only other entities'
//! already-committed positions. That ordering is part of the correctness
//! contract; independent replicas fed identical command streams must reach
//! bit-identical state.
//!
//! # Determinism
//!
//! - No floating-point math (fixed-point via [`Fixed`])
//! - No system randomness
//! - Canonical entity iteration order
//! - Same inputs always produce same outputs

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::collision::{MovementEnv, StandardEnv, WorldView};
use crate::entity::{
    AccelModel, BoundingBox, Entity, EntityArena, EntityHandle, Repulse,
};
use crate::error::{MovementError, Result};
use crate::kinematics;
use crate::math::{Fixed, Point, Vec2Fixed};
use crate::movement::{self, MovementState};
use crate::path;
use crate::region::RegionMap;

/// Parameters for spawning a new entity.
#[derive(Debug, Clone)]
pub struct EntitySpawnParams {
    /// Initial position in world pixels.
    pub position: Point,
    /// Top speed in pixels per tick.
    pub top_speed: Fixed,
    /// Acceleration per tick (data-driven model).
    pub acceleration: Fixed,
    /// Acceleration model.
    pub accel_model: AccelModel,
    /// Turn rate in direction steps per tick.
    pub turn_rate: u8,
    /// Collision bounding box.
    pub bounds: BoundingBox,
    /// Whether the entity flies.
    pub airborne: bool,
    /// Whether the entity participates in collision.
    pub collides: bool,
}

impl Default for EntitySpawnParams {
    fn default() -> Self {
        Self {
            position: Point::ZERO,
            top_speed: Fixed::from_num(4),
            acceleration: Fixed::from_bits(17),
            accel_model: AccelModel::DataDriven,
            turn_rate: 8,
            bounds: BoundingBox::default(),
            airborne: false,
            collides: true,
        }
    }
}

/// Events generated during a simulation tick.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Entities that reached their move target this tick.
    pub arrivals: Vec<EntityHandle>,
    /// Entities whose route planning failed this tick.
    pub plan_failures: Vec<EntityHandle>,
}

/// The movement simulation: static pathing data plus all entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    /// Current simulation tick.
    tick: u64,
    /// Static per-map pathing lookup.
    map: RegionMap,
    /// All entities.
    arena: EntityArena,
}

impl Simulation {
    /// Create a simulation over the default open map.
    #[must_use]
    pub fn new() -> Self {
        Self::with_map(RegionMap::default())
    }

    /// Create a simulation over a specific map.
    #[must_use]
    pub fn with_map(map: RegionMap) -> Self {
        Self {
            tick: 0,
            map,
            arena: EntityArena::new(),
        }
    }

    /// Current tick number.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// The static pathing data.
    #[must_use]
    pub const fn map(&self) -> &RegionMap {
        &self.map
    }

    /// The entity arena.
    #[must_use]
    pub const fn arena(&self) -> &EntityArena {
        &self.arena
    }

    /// Spawn an entity from spawn parameters.
    pub fn spawn(&mut self, params: EntitySpawnParams) -> Result<EntityHandle> {
        let mut entity = Entity::at(params.position, params.top_speed);
        entity.acceleration = params.acceleration;
        entity.accel_model = params.accel_model;
        entity.turn_rate = params.turn_rate;
        entity.bounds = params.bounds;
        entity.flags.airborne = params.airborne;
        entity.flags.collides = params.collides;
        if params.airborne {
            entity.state = MovementState::Flyer;
        }
        self.arena.spawn(entity)
    }

    /// Remove an entity. Handles held elsewhere (dodge references
    /// included) become stale and fail their generation check from now on.
    pub fn despawn(&mut self, handle: EntityHandle) -> Result<()> {
        self.arena
            .despawn(handle)
            .map(|_| ())
            .ok_or(MovementError::EntityNotFound(handle.index()))
    }

    /// Borrow an entity.
    #[must_use]
    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.arena.get(handle)
    }

    /// Mutably borrow an entity.
    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.arena.get_mut(handle)
    }

    /// Order an entity to move to a position.
    pub fn command_move(&mut self, handle: EntityHandle, target: Point) -> Result<()> {
        let entity = self
            .arena
            .get_mut(handle)
            .ok_or(MovementError::EntityNotFound(handle.index()))?;
        entity.move_target = target;
        entity.move_target_entity = None;
        entity.flags.move_target_updated = true;
        entity.motion.in_motion = true;
        if entity.flags.airborne {
            entity.next_waypoint = target;
            entity.state = MovementState::Flyer;
        } else {
            entity.state = MovementState::NeedsPath;
        }
        Ok(())
    }

    /// Order an entity to move onto another entity's position.
    pub fn command_follow(&mut self, handle: EntityHandle, target: EntityHandle) -> Result<()> {
        let target_position = self
            .arena
            .get(target)
            .ok_or(MovementError::EntityNotFound(target.index()))?
            .position;
        let entity = self
            .arena
            .get_mut(handle)
            .ok_or(MovementError::EntityNotFound(handle.index()))?;
        entity.move_target = target_position;
        entity.move_target_entity = Some(target);
        entity.flags.move_target_updated = true;
        entity.motion.in_motion = true;
        if entity.flags.airborne {
            entity.next_waypoint = target_position;
            entity.state = MovementState::Flyer;
        } else {
            entity.state = MovementState::NeedsPath;
        }
        Ok(())
    }

    /// Stop an entity where it stands and drop its movement intent.
    pub fn command_stop(&mut self, handle: EntityHandle) -> Result<()> {
        let entity = self
            .arena
            .get_mut(handle)
            .ok_or(MovementError::EntityNotFound(handle.index()))?;
        kinematics::instant_stop(entity);
        entity.move_target = entity.position;
        entity.move_target_entity = None;
        entity.flags.move_target_updated = false;
        entity.path = None;
        if !entity.flags.airborne {
            entity.state = MovementState::Idle;
        }
        Ok(())
    }

    /// Separate an entity programmatically toward `point` using the
    /// forced-unstack movement path.
    pub fn force_unstack(&mut self, handle: EntityHandle, point: Point) -> Result<()> {
        let tick = self.tick;
        let map = &self.map;
        let entity = self
            .arena
            .get_mut(handle)
            .ok_or(MovementError::EntityNotFound(handle.index()))?;
        path::assign_simple_route(map, entity, point, point, tick)?;
        entity.move_target = point;
        entity.motion.in_motion = true;
        entity.state = MovementState::Unstacking;
        Ok(())
    }

    /// Attach a repulsion effect to a flyer.
    pub fn apply_repulse(&mut self, handle: EntityHandle, offset: Vec2Fixed, ticks: u8) -> Result<()> {
        let entity = self
            .arena
            .get_mut(handle)
            .ok_or(MovementError::EntityNotFound(handle.index()))?;
        entity.repulse = Some(Repulse { offset, ticks });
        Ok(())
    }

    /// Advance the simulation one tick with the standard collaborators.
    pub fn tick(&mut self) -> TickEvents {
        let mut env = StandardEnv::new();
        self.tick_with(&mut env)
    }

    /// Advance the simulation one tick with caller-supplied collaborators.
    ///
    /// Entities are processed in canonical order; each entity is taken out
    /// of the arena for the duration of its handler so collaborator
    /// queries can only observe committed positions.
    pub fn tick_with(&mut self, env: &mut dyn MovementEnv) -> TickEvents {
        let mut events = TickEvents::default();

        for handle in self.arena.handles() {
            let Some(mut entity) = self.arena.take(handle) else {
                continue;
            };
            let before = entity.state;
            {
                let world = WorldView {
                    map: &self.map,
                    arena: &self.arena,
                    tick: self.tick,
                };
                movement::run(&mut entity, &world, env);
            }
            if entity.state != before {
                if entity.state == MovementState::Failed {
                    events.plan_failures.push(handle);
                }
                if entity.state == MovementState::Idle && entity.position == entity.move_target {
                    events.arrivals.push(handle);
                }
            }
            self.arena.restore(handle, entity);
        }

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "simulation state hash");
        }

        events
    }

    /// Deterministic hash of the full simulation state.
    ///
    /// Identical replicas must produce identical hashes after identical
    /// command streams; this is the desync check used by the determinism
    /// harness.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        let handles = self.arena.handles();
        handles.len().hash(&mut hasher);
        for handle in handles {
            handle.hash(&mut hasher);
            if let Some(entity) = self.arena.get(handle) {
                entity.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Serialize the full simulation state.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MovementError::SnapshotError(e.to_string()))
    }

    /// Restore a simulation from a serialized snapshot.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| MovementError::SnapshotError(e.to_string()))
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(position: Point) -> EntitySpawnParams {
        EntitySpawnParams {
            position,
            accel_model: AccelModel::FixedTopSpeed,
            ..EntitySpawnParams::default()
        }
    }

    #[test]
    fn test_move_command_reaches_target() {
        let mut sim = Simulation::new();
        let unit = sim.spawn(fast(Point::new(100, 100))).unwrap();
        sim.command_move(unit, Point::new(300, 300)).unwrap();

        let mut arrived = false;
        for _ in 0..200 {
            if sim.tick().arrivals.contains(&unit) {
                arrived = true;
                break;
            }
        }
        assert!(arrived);
        let entity = sim.get(unit).unwrap();
        assert_eq!(entity.position, Point::new(300, 300));
        assert_eq!(entity.state, MovementState::Idle);
        assert!(!entity.flags.move_target_updated);
    }

    #[test]
    fn test_plan_failure_event() {
        let mut sim = Simulation::new();
        let unit = sim.spawn(fast(Point::new(100, 100))).unwrap();
        // Target outside the map: the trivial planner refuses it.
        sim.command_move(unit, Point::new(60000, 100)).unwrap();
        let events = sim.tick();
        assert!(events.plan_failures.contains(&unit));
        assert_eq!(sim.get(unit).unwrap().state, MovementState::Failed);
    }

    #[test]
    fn test_stop_command_clears_intent() {
        let mut sim = Simulation::new();
        let unit = sim.spawn(fast(Point::new(100, 100))).unwrap();
        sim.command_move(unit, Point::new(400, 100)).unwrap();
        for _ in 0..10 {
            sim.tick();
        }
        sim.command_stop(unit).unwrap();
        let position = sim.get(unit).unwrap().position;
        for _ in 0..10 {
            sim.tick();
        }
        let entity = sim.get(unit).unwrap();
        assert_eq!(entity.position, position);
        assert_eq!(entity.state, MovementState::Idle);
        assert!(entity.path.is_none());
    }

    #[test]
    fn test_two_entities_negotiate_deterministically() {
        let setup = || {
            let mut sim = Simulation::new();
            let a = sim.spawn(fast(Point::new(100, 200))).unwrap();
            let b = sim.spawn(fast(Point::new(400, 200))).unwrap();
            sim.command_move(a, Point::new(400, 200)).unwrap();
            sim.command_move(b, Point::new(100, 200)).unwrap();
            sim
        };
        let mut first = setup();
        let mut second = setup();
        for _ in 0..300 {
            first.tick();
            second.tick();
            assert_eq!(first.state_hash(), second.state_hash());
        }
    }

    #[test]
    fn test_crowded_scenario_is_deterministic() {
        let setup = || {
            let mut sim = Simulation::new();
            let mut units = Vec::new();
            for i in 0..8u16 {
                let unit = sim
                    .spawn(fast(Point::new(100 + i * 20, 100 + (i % 4) * 20)))
                    .unwrap();
                units.push(unit);
            }
            for (i, unit) in units.iter().enumerate() {
                let target = Point::new(400 - (i as u16) * 20, 300);
                sim.command_move(*unit, target).unwrap();
            }
            sim
        };
        let mut first = setup();
        let mut second = setup();
        for _ in 0..400 {
            first.tick();
            second.tick();
        }
        assert_eq!(first.state_hash(), second.state_hash());
    }

    #[test]
    fn test_snapshot_round_trip_preserves_hash() {
        let mut sim = Simulation::new();
        let a = sim.spawn(fast(Point::new(100, 100))).unwrap();
        let b = sim.spawn(fast(Point::new(200, 100))).unwrap();
        sim.command_move(a, Point::new(300, 300)).unwrap();
        sim.command_move(b, Point::new(100, 300)).unwrap();
        for _ in 0..50 {
            sim.tick();
        }
        let bytes = sim.serialize().unwrap();
        let restored = Simulation::deserialize(&bytes).unwrap();
        assert_eq!(sim.state_hash(), restored.state_hash());
    }

    #[test]
    fn test_despawned_blocker_never_read() {
        let mut sim = Simulation::new();
        let mover = sim.spawn(fast(Point::new(100, 100))).unwrap();
        let blocker = sim.spawn(fast(Point::new(130, 100))).unwrap();
        sim.command_move(mover, Point::new(300, 100)).unwrap();
        // Run until the mover records the blocker or passes it.
        for _ in 0..5 {
            sim.tick();
        }
        sim.despawn(blocker).unwrap();
        // Ticking after the despawn must not fault or stall the mover.
        let mut arrived = false;
        for _ in 0..200 {
            if sim.tick().arrivals.contains(&mover) {
                arrived = true;
                break;
            }
        }
        assert!(arrived);
    }

    #[test]
    fn test_flyer_command_and_arrival() {
        let mut sim = Simulation::new();
        let flyer = sim
            .spawn(EntitySpawnParams {
                position: Point::new(100, 100),
                airborne: true,
                accel_model: AccelModel::FixedTopSpeed,
                ..EntitySpawnParams::default()
            })
            .unwrap();
        sim.command_move(flyer, Point::new(400, 400)).unwrap();
        for _ in 0..200 {
            sim.tick();
        }
        let entity = sim.get(flyer).unwrap();
        assert_eq!(entity.position, Point::new(400, 400));
        assert_eq!(entity.state, MovementState::Flyer);
    }

    #[test]
    fn test_unstack_separates() {
        let mut sim = Simulation::new();
        let unit = sim.spawn(fast(Point::new(100, 100))).unwrap();
        sim.force_unstack(unit, Point::new(120, 100)).unwrap();
        for _ in 0..30 {
            sim.tick();
        }
        let entity = sim.get(unit).unwrap();
        assert_eq!(entity.position, Point::new(120, 100));
        assert_eq!(entity.state, MovementState::Idle);
    }
}
