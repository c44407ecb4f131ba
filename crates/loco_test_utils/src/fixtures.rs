//! Test fixtures and helpers.
//!
//! Pre-built scenarios, spawn helpers, and a scripted collaborator
//! environment for driving the state machine through exact collision
//! sequences.

use std::collections::VecDeque;

use loco_core::collision::{MovementEnv, RouteCheck, StandardEnv, WorldView};
use loco_core::entity::{AccelModel, Entity, EntityHandle};
use loco_core::math::{Fixed, Point};
use loco_core::simulation::{EntitySpawnParams, Simulation};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Spawn parameters for a standard ground mover at a position.
#[must_use]
pub fn ground_mover(x: u16, y: u16) -> EntitySpawnParams {
    EntitySpawnParams {
        position: Point::new(x, y),
        accel_model: AccelModel::FixedTopSpeed,
        ..EntitySpawnParams::default()
    }
}

/// Spawn parameters for a flyer at a position.
#[must_use]
pub fn flyer(x: u16, y: u16) -> EntitySpawnParams {
    EntitySpawnParams {
        position: Point::new(x, y),
        airborne: true,
        accel_model: AccelModel::FixedTopSpeed,
        ..EntitySpawnParams::default()
    }
}

/// Two ground movers ordered through each other: each one's target is the
/// other's spawn point.
#[must_use]
pub fn head_on_scenario() -> Simulation {
    let mut sim = Simulation::new();
    let a = sim.spawn(ground_mover(100, 200)).expect("spawn");
    let b = sim.spawn(ground_mover(400, 200)).expect("spawn");
    sim.command_move(a, Point::new(400, 200)).expect("command");
    sim.command_move(b, Point::new(100, 200)).expect("command");
    sim
}

/// A grid of movers all crossing the map center at once.
#[must_use]
pub fn crossing_scenario(units_per_side: u16) -> Simulation {
    let mut sim = Simulation::new();
    for i in 0..units_per_side {
        let west = sim.spawn(ground_mover(100, 150 + i * 30)).expect("spawn");
        let east = sim.spawn(ground_mover(500, 150 + i * 30)).expect("spawn");
        sim.command_move(west, Point::new(500, 150 + i * 30))
            .expect("command");
        sim.command_move(east, Point::new(100, 150 + i * 30))
            .expect("command");
    }
    sim
}

/// A canned answer for one collaborator query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedQuery {
    /// Result of one `blocking_entity` call.
    Blocking(Option<EntityHandle>),
    /// Result of one `terrain_blocked` call.
    Terrain(bool),
    /// Result of one `dodge_direction` call.
    Gap(Option<u8>),
}

/// Collaborator environment that replays canned query results in order,
/// deferring to the standard implementation for planning and route
/// progress.
///
/// Queries with no remaining scripted answer fall through to the standard
/// implementation, so a script only needs to cover the calls under test.
#[derive(Debug, Default)]
pub struct ScriptedEnv {
    fallback: StandardEnv,
    blocking: VecDeque<Option<EntityHandle>>,
    terrain: VecDeque<bool>,
    gaps: VecDeque<Option<u8>>,
}

impl ScriptedEnv {
    /// Build a scripted environment from a query sequence.
    #[must_use]
    pub fn new(script: Vec<ScriptedQuery>) -> Self {
        let mut env = Self::default();
        for entry in script {
            match entry {
                ScriptedQuery::Blocking(answer) => env.blocking.push_back(answer),
                ScriptedQuery::Terrain(answer) => env.terrain.push_back(answer),
                ScriptedQuery::Gap(answer) => env.gaps.push_back(answer),
            }
        }
        env
    }
}

impl MovementEnv for ScriptedEnv {
    fn plan_route(
        &mut self,
        world: &WorldView<'_>,
        entity: &mut Entity,
        target: Point,
        dodge_hint: Option<EntityHandle>,
    ) -> bool {
        self.fallback.plan_route(world, entity, target, dodge_hint)
    }

    fn route_progress(&mut self, world: &WorldView<'_>, entity: &mut Entity) -> RouteCheck {
        self.fallback.route_progress(world, entity)
    }

    fn blocking_entity(
        &mut self,
        world: &WorldView<'_>,
        entity: &Entity,
        at: Point,
    ) -> Option<EntityHandle> {
        match self.blocking.pop_front() {
            Some(answer) => answer,
            None => self.fallback.blocking_entity(world, entity, at),
        }
    }

    fn terrain_blocked(&mut self, world: &WorldView<'_>, entity: &Entity, at: Point) -> bool {
        match self.terrain.pop_front() {
            Some(answer) => answer,
            None => self.fallback.terrain_blocked(world, entity, at),
        }
    }

    fn blocks_point(
        &mut self,
        world: &WorldView<'_>,
        blocker: EntityHandle,
        entity: &Entity,
        point: Point,
    ) -> bool {
        self.fallback.blocks_point(world, blocker, entity, point)
    }

    fn dodge_direction(
        &mut self,
        world: &WorldView<'_>,
        entity: &Entity,
        other: EntityHandle,
    ) -> Option<u8> {
        match self.gaps.pop_front() {
            Some(answer) => answer,
            None => self.fallback.dodge_direction(world, entity, other),
        }
    }
}
