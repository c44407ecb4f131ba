//! Scenario execution and reporting.

use serde::{Deserialize, Serialize};

use loco_core::entity::AccelModel;
use loco_core::math::{Fixed, Point};
use loco_core::movement::MovementState;
use loco_core::region::RegionMap;
use loco_core::simulation::{EntitySpawnParams, Simulation};

use crate::scenario::Scenario;
use crate::HeadlessError;

/// Final state of one entity after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityReport {
    /// Final x coordinate.
    pub x: u16,
    /// Final y coordinate.
    pub y: u16,
    /// Final movement state tag.
    pub state: String,
    /// Whether the entity ended on its move target.
    pub at_target: bool,
}

/// Result of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Ticks simulated.
    pub ticks: u64,
    /// Deterministic state hash after the final tick.
    pub state_hash: u64,
    /// Total arrivals observed.
    pub arrivals: usize,
    /// Total planning failures observed.
    pub plan_failures: usize,
    /// Per-entity final state, in spawn order.
    pub entities: Vec<EntityReport>,
}

/// Build a simulation from a scenario description.
fn build(scenario: &Scenario) -> Result<Simulation, HeadlessError> {
    let map = RegionMap::new(scenario.width_tiles, scenario.height_tiles);
    let mut sim = Simulation::with_map(map);
    for spec in &scenario.spawns {
        let handle = sim.spawn(EntitySpawnParams {
            position: Point::new(spec.x, spec.y),
            top_speed: Fixed::from_num(spec.speed),
            airborne: spec.airborne,
            accel_model: AccelModel::FixedTopSpeed,
            ..EntitySpawnParams::default()
        })?;
        if let Some((tx, ty)) = spec.target {
            sim.command_move(handle, Point::new(tx, ty))?;
        }
    }
    Ok(sim)
}

/// Run a scenario for a number of ticks and report the outcome.
pub fn run_scenario(scenario: &Scenario, ticks: u64) -> Result<RunReport, HeadlessError> {
    let mut sim = build(scenario)?;
    let mut arrivals = 0;
    let mut plan_failures = 0;
    for _ in 0..ticks {
        let events = sim.tick();
        arrivals += events.arrivals.len();
        plan_failures += events.plan_failures.len();
    }

    let entities = sim
        .arena()
        .iter()
        .map(|(_, entity)| EntityReport {
            x: entity.position.x,
            y: entity.position.y,
            state: format!("{:?}", entity.state),
            at_target: entity.position == entity.move_target
                && entity.state != MovementState::Failed,
        })
        .collect();

    Ok(RunReport {
        ticks,
        state_hash: sim.state_hash(),
        arrivals,
        plan_failures,
        entities,
    })
}

/// Run a scenario `runs` times and verify every run reaches the same
/// final hash.
pub fn verify_scenario(scenario: &Scenario, ticks: u64, runs: usize) -> Result<u64, HeadlessError> {
    let mut hashes = Vec::with_capacity(runs);
    for _ in 0..runs {
        hashes.push(run_scenario(scenario, ticks)?.state_hash);
    }
    let mut unique = hashes.clone();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != 1 {
        return Err(HeadlessError::Diverged {
            runs,
            unique: unique.len(),
        });
    }
    Ok(unique[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenario_runs() {
        let report = run_scenario(&Scenario::builtin(), 400).unwrap();
        assert_eq!(report.ticks, 400);
        assert_eq!(report.entities.len(), 3);
        // The flyer has a clear lane and must arrive.
        assert!(report.entities[2].at_target);
    }

    #[test]
    fn test_verify_scenario_agrees_with_itself() {
        let hash = verify_scenario(&Scenario::builtin(), 200, 3).unwrap();
        let report = run_scenario(&Scenario::builtin(), 200).unwrap();
        assert_eq!(hash, report.state_hash);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = run_scenario(&Scenario::builtin(), 10).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("state_hash"));
    }
}
