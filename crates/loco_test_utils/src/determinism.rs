//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the movement simulation produces
//! identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep simulations must be 100% deterministic. Sources of
//! non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different
//!   results. The core uses fixed-point arithmetic throughout.
//!
//! - **Iteration order**: Entities are always processed in canonical
//!   ascending arena order.
//!
//! - **System randomness**: The core never reads a system RNG.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual handler determinism
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full scenarios are reproducible
//! 4. **Parallel tests**: Running N simulations in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use loco_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error
    /// message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation setup multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance one tick
/// * `hash` - Function to compute a state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for _ in 0..ticks {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for [`Simulation`].
///
/// Runs the simulation twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    );
    result.is_deterministic
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run N simulations in parallel using scoped threads and collect final
/// hashes.
///
/// Catches non-determinism that only manifests under thread scheduling
/// variations or memory layout differences.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two simulation runs tick-by-tick, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs are deterministic, `Some(tick)` for the first tick
/// whose hashes differ.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.tick();
        second.tick();
        if first.state_hash() != second.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot round-trip preserves simulation state exactly.
pub fn verify_snapshot_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        sim.tick();
    }

    let hash_before = sim.state_hash();
    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(restored) = Simulation::deserialize(&bytes) else {
        return false;
    };
    hash_before == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
pub mod strategies {
    use loco_core::math::{Fixed, Point};
    use proptest::prelude::*;

    /// Generate a map position away from the edges of the default map.
    pub fn arb_position() -> impl Strategy<Value = Point> {
        (32u16..2000, 32u16..2000).prop_map(|(x, y)| Point::new(x, y))
    }

    /// Generate a top speed between 1 and 15 pixels per tick.
    pub fn arb_speed() -> impl Strategy<Value = Fixed> {
        (1i32..16).prop_map(Fixed::from_num)
    }

    /// Generate a turn rate.
    pub fn arb_turn_rate() -> impl Strategy<Value = u8> {
        1u8..32
    }

    /// Generate a sequence of move targets.
    pub fn arb_target_sequence(max_len: usize) -> impl Strategy<Value = Vec<Point>> {
        proptest::collection::vec(arb_position(), 1..max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        crossing_scenario, flyer, ground_mover, head_on_scenario, ScriptedEnv, ScriptedQuery,
    };
    use loco_core::math::Point;
    use loco_core::simulation::EntitySpawnParams;
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_simulation_determinism() {
        assert!(verify_simulation_determinism(Simulation::new, 100));
    }

    #[test]
    fn test_head_on_determinism() {
        let result = verify_determinism(
            5,
            300,
            head_on_scenario,
            |sim| {
                sim.tick();
            },
            Simulation::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_crossing_determinism() {
        let result = verify_determinism(
            3,
            400,
            || crossing_scenario(4),
            |sim| {
                sim.tick();
            },
            Simulation::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_parallel_crossing_simulations() {
        let result = run_parallel_simulations(|| crossing_scenario(4), 4, 300);
        result.assert_deterministic();
    }

    #[test]
    fn test_no_divergence_in_head_on() {
        assert_eq!(find_first_divergence(head_on_scenario, 300), None);
    }

    #[test]
    fn test_snapshot_round_trip() {
        assert!(verify_snapshot_determinism(head_on_scenario, 120));
        assert!(verify_snapshot_determinism(|| crossing_scenario(3), 50));
    }

    #[test]
    fn test_scripted_replay_is_bit_identical() {
        // Two runs of the state machine fed the identical scripted
        // collision-query sequence must produce bit-identical positions
        // and state tags.
        let script = || {
            ScriptedEnv::new(vec![
                ScriptedQuery::Terrain(true),
                ScriptedQuery::Terrain(false),
                ScriptedQuery::Terrain(false),
                ScriptedQuery::Gap(Some(32)),
                ScriptedQuery::Gap(None),
            ])
        };
        let run = |mut env: ScriptedEnv| {
            let mut sim = Simulation::new();
            let a = sim.spawn(ground_mover(100, 200)).expect("spawn");
            let b = sim.spawn(ground_mover(160, 200)).expect("spawn");
            sim.command_move(a, Point::new(400, 200)).expect("command");
            sim.command_move(b, Point::new(400, 200)).expect("command");
            for _ in 0..50 {
                sim.tick_with(&mut env);
            }
            sim.state_hash()
        };
        assert_eq!(run(script()), run(script()));
    }

    #[test]
    fn test_flyer_scenario_determinism() {
        let setup = || {
            let mut sim = Simulation::new();
            let f = sim.spawn(flyer(100, 100)).expect("spawn");
            sim.command_move(f, Point::new(1000, 900)).expect("command");
            sim
        };
        let result = verify_determinism(
            3,
            400,
            setup,
            |sim| {
                sim.tick();
            },
            Simulation::state_hash,
        );
        result.assert_deterministic();
    }

    proptest! {
        /// Any random spawn position must simulate deterministically.
        #[test]
        fn prop_random_spawns_are_deterministic(
            position in strategies::arb_position(),
            target in strategies::arb_position(),
        ) {
            let setup = move || {
                let mut sim = Simulation::new();
                let unit = sim
                    .spawn(EntitySpawnParams {
                        position,
                        ..EntitySpawnParams::default()
                    })
                    .expect("spawn");
                sim.command_move(unit, target).expect("command");
                sim
            };
            prop_assert!(verify_simulation_determinism(setup, 60));
        }

        /// Random speeds and turn rates must not introduce divergence.
        #[test]
        fn prop_random_kinematics_are_deterministic(
            speed in strategies::arb_speed(),
            turn_rate in strategies::arb_turn_rate(),
            target in strategies::arb_position(),
        ) {
            let setup = move || {
                let mut sim = Simulation::new();
                let unit = sim
                    .spawn(EntitySpawnParams {
                        position: Point::new(1000, 1000),
                        top_speed: speed,
                        turn_rate,
                        ..EntitySpawnParams::default()
                    })
                    .expect("spawn");
                sim.command_move(unit, target).expect("command");
                sim
            };
            prop_assert!(verify_simulation_determinism(setup, 80));
        }

        /// Replaying a command sequence must reproduce identical state.
        #[test]
        fn prop_command_sequences_replay_identically(
            targets in strategies::arb_target_sequence(6),
        ) {
            let targets_clone = targets.clone();
            let setup = move || {
                let mut sim = Simulation::new();
                let unit = sim.spawn(ground_mover(1000, 1000)).expect("spawn");
                for (i, target) in targets_clone.iter().enumerate() {
                    // Re-target every 10 ticks.
                    for _ in 0..(i * 10) {
                        sim.tick();
                    }
                    sim.command_move(unit, *target).expect("command");
                }
                sim
            };
            prop_assert!(verify_simulation_determinism(setup, 60));
        }

        /// Snapshot round-trips must be exact for random states.
        #[test]
        fn prop_snapshot_roundtrip_is_exact(
            position in strategies::arb_position(),
            num_ticks in 0u64..60,
        ) {
            let setup = move || {
                let mut sim = Simulation::new();
                let unit = sim
                    .spawn(EntitySpawnParams {
                        position,
                        ..EntitySpawnParams::default()
                    })
                    .expect("spawn");
                sim.command_move(unit, Point::new(1024, 1024)).expect("command");
                sim
            };
            prop_assert!(verify_snapshot_determinism(setup, num_ticks));
        }
    }
}
