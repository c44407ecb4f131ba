//! Headless movement scenario runner.
//!
//! Runs movement scenarios without any rendering, for CI determinism
//! verification and batch experiments:
//!
//! - **Scenario files**: RON descriptions of a map, spawns, and orders
//! - **JSON reports**: final positions, states, and the state hash
//! - **Determinism verification**: run a scenario N times and compare
//!   hashes
//!
//! # Example
//!
//! ```bash
//! # Run the built-in scenario for 500 ticks
//! cargo run -p loco_headless -- run --ticks 500
//!
//! # Verify a scenario file is deterministic across 4 runs
//! cargo run -p loco_headless -- verify --scenario crossing.ron --runs 4
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod runner;
pub mod scenario;

pub use runner::{run_scenario, verify_scenario, EntityReport, RunReport};
pub use scenario::{Scenario, SpawnSpec};

use thiserror::Error;

/// Errors surfaced by the headless runner.
#[derive(Debug, Error)]
pub enum HeadlessError {
    /// Reading a scenario file failed.
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing a scenario file failed.
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// A simulation-level operation failed.
    #[error("simulation error: {0}")]
    Simulation(#[from] loco_core::error::MovementError),

    /// Report serialization failed.
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    /// Determinism verification found diverging runs.
    #[error("determinism check failed: {unique} unique hashes across {runs} runs")]
    Diverged {
        /// Number of runs executed.
        runs: usize,
        /// Number of distinct final hashes observed.
        unique: usize,
    },
}
