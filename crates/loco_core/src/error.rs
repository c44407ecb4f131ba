//! Error types for the movement core.

use thiserror::Error;

/// Result type alias using [`MovementError`].
pub type Result<T> = std::result::Result<T, MovementError>;

/// Top-level error type for the movement core.
///
/// All of these are recovered locally by the caller; none abort the tick
/// for other entities.
#[derive(Debug, Error)]
pub enum MovementError {
    /// A requested path cannot be encoded in the fixed storage budget,
    /// even after the deterministic shrink negotiation.
    #[error("path budget exceeded: {region_count} regions, {position_count} positions")]
    PathBudgetExceeded {
        /// Region count after negotiation.
        region_count: u16,
        /// Position count after negotiation.
        position_count: u16,
    },

    /// The route planner could not produce a path to the target.
    #[error("route planning failed for target ({x}, {y})")]
    PlanningFailed {
        /// Target x coordinate.
        x: u16,
        /// Target y coordinate.
        y: u16,
    },

    /// A handle referred to an entity that no longer exists.
    #[error("entity not found: slot {0}")]
    EntityNotFound(u16),

    /// The entity arena is at its fixed capacity.
    #[error("entity arena full ({0} slots)")]
    ArenaFull(usize),

    /// Snapshot serialization or deserialization failed.
    #[error("snapshot error: {0}")]
    SnapshotError(String),
}
