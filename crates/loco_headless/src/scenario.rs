//! Scenario descriptions for headless runs.

use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};

use crate::HeadlessError;

/// One entity spawn plus its optional movement order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnSpec {
    /// Spawn x coordinate in pixels.
    pub x: u16,
    /// Spawn y coordinate in pixels.
    pub y: u16,
    /// Top speed in whole pixels per tick.
    #[serde(default = "default_speed")]
    pub speed: u16,
    /// Whether the entity flies.
    #[serde(default)]
    pub airborne: bool,
    /// Move order issued at tick 0, if any.
    #[serde(default)]
    pub target: Option<(u16, u16)>,
}

fn default_speed() -> u16 {
    4
}

/// A headless scenario: map dimensions plus spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Map width in 32-pixel tiles.
    pub width_tiles: u16,
    /// Map height in 32-pixel tiles.
    pub height_tiles: u16,
    /// Entities to spawn.
    pub spawns: Vec<SpawnSpec>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load(path: &FsPath) -> Result<Self, HeadlessError> {
        let text = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&text)?)
    }

    /// Built-in crossing scenario used when no file is given.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            width_tiles: 64,
            height_tiles: 64,
            spawns: vec![
                SpawnSpec {
                    x: 200,
                    y: 400,
                    speed: 4,
                    airborne: false,
                    target: Some((1200, 400)),
                },
                SpawnSpec {
                    x: 1200,
                    y: 400,
                    speed: 4,
                    airborne: false,
                    target: Some((200, 400)),
                },
                SpawnSpec {
                    x: 700,
                    y: 100,
                    speed: 5,
                    airborne: true,
                    target: Some((700, 900)),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_ron_round_trip() {
        let scenario = Scenario::builtin();
        let text = ron::to_string(&scenario).unwrap();
        let parsed: Scenario = ron::from_str(&text).unwrap();
        assert_eq!(parsed.spawns.len(), scenario.spawns.len());
        assert_eq!(parsed.width_tiles, scenario.width_tiles);
    }

    #[test]
    fn test_spawn_defaults() {
        let spec: SpawnSpec = ron::from_str("(x: 10, y: 20)").unwrap();
        assert_eq!(spec.speed, 4);
        assert!(!spec.airborne);
        assert!(spec.target.is_none());
    }
}
