//! Static game data consumed by the simulation.
//!
//! This module contains pure data structures for units, buildings, research
//! and combat rules. All structs are designed to be deserialized from RON.
//!
//! **Note:** This module contains no IO - it only parses strings.
//! File loading is handled by `polis_server`.

mod building_data;
mod game_data;
mod research_data;
mod unit_data;

use serde::{Deserialize, Serialize};

use crate::ids::BuildingId;

pub use building_data::BuildingData;
pub use game_data::{CombatRules, GameData, MovementRules, QueueRules};
pub use research_data::ResearchData;
pub use unit_data::UnitData;

/// Minimum level of a building that must exist in the city.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    /// Required building.
    pub building: BuildingId,
    /// Minimum level.
    pub level: u32,
}

impl Requirement {
    /// Create a new requirement.
    #[must_use]
    pub fn new(building: impl Into<BuildingId>, level: u32) -> Self {
        Self {
            building: building.into(),
            level,
        }
    }
}
