//! Complete game data table combining all static definitions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::building_data::BuildingData;
use super::research_data::ResearchData;
use super::unit_data::UnitData;
use super::Requirement;
use crate::error::{GameError, Result};
use crate::ids::{BuildingId, ResearchId, UnitId};

/// Complete static configuration for one game world.
///
/// Loaded from a RON file at server startup and shared read-only between
/// the queue engine, the movement scheduler and the combat resolver.
///
/// # Example RON
///
/// ```ron
/// GameData(
///     units: [...],
///     buildings: [...],
///     research: [...],
///     combat: CombatRules(wall: Some("wall"), ...),
///     queues: QueueRules(capacity: 5, research_building: Some("academy")),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    /// All unit and ship types.
    #[serde(default)]
    pub units: Vec<UnitData>,

    /// All building types.
    #[serde(default)]
    pub buildings: Vec<BuildingData>,

    /// All research topics.
    #[serde(default)]
    pub research: Vec<ResearchData>,

    /// Combat constants.
    #[serde(default)]
    pub combat: CombatRules,

    /// Queue constants.
    #[serde(default)]
    pub queues: QueueRules,

    /// Travel constants.
    #[serde(default)]
    pub movement: MovementRules,
}

/// Constants consumed by the combat resolver and arrival processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatRules {
    /// Fortification building.
    #[serde(default)]
    pub wall: Option<BuildingId>,

    /// Flat defense a wall contributes per level, even with no defenders.
    #[serde(default)]
    pub wall_base_defense_per_level: u64,

    /// Defense multiplier bonus per wall level, in percent.
    #[serde(default)]
    pub wall_bonus_percent_per_level: u32,

    /// Building that shelters wounded defenders.
    #[serde(default)]
    pub hospital: Option<BuildingId>,

    /// Wounded units one hospital level can hold.
    #[serde(default)]
    pub hospital_capacity_per_level: u32,

    /// Share of the defender's land losses that become wounded, in percent.
    #[serde(default)]
    pub wounded_percent: u32,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            wall: None,
            wall_base_defense_per_level: 0,
            wall_bonus_percent_per_level: 0,
            hospital: None,
            hospital_capacity_per_level: 0,
            wounded_percent: 0,
        }
    }
}

/// Constants for the timed queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRules {
    /// Maximum items per queue kind.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Building whose level shortens research time.
    #[serde(default)]
    pub research_building: Option<BuildingId>,
}

const fn default_queue_capacity() -> usize {
    crate::queue::DEFAULT_MAX_QUEUE_SIZE
}

impl Default for QueueRules {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            research_building: None,
        }
    }
}

/// Constants for movement travel times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRules {
    /// Speed of trade caravans, which carry no units, in fields per hour.
    #[serde(default = "default_trade_speed")]
    pub trade_speed: u32,

    /// Shortest possible trip, for targets on the same field.
    #[serde(default = "default_min_travel_secs")]
    pub min_travel_secs: u32,
}

const fn default_trade_speed() -> u32 {
    20
}

const fn default_min_travel_secs() -> u32 {
    60
}

impl Default for MovementRules {
    fn default() -> Self {
        Self {
            trade_speed: default_trade_speed(),
            min_travel_secs: default_min_travel_secs(),
        }
    }
}

impl GameData {
    /// Parse and validate game data from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let data: Self = ron::from_str(text).map_err(|e| GameError::DataLoad(e.to_string()))?;
        let errors = data.validate();
        if !errors.is_empty() {
            return Err(GameError::DataLoad(errors.join("; ")));
        }
        Ok(data)
    }

    /// Find a unit by its ID.
    #[must_use]
    pub fn unit(&self, id: &UnitId) -> Option<&UnitData> {
        self.units.iter().find(|u| &u.id == id)
    }

    /// Find a building by its ID.
    #[must_use]
    pub fn building(&self, id: &BuildingId) -> Option<&BuildingData> {
        self.buildings.iter().find(|b| &b.id == id)
    }

    /// Find a research topic by its ID.
    #[must_use]
    pub fn research(&self, id: &ResearchId) -> Option<&ResearchData> {
        self.research.iter().find(|r| &r.id == id)
    }

    /// Whether the unit is a ship. Unknown units count as land units.
    #[must_use]
    pub fn is_naval(&self, id: &UnitId) -> bool {
        self.unit(id).is_some_and(|u| u.naval)
    }

    /// Validate internal consistency of the data.
    ///
    /// Checks for:
    /// - Duplicate ids
    /// - Requirements naming unknown buildings
    /// - Units produced at unknown buildings or gated by unknown research
    /// - Units that cannot move
    /// - Rule references to unknown buildings
    ///
    /// Returns a list of validation errors.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        check_unique(self.units.iter().map(|u| u.id.as_str()), "unit", &mut errors);
        check_unique(
            self.buildings.iter().map(|b| b.id.as_str()),
            "building",
            &mut errors,
        );
        check_unique(
            self.research.iter().map(|r| r.id.as_str()),
            "research",
            &mut errors,
        );

        for unit in &self.units {
            if unit.speed == 0 {
                errors.push(format!("Unit '{}' has zero speed", unit.id));
            }
            if self.building(&unit.produced_at).is_none() {
                errors.push(format!(
                    "Unit '{}' produced at unknown building '{}'",
                    unit.id, unit.produced_at
                ));
            }
            if let Some(research) = &unit.research {
                if self.research(research).is_none() {
                    errors.push(format!(
                        "Unit '{}' requires unknown research '{}'",
                        unit.id, research
                    ));
                }
            }
            self.check_requirements(&format!("Unit '{}'", unit.id), &unit.requires, &mut errors);
        }

        for building in &self.buildings {
            if building.max_level == 0 {
                errors.push(format!("Building '{}' has max_level 0", building.id));
            }
            self.check_requirements(
                &format!("Building '{}'", building.id),
                &building.requires,
                &mut errors,
            );
        }

        for research in &self.research {
            self.check_requirements(
                &format!("Research '{}'", research.id),
                &research.requires,
                &mut errors,
            );
        }

        for (rule, building) in [
            ("wall", &self.combat.wall),
            ("hospital", &self.combat.hospital),
            ("research_building", &self.queues.research_building),
        ] {
            if let Some(id) = building {
                if self.building(id).is_none() {
                    errors.push(format!("Rule '{rule}' names unknown building '{id}'"));
                }
            }
        }

        if self.queues.capacity == 0 {
            errors.push("Queue capacity must be at least 1".to_string());
        }
        if self.movement.trade_speed == 0 {
            errors.push("Trade speed must be positive".to_string());
        }

        errors
    }

    fn check_requirements(&self, owner: &str, requires: &[Requirement], errors: &mut Vec<String>) {
        for req in requires {
            if self.building(&req.building).is_none() {
                errors.push(format!(
                    "{owner} requires unknown building '{}'",
                    req.building
                ));
            }
        }
    }
}

fn check_unique<'a>(ids: impl Iterator<Item = &'a str>, what: &str, errors: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(format!("Duplicate {what} id '{id}'"));
        }
    }
}
