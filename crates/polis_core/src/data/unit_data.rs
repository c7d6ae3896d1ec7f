//! Unit data structures for data-driven unit definitions.

use serde::{Deserialize, Serialize};

use super::Requirement;
use crate::clock::MILLIS_PER_SECOND;
use crate::economy::Cost;
use crate::ids::{BuildingId, ResearchId, UnitId};

/// Data-driven unit definition.
///
/// Covers both land units and ships; `naval` decides which training queue
/// and which combat theater the unit belongs to.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     id: "swordsman",
///     name: "Swordsman",
///     cost: (wood: 95, stone: 0, silver: 85, population: 1),
///     build_time_secs: 60,
///     attack: 10,
///     defense: 8,
///     speed: 8,
///     carry: 16,
///     produced_at: "barracks",
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique string identifier for this unit type.
    pub id: UnitId,

    /// Display name.
    pub name: String,

    /// Cost of a single unit, including its population slots.
    pub cost: Cost,

    /// Training time of a single unit at producing building level 1.
    pub build_time_secs: u32,

    /// Attack value per unit.
    #[serde(default)]
    pub attack: u32,

    /// Defense value per unit.
    #[serde(default)]
    pub defense: u32,

    /// Travel speed in map fields per hour.
    pub speed: u32,

    /// Resources one surviving unit can carry home as plunder.
    #[serde(default)]
    pub carry: u32,

    /// Ships train in the naval queue and fight naval battles.
    #[serde(default)]
    pub naval: bool,

    /// Building whose level shortens training time.
    pub produced_at: BuildingId,

    /// Building levels required before training.
    #[serde(default)]
    pub requires: Vec<Requirement>,

    /// Research required before training.
    #[serde(default)]
    pub research: Option<ResearchId>,
}

impl UnitData {
    /// Training duration in milliseconds for `amount` units.
    ///
    /// Every level of the producing building above the first removes
    /// `speedup_percent_per_level` percent of the base time (relative
    /// speed, never reaching zero).
    #[must_use]
    pub fn training_time_ms(&self, amount: u32, producer_level: u32, speedup_percent: u32) -> u64 {
        let base = u64::from(self.build_time_secs) * MILLIS_PER_SECOND * u64::from(amount);
        let bonus = u64::from(producer_level.saturating_sub(1)) * u64::from(speedup_percent);
        let scaled = u128::from(base) * 100 / (100 + u128::from(bonus));
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    /// Whether the unit contributes anything to an attack.
    #[must_use]
    pub const fn can_attack(&self) -> bool {
        self.attack > 0
    }
}
