//! Building data structures for data-driven building definitions.

use serde::{Deserialize, Serialize};

use super::Requirement;
use crate::clock::MILLIS_PER_SECOND;
use crate::economy::Cost;
use crate::ids::BuildingId;
use crate::math::apply_percent;

/// Data-driven building definition.
///
/// Cost and construction time grow linearly with the level being built:
/// level `n` costs `base × (100 + growth × (n − 1)) / 100`.
///
/// # Example RON
///
/// ```ron
/// BuildingData(
///     id: "barracks",
///     name: "Barracks",
///     base_cost: (wood: 70, stone: 20, silver: 40, population: 1),
///     cost_growth_percent: 50,
///     base_build_time_secs: 120,
///     time_growth_percent: 40,
///     max_level: 30,
///     requires: [(building: "senate", level: 2)],
///     speedup_percent_per_level: 10,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingData {
    /// Unique string identifier for this building type.
    pub id: BuildingId,

    /// Display name.
    pub name: String,

    /// Cost of building level 1.
    pub base_cost: Cost,

    /// Additional cost percentage per level above the first.
    #[serde(default)]
    pub cost_growth_percent: u32,

    /// Construction time of level 1.
    pub base_build_time_secs: u32,

    /// Additional time percentage per level above the first.
    #[serde(default)]
    pub time_growth_percent: u32,

    /// Highest reachable level.
    pub max_level: u32,

    /// Building levels required before the first level can be built.
    #[serde(default)]
    pub requires: Vec<Requirement>,

    /// Population capacity added by each level (farms).
    #[serde(default)]
    pub population_per_level: u32,

    /// Training/research speed bonus per level for items this building produces.
    #[serde(default)]
    pub speedup_percent_per_level: u32,
}

impl BuildingData {
    /// Cost of upgrading to `level`.
    #[must_use]
    pub fn cost_for_level(&self, level: u32) -> Cost {
        self.base_cost
            .scaled_percent(self.growth_percent(self.cost_growth_percent, level))
    }

    /// Construction time in milliseconds for upgrading to `level`.
    #[must_use]
    pub fn build_time_ms_for_level(&self, level: u32) -> u64 {
        let base = u64::from(self.base_build_time_secs) * MILLIS_PER_SECOND;
        apply_percent(base, self.growth_percent(self.time_growth_percent, level))
    }

    fn growth_percent(&self, growth: u32, level: u32) -> u32 {
        100u32.saturating_add(growth.saturating_mul(level.saturating_sub(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn barracks() -> BuildingData {
        BuildingData {
            id: BuildingId::new("barracks"),
            name: "Barracks".into(),
            base_cost: Cost::new(100, 40, 20, 1),
            cost_growth_percent: 50,
            base_build_time_secs: 100,
            time_growth_percent: 25,
            max_level: 30,
            requires: vec![],
            population_per_level: 0,
            speedup_percent_per_level: 10,
        }
    }

    #[test]
    fn test_cost_grows_per_level() {
        let b = barracks();
        assert_eq!(b.cost_for_level(1), Cost::new(100, 40, 20, 1));
        assert_eq!(b.cost_for_level(2), Cost::new(150, 60, 30, 1));
        assert_eq!(b.cost_for_level(3), Cost::new(200, 80, 40, 1));
    }

    #[test]
    fn test_build_time_grows_per_level() {
        let b = barracks();
        assert_eq!(b.build_time_ms_for_level(1), 100_000);
        assert_eq!(b.build_time_ms_for_level(5), 200_000);
    }
}
