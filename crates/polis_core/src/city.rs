//! Persistent aggregates: player cities and unaffiliated villages.
//!
//! A city exclusively owns its resources, units, buildings and queues.
//! Unit maps never hold zero or negative entries.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::data::GameData;
use crate::economy::{Population, Resources};
use crate::error::{GameError, Result};
use crate::ids::{BuildingId, CityId, PlayerId, ResearchId, UnitId, VillageId};
use crate::math::MapPosition;
use crate::queue::{QueueItem, QueueKind};

/// Unit counts keyed by unit type. Sorted for deterministic iteration.
pub type UnitCounts = BTreeMap<UnitId, u32>;

/// Sum of all counts.
#[must_use]
pub fn total_units(counts: &UnitCounts) -> u64 {
    counts.values().map(|&n| u64::from(n)).sum()
}

/// Add every count of `from` into `into`, summing by key.
pub fn merge_units(into: &mut UnitCounts, from: &UnitCounts) {
    for (unit, &count) in from {
        if count == 0 {
            continue;
        }
        let slot = into.entry(unit.clone()).or_insert(0);
        *slot = slot.saturating_add(count);
    }
}

/// Subtract `losses` from `from`, clamping each entry at zero and
/// dropping emptied entries.
pub fn remove_units_clamped(from: &mut UnitCounts, losses: &UnitCounts) {
    for (unit, &lost) in losses {
        if let Some(count) = from.get_mut(unit) {
            *count = count.saturating_sub(lost);
            if *count == 0 {
                from.remove(unit);
            }
        }
    }
}

/// Remove exactly `wanted` from `from`, failing without change when any
/// unit type is short.
pub fn take_units(from: &mut UnitCounts, wanted: &UnitCounts) -> Result<()> {
    for (unit, &count) in wanted {
        let have = from.get(unit).copied().unwrap_or(0);
        if count > have {
            return Err(GameError::InvalidCommand(format!(
                "not enough {unit}: requested {count}, stationed {have}"
            )));
        }
    }
    remove_units_clamped(from, wanted);
    Ok(())
}

/// Drop zero entries.
pub fn prune_units(counts: &mut UnitCounts) {
    counts.retain(|_, n| *n > 0);
}

/// A travelling force, split into land units and ships.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Army {
    /// Land units.
    #[serde(default)]
    pub units: UnitCounts,
    /// Ships.
    #[serde(default)]
    pub ships: UnitCounts,
}

impl Army {
    /// Create an army.
    #[must_use]
    pub fn new(units: UnitCounts, ships: UnitCounts) -> Self {
        Self { units, ships }
    }

    /// Head count across land units and ships.
    #[must_use]
    pub fn total(&self) -> u64 {
        total_units(&self.units) + total_units(&self.ships)
    }

    /// Whether no unit or ship is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Merge land units and ships into one unit map.
    pub fn merge_into(&self, counts: &mut UnitCounts) {
        merge_units(counts, &self.units);
        merge_units(counts, &self.ships);
    }
}

/// Level and assigned workers of one building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BuildingState {
    /// Current level (0 = not built).
    pub level: u32,
    /// Workers assigned to the building.
    #[serde(default)]
    pub workers: u32,
}

/// Full persistent state of a player city.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CityState {
    /// City identifier.
    pub id: CityId,
    /// Owning player.
    pub owner: PlayerId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Map position.
    #[serde(default)]
    pub position: MapPosition,
    /// Stockpiled resources.
    #[serde(default)]
    pub resources: Resources,
    /// Population budget.
    #[serde(default)]
    pub population: Population,
    /// Buildings by type.
    #[serde(default)]
    pub buildings: BTreeMap<BuildingId, BuildingState>,
    /// Stationed units and ships.
    #[serde(default)]
    pub units: UnitCounts,
    /// Wounded units recovering in the hospital.
    #[serde(default)]
    pub wounded: UnitCounts,
    /// Completed research.
    #[serde(default)]
    pub research: BTreeSet<ResearchId>,
    /// Pending queue items by queue kind, in execution order.
    #[serde(default)]
    pub queues: BTreeMap<QueueKind, Vec<QueueItem>>,
    /// Favor per god.
    #[serde(default)]
    pub worship: BTreeMap<String, u32>,
}

impl CityState {
    /// Create an empty city.
    #[must_use]
    pub fn new(id: CityId, owner: PlayerId, position: MapPosition) -> Self {
        Self {
            id,
            owner,
            position,
            ..Self::default()
        }
    }

    /// Current level of a building, zero if absent.
    #[must_use]
    pub fn building_level(&self, building: &BuildingId) -> u32 {
        self.buildings.get(building).map_or(0, |b| b.level)
    }

    /// Set a building level directly.
    pub fn set_building_level(&mut self, building: BuildingId, level: u32) {
        self.buildings.entry(building).or_default().level = level;
    }

    /// Items of one queue, in execution order.
    #[must_use]
    pub fn queue(&self, kind: QueueKind) -> &[QueueItem] {
        self.queues
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mutable access to one queue, creating it if absent.
    pub fn queue_mut(&mut self, kind: QueueKind) -> &mut Vec<QueueItem> {
        self.queues.entry(kind).or_default()
    }

    /// Population promised to items that have not completed yet.
    #[must_use]
    pub fn reserved_population(&self) -> u32 {
        self.queues
            .values()
            .flatten()
            .map(|item| item.cost.population)
            .fold(0u32, u32::saturating_add)
    }

    /// Population still free after subtracting queued reservations.
    #[must_use]
    pub fn available_population(&self) -> u32 {
        self.population
            .free()
            .saturating_sub(self.reserved_population())
    }

    /// Free the population slots held by units that left the city for good.
    pub fn release_population(&mut self, data: &GameData, gone: &UnitCounts) {
        let freed = gone
            .iter()
            .map(|(id, &n)| data.unit(id).map_or(0, |u| u.cost.population.saturating_mul(n)))
            .fold(0u32, u32::saturating_add);
        self.population.used = self.population.used.saturating_sub(freed);
    }

    /// Total wounded units.
    #[must_use]
    pub fn wounded_total(&self) -> u64 {
        total_units(&self.wounded)
    }
}

/// Unaffiliated village that can be raided for resources.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VillageState {
    /// Village identifier.
    pub id: VillageId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Map position.
    #[serde(default)]
    pub position: MapPosition,
    /// Lootable resources.
    #[serde(default)]
    pub resources: Resources,
    /// Militia defending the village.
    #[serde(default)]
    pub units: UnitCounts,
}

impl VillageState {
    /// Create an empty village.
    #[must_use]
    pub fn new(id: VillageId, position: MapPosition) -> Self {
        Self {
            id,
            position,
            ..Self::default()
        }
    }
}
